use log::warn;

use emberfall_shared::ServerMessage;

use crate::database::{CharacterRecord, Database, StoreError};
use crate::game_data::GameData;
use crate::moderation;

/// One string for every authentication failure so responses never reveal
/// whether an account exists.
pub const GENERIC_AUTH_FAILURE: &str = "Invalid username or password";

/// Outcome of a successful credential or token check.
pub struct AuthSuccess {
    pub account_id: i64,
    pub username: String,
    pub token: String,
}

// ============================================================================
// REGISTRATION & LOGIN
// ============================================================================

pub async fn register(db: &Database, user: &str, pass: &str) -> ServerMessage {
    let check = moderation::check_username(user);
    if !check.ok {
        return ServerMessage::RegisterResult {
            success: false,
            message: check.reason.unwrap_or_else(|| "Invalid username".to_string()),
        };
    }
    if pass.len() < 6 {
        return ServerMessage::RegisterResult {
            success: false,
            message: "Password must be at least 6 characters".to_string(),
        };
    }
    match db.create_account(user.trim(), pass).await {
        Ok(_) => ServerMessage::RegisterResult {
            success: true,
            message: "Account created".to_string(),
        },
        // Taken usernames get the same generic answer as bad logins.
        Err(StoreError::Duplicate) => ServerMessage::RegisterResult {
            success: false,
            message: GENERIC_AUTH_FAILURE.to_string(),
        },
        Err(e) => {
            warn!("registration failed: {}", e);
            ServerMessage::RegisterResult {
                success: false,
                message: "Registration failed".to_string(),
            }
        }
    }
}

pub async fn login(db: &Database, user: &str, pass: &str) -> (ServerMessage, Option<AuthSuccess>) {
    let account_id = match db.validate_login(user, pass).await {
        Ok(Some(id)) => id,
        Ok(None) => return (auth_failure(), None),
        Err(e) => {
            warn!("login failed: {}", e);
            return (auth_failure(), None);
        }
    };
    match db.create_session(account_id).await {
        Ok(token) => (
            ServerMessage::AuthResult {
                success: true,
                message: "ok".to_string(),
                token: Some(token.clone()),
            },
            Some(AuthSuccess {
                account_id,
                username: user.trim().to_string(),
                token,
            }),
        ),
        Err(e) => {
            warn!("session creation failed: {}", e);
            (auth_failure(), None)
        }
    }
}

pub async fn login_with_token(db: &Database, token: &str) -> (ServerMessage, Option<AuthSuccess>) {
    let account_id = match db.validate_session(token).await {
        Ok(Some(id)) => id,
        Ok(None) => return (auth_failure(), None),
        Err(e) => {
            warn!("token validation failed: {}", e);
            return (auth_failure(), None);
        }
    };
    let username = match db.get_account_username(account_id).await {
        Ok(Some(name)) => name,
        _ => return (auth_failure(), None),
    };
    (
        ServerMessage::AuthResult {
            success: true,
            message: "ok".to_string(),
            token: Some(token.to_string()),
        },
        Some(AuthSuccess {
            account_id,
            username,
            token: token.to_string(),
        }),
    )
}

fn auth_failure() -> ServerMessage {
    ServerMessage::AuthResult {
        success: false,
        message: GENERIC_AUTH_FAILURE.to_string(),
        token: None,
    }
}

// ============================================================================
// CHARACTERS
// ============================================================================

/// Creates a character named after the account's username.
pub async fn create_character(
    db: &Database,
    data: &GameData,
    account_id: i64,
    class_id: &str,
) -> Result<CharacterRecord, String> {
    let Some(class) = data.classes.get(class_id) else {
        return Err("Unknown class".to_string());
    };
    let username = db
        .get_account_username(account_id)
        .await
        .ok()
        .flatten()
        .ok_or_else(|| "Unknown account".to_string())?;
    match db.create_character(account_id, &username, class).await {
        Ok(record) => Ok(record),
        Err(StoreError::ClassLimit) => {
            Err("You already have the maximum characters of this class".to_string())
        }
        Err(e) => {
            warn!("character creation failed: {}", e);
            Err("Character creation failed".to_string())
        }
    }
}

/// Loads a character for play, checking ownership and liveness, along with
/// the account's vault contents.
pub async fn select_character(
    db: &Database,
    account_id: i64,
    character_id: i64,
) -> Option<(CharacterRecord, Vec<Option<String>>)> {
    let record = match db.get_character(character_id).await {
        Ok(Some(record)) => record,
        _ => return None,
    };
    if record.account_id != account_id || !record.alive {
        // Authorization failure: acting on someone else's (or a dead)
        // character is silently dropped.
        return None;
    }
    let vault = db.get_vault_items(account_id).await.ok()?;
    Some((record, vault))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_data::GameData;

    #[tokio::test]
    async fn test_register_then_login_round_trip() {
        let db = Database::connect_memory().await.unwrap();
        let msg = register(&db, "someone", "hunter22").await;
        assert!(matches!(msg, ServerMessage::RegisterResult { success: true, .. }));

        let (msg, success) = login(&db, "someone", "hunter22").await;
        assert!(matches!(msg, ServerMessage::AuthResult { success: true, .. }));
        let success = success.unwrap();
        assert_eq!(success.username, "someone");

        // The issued token logs in by itself.
        let (msg, token_auth) = login_with_token(&db, &success.token).await;
        assert!(matches!(msg, ServerMessage::AuthResult { success: true, .. }));
        assert_eq!(token_auth.unwrap().account_id, success.account_id);

        // Revoked tokens stop working.
        db.revoke_session(&success.token).await.unwrap();
        let (_, gone) = login_with_token(&db, &success.token).await;
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_auth_failures_are_indistinguishable() {
        let db = Database::connect_memory().await.unwrap();
        register(&db, "someone", "hunter22").await;

        let (wrong_pass, _) = login(&db, "someone", "wrong").await;
        let (no_user, _) = login(&db, "nobody", "wrong").await;
        let (wrong_pass_msg, no_user_msg) = match (wrong_pass, no_user) {
            (
                ServerMessage::AuthResult { message: a, success: false, .. },
                ServerMessage::AuthResult { message: b, success: false, .. },
            ) => (a, b),
            other => panic!("expected two failures, got {:?}", other),
        };
        assert_eq!(wrong_pass_msg, no_user_msg);
        assert_eq!(wrong_pass_msg, GENERIC_AUTH_FAILURE);

        // Duplicate registration leaks nothing either.
        let msg = register(&db, "someone", "hunter23").await;
        match msg {
            ServerMessage::RegisterResult { success, message } => {
                assert!(!success);
                assert_eq!(message, GENERIC_AUTH_FAILURE);
            }
            other => panic!("expected RegisterResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_rejects_bad_usernames() {
        let db = Database::connect_memory().await.unwrap();
        for bad in ["ab", "has spaces", "<script>alert(1)</script>"] {
            let msg = register(&db, bad, "hunter22").await;
            assert!(
                matches!(msg, ServerMessage::RegisterResult { success: false, .. }),
                "{} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_character_flow_and_ownership() {
        let data = GameData::default();
        let db = Database::connect_memory().await.unwrap();
        register(&db, "someone", "hunter22").await;
        register(&db, "other", "hunter22").await;
        let (_, auth) = login(&db, "someone", "hunter22").await;
        let account = auth.unwrap().account_id;
        let (_, other_auth) = login(&db, "other", "hunter22").await;
        let other = other_auth.unwrap().account_id;

        let record = create_character(&db, &data, account, "wizard").await.unwrap();
        assert_eq!(record.name, "someone");

        // The owner can select it; another account cannot.
        assert!(select_character(&db, account, record.id).await.is_some());
        assert!(select_character(&db, other, record.id).await.is_none());

        // Unknown class is refused.
        assert!(create_character(&db, &data, account, "bard").await.is_err());
    }
}
