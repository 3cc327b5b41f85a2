use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, warn};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use emberfall_shared::{
    ClientMessage, EntityId, ServerMessage, AUTH_ATTEMPTS_PER_MINUTE, CHAT_MAX_LEN,
    INPUT_BURST_LIMIT, INPUT_BURST_WINDOW_MS,
};

use crate::auth::{self, AuthSuccess};
use crate::command::{DetachReason, SessionEvent, SessionHandle, SimCommand};
use crate::config::ServerConfig;
use crate::database::Database;
use crate::entity::new_entity_id;
use crate::game_data::GameData;
use crate::moderation;

/// Everything a connection handler needs, shared by all sessions.
#[derive(Clone)]
pub struct SessionContext {
    pub db: Arc<Database>,
    pub data: Arc<GameData>,
    pub config: Arc<ServerConfig>,
    pub cmd_tx: mpsc::UnboundedSender<SimCommand>,
}

// ============================================================================
// FRAMING
// ============================================================================

/// Decodes one inbound frame: MessagePack for binary frames, JSON fallback
/// for text. Malformed payloads and prototype-pollution shapes yield None
/// and are dropped without closing the connection.
pub fn decode_frame(frame: &Message) -> Option<ClientMessage> {
    let value: Value = match frame {
        Message::Binary(bytes) => rmp_serde::from_slice(bytes).ok()?,
        Message::Text(text) => serde_json::from_str(text.as_str()).ok()?,
        _ => return None,
    };
    sanitize(value)
}

fn sanitize(mut value: Value) -> Option<ClientMessage> {
    {
        let object = value.as_object()?;
        if object.keys().any(|k| k == "__proto__" || k == "constructor") {
            return None;
        }
    }
    // Payload-less messages may omit `data` entirely.
    if value.get("data").is_none() {
        value
            .as_object_mut()?
            .insert("data".to_string(), Value::Object(Default::default()));
    }
    serde_json::from_value(value).ok()
}

/// Outbound is always MessagePack with named fields, so every payload is a
/// self-describing `{type, data}` map.
pub fn encode_message(msg: &ServerMessage) -> Vec<u8> {
    match rmp_serde::to_vec_named(msg) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to encode outbound message: {}", e);
            Vec::new()
        }
    }
}

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Burst detector: messages closer together than the window grow a counter;
/// past the limit the sender is told off and the message is ignored. Any
/// gap wider than the window resets it.
pub struct BurstLimiter {
    last: Instant,
    burst: u32,
}

impl Default for BurstLimiter {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            last: now.checked_sub(Duration::from_secs(1)).unwrap_or(now),
            burst: 0,
        }
    }
}

impl BurstLimiter {
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let within = now.duration_since(self.last) < Duration::from_millis(INPUT_BURST_WINDOW_MS);
        self.last = now;
        if within {
            self.burst += 1;
            if self.burst > INPUT_BURST_LIMIT {
                return false;
            }
        } else {
            self.burst = 0;
        }
        true
    }
}

type AuthLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn new_auth_limiter() -> AuthLimiter {
    RateLimiter::direct(Quota::per_minute(
        NonZeroU32::new(AUTH_ATTEMPTS_PER_MINUTE).expect("nonzero quota"),
    ))
}

// ============================================================================
// SESSION
// ============================================================================

struct Session {
    account_id: Option<i64>,
    username: Option<String>,
    player_id: Option<EntityId>,
    burst: BurstLimiter,
    auth_limiter: AuthLimiter,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    fn new(event_tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            account_id: None,
            username: None,
            player_id: None,
            burst: BurstLimiter::default(),
            auth_limiter: new_auth_limiter(),
            event_tx,
        }
    }

    async fn complete_auth(&mut self, success: AuthSuccess, ctx: &SessionContext) -> Vec<ServerMessage> {
        self.account_id = Some(success.account_id);
        self.username = Some(success.username);
        match ctx.db.get_alive_characters(success.account_id).await {
            Ok(characters) => vec![ServerMessage::CharacterList { characters }],
            Err(e) => {
                warn!("character list load failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// One task per connection: reads frames, pushes commands toward the
/// simulation, and relays simulation events back out the socket.
pub async fn run_session(ws: WebSocketStream<TcpStream>, ctx: SessionContext) {
    let (mut sink, mut stream) = ws.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(event_tx);

    'main: loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                    frame => {
                        if !session.burst.allow() {
                            let err = ServerMessage::Error { message: "rate-limited".to_string() };
                            if sink.send(Message::binary(encode_message(&err))).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        let Some(msg) = decode_frame(&frame) else {
                            debug!("dropping malformed frame");
                            continue;
                        };
                        for reply in handle_message(&mut session, msg, &ctx).await {
                            if sink.send(Message::binary(encode_message(&reply))).await.is_err() {
                                break 'main;
                            }
                        }
                    }
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Message(msg) => {
                        if sink.send(Message::binary(encode_message(&msg))).await.is_err() {
                            break;
                        }
                    }
                    SessionEvent::Detached(reason) => {
                        session.player_id = None;
                        // Permadeath pushes a fresh character list so the
                        // client lands back on character select.
                        if reason == DetachReason::Died {
                            if let Some(account_id) = session.account_id {
                                if let Ok(characters) = ctx.db.get_alive_characters(account_id).await {
                                    let msg = ServerMessage::CharacterList { characters };
                                    if sink.send(Message::binary(encode_message(&msg))).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    // Socket gone: the player leaves the world at the next tick boundary.
    if let Some(player_id) = session.player_id {
        let _ = ctx.cmd_tx.send(SimCommand::Detach { player_id });
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

async fn handle_message(
    session: &mut Session,
    msg: ClientMessage,
    ctx: &SessionContext,
) -> Vec<ServerMessage> {
    match msg {
        // ----------------------------------------------------------- account
        ClientMessage::Auth { user, pass } => {
            if session.auth_limiter.check().is_err() {
                return vec![rate_limited()];
            }
            let (reply, success) = auth::login(&ctx.db, &user, &pass).await;
            let mut out = vec![reply];
            if let Some(success) = success {
                out.extend(session.complete_auth(success, ctx).await);
            }
            out
        }
        ClientMessage::AuthToken { token } => {
            if session.auth_limiter.check().is_err() {
                return vec![rate_limited()];
            }
            let (reply, success) = auth::login_with_token(&ctx.db, &token).await;
            let mut out = vec![reply];
            if let Some(success) = success {
                out.extend(session.complete_auth(success, ctx).await);
            }
            out
        }
        ClientMessage::Register { user, pass } => {
            if session.auth_limiter.check().is_err() {
                return vec![rate_limited()];
            }
            vec![auth::register(&ctx.db, &user, &pass).await]
        }
        ClientMessage::Logout { token } => {
            let _ = ctx.db.revoke_session(&token).await;
            if let Some(player_id) = session.player_id.take() {
                let _ = ctx.cmd_tx.send(SimCommand::Detach { player_id });
            }
            session.account_id = None;
            session.username = None;
            Vec::new()
        }
        ClientMessage::CreateCharacter { class_id } => {
            let Some(account_id) = session.account_id else {
                return Vec::new();
            };
            match auth::create_character(&ctx.db, &ctx.data, account_id, &class_id).await {
                Ok(_) => match ctx.db.get_alive_characters(account_id).await {
                    Ok(characters) => vec![ServerMessage::CharacterList { characters }],
                    Err(_) => Vec::new(),
                },
                Err(message) => vec![ServerMessage::Error { message }],
            }
        }
        ClientMessage::SelectCharacter { character_id } => {
            let Some(account_id) = session.account_id else {
                return Vec::new();
            };
            if session.player_id.is_some() {
                return Vec::new();
            }
            let Some((record, vault_items)) =
                auth::select_character(&ctx.db, account_id, character_id).await
            else {
                return Vec::new();
            };
            let player_id = new_entity_id();
            session.player_id = Some(player_id);
            let handle = SessionHandle {
                player_id,
                account_id,
                username: session.username.clone().unwrap_or_default(),
                sender: session.event_tx.clone(),
            };
            let _ = ctx.cmd_tx.send(SimCommand::Attach {
                session: handle,
                record,
                vault_items,
            });
            Vec::new()
        }

        // ---------------------------------------------------------- gameplay
        ClientMessage::Input(mut input) => {
            let Some(player_id) = session.player_id else {
                return Vec::new();
            };
            if !input.move_direction.x.is_finite()
                || !input.move_direction.y.is_finite()
                || !input.aim_angle.is_finite()
            {
                return Vec::new();
            }
            let len = input.move_direction.length();
            if len > 1.0 {
                input.move_direction /= len;
            }
            let _ = ctx.cmd_tx.send(SimCommand::Input { player_id, input });
            Vec::new()
        }
        ClientMessage::Shoot { aim_angle } => {
            let Some(player_id) = session.player_id else {
                return Vec::new();
            };
            if !aim_angle.is_finite() {
                return Vec::new();
            }
            let _ = ctx.cmd_tx.send(SimCommand::Shoot { player_id, aim_angle });
            Vec::new()
        }
        ClientMessage::UseAbility {} => {
            session.forward(|player_id| SimCommand::UseAbility { player_id }, ctx)
        }
        ClientMessage::PickupLoot { loot_id } => {
            session.forward(|player_id| SimCommand::PickupLoot { player_id, loot_id }, ctx)
        }
        ClientMessage::EnterPortal { portal_id } => {
            session.forward(|player_id| SimCommand::EnterPortal { player_id, portal_id }, ctx)
        }
        ClientMessage::ReturnToNexus {} => {
            session.forward(|player_id| SimCommand::ReturnToNexus { player_id }, ctx)
        }
        ClientMessage::Chat { message } => {
            let Some(player_id) = session.player_id else {
                return Vec::new();
            };
            let trimmed = message.trim();
            if trimmed.is_empty() || trimmed.chars().count() > CHAT_MAX_LEN {
                return Vec::new();
            }
            let escaped = moderation::escape_html(trimmed);
            let _ = ctx.cmd_tx.send(SimCommand::Chat { player_id, message: escaped });
            Vec::new()
        }
        ClientMessage::SwapItems { from, to } => {
            session.forward(|player_id| SimCommand::SwapItems { player_id, from, to }, ctx)
        }
        ClientMessage::DropItem { slot } => {
            session.forward(|player_id| SimCommand::DropItem { player_id, slot }, ctx)
        }
        ClientMessage::InteractVaultChest {} => {
            session.forward(|player_id| SimCommand::InteractVaultChest { player_id }, ctx)
        }
        ClientMessage::VaultTransfer { from_vault, from_slot, to_slot } => session.forward(
            |player_id| SimCommand::VaultTransfer { player_id, from_vault, from_slot, to_slot },
            ctx,
        ),
        ClientMessage::CloseVault {} => {
            session.forward(|player_id| SimCommand::CloseVault { player_id }, ctx)
        }
    }
}

impl Session {
    /// Gameplay messages need a resident player; without one they are
    /// silently dropped.
    fn forward(
        &self,
        build: impl FnOnce(EntityId) -> SimCommand,
        ctx: &SessionContext,
    ) -> Vec<ServerMessage> {
        if let Some(player_id) = self.player_id {
            let _ = ctx.cmd_tx.send(build(player_id));
        }
        Vec::new()
    }
}

fn rate_limited() -> ServerMessage {
    ServerMessage::Error { message: "rate-limited".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberfall_shared::PlayerInput;
    use glam::Vec2;

    fn test_ctx(
        db: Database,
    ) -> (SessionContext, mpsc::UnboundedReceiver<SimCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (
            SessionContext {
                db: Arc::new(db),
                data: Arc::new(GameData::default()),
                config: Arc::new(ServerConfig::default()),
                cmd_tx,
            },
            cmd_rx,
        )
    }

    fn test_session() -> (Session, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Session::new(event_tx), event_rx)
    }

    #[test]
    fn test_binary_frames_decode_as_msgpack() {
        let msg = ClientMessage::Chat { message: "hello".into() };
        let bytes = rmp_serde::to_vec_named(&msg).unwrap();
        let decoded = decode_frame(&Message::binary(bytes)).unwrap();
        match decoded {
            ClientMessage::Chat { message } => assert_eq!(message, "hello"),
            other => panic!("expected chat, got {:?}", other),
        }
    }

    #[test]
    fn test_text_frames_decode_as_json() {
        let decoded = decode_frame(&Message::text(
            r#"{"type":"shoot","data":{"aimAngle":1.5}}"#,
        ))
        .unwrap();
        assert!(matches!(decoded, ClientMessage::Shoot { .. }));
    }

    #[test]
    fn test_missing_data_is_tolerated_for_payloadless_messages() {
        let decoded = decode_frame(&Message::text(r#"{"type":"returnToNexus"}"#));
        assert!(matches!(decoded, Some(ClientMessage::ReturnToNexus {})));
    }

    #[test]
    fn test_prototype_pollution_is_rejected() {
        for raw in [
            r#"{"type":"chat","data":{"message":"x"},"__proto__":{}}"#,
            r#"{"type":"chat","data":{"message":"x"},"constructor":{}}"#,
        ] {
            assert!(decode_frame(&Message::text(raw)).is_none(), "{}", raw);
        }
    }

    #[test]
    fn test_unknown_and_malformed_frames_are_dropped() {
        assert!(decode_frame(&Message::text(r#"{"type":"sudo","data":{}}"#)).is_none());
        assert!(decode_frame(&Message::text("not json")).is_none());
        assert!(decode_frame(&Message::binary(vec![0xc1, 0x00])).is_none());
        assert!(decode_frame(&Message::text("[1,2,3]")).is_none());
    }

    #[test]
    fn test_outbound_is_self_describing_msgpack() {
        let msg = ServerMessage::LevelUp { level: 4 };
        let bytes = encode_message(&msg);
        // Round-trips through a generic value with the {type, data} shape.
        let value: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "levelUp");
        assert_eq!(value["data"]["level"], 4);
    }

    #[test]
    fn test_burst_limiter_trips_and_recovers() {
        let mut limiter = BurstLimiter::default();
        assert!(limiter.allow());
        let mut tripped = false;
        // A tight loop easily lands inside the 10ms window.
        for _ in 0..(INPUT_BURST_LIMIT * 2) {
            if !limiter.allow() {
                tripped = true;
                break;
            }
        }
        assert!(tripped, "burst limiter never tripped");
        std::thread::sleep(Duration::from_millis(INPUT_BURST_WINDOW_MS + 5));
        assert!(limiter.allow(), "limiter should reset after a quiet window");
    }

    #[tokio::test]
    async fn test_auth_rate_limit_per_connection() {
        let db = Database::connect_memory().await.unwrap();
        let (ctx, _cmd_rx) = test_ctx(db);
        let (mut session, _event_rx) = test_session();

        for i in 0..AUTH_ATTEMPTS_PER_MINUTE {
            let replies = handle_message(
                &mut session,
                ClientMessage::Auth { user: "ghost".into(), pass: "pw".into() },
                &ctx,
            )
            .await;
            assert!(
                matches!(replies[0], ServerMessage::AuthResult { success: false, .. }),
                "attempt {} should reach auth",
                i
            );
        }
        let replies = handle_message(
            &mut session,
            ClientMessage::Auth { user: "ghost".into(), pass: "pw".into() },
            &ctx,
        )
        .await;
        assert!(matches!(replies[0], ServerMessage::Error { .. }));
    }

    #[tokio::test]
    async fn test_gameplay_messages_require_resident_player() {
        let db = Database::connect_memory().await.unwrap();
        let (ctx, mut cmd_rx) = test_ctx(db);
        let (mut session, _event_rx) = test_session();

        let replies = handle_message(
            &mut session,
            ClientMessage::Shoot { aim_angle: 0.0 },
            &ctx,
        )
        .await;
        assert!(replies.is_empty());
        assert!(cmd_rx.try_recv().is_err(), "no player, no command");
    }

    #[tokio::test]
    async fn test_chat_validation_and_escaping() {
        let db = Database::connect_memory().await.unwrap();
        let (ctx, mut cmd_rx) = test_ctx(db);
        let (mut session, _event_rx) = test_session();
        session.player_id = Some(new_entity_id());

        // Empty and oversized chat lines are dropped.
        handle_message(&mut session, ClientMessage::Chat { message: "   ".into() }, &ctx).await;
        handle_message(
            &mut session,
            ClientMessage::Chat { message: "x".repeat(CHAT_MAX_LEN + 1) },
            &ctx,
        )
        .await;
        assert!(cmd_rx.try_recv().is_err());

        handle_message(
            &mut session,
            ClientMessage::Chat { message: "<b>hi</b>".into() },
            &ctx,
        )
        .await;
        match cmd_rx.try_recv().unwrap() {
            SimCommand::Chat { message, .. } => {
                assert_eq!(message, "&lt;b&gt;hi&lt;/b&gt;");
            }
            other => panic!("expected chat command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_input_is_sanitized() {
        let db = Database::connect_memory().await.unwrap();
        let (ctx, mut cmd_rx) = test_ctx(db);
        let (mut session, _event_rx) = test_session();
        session.player_id = Some(new_entity_id());

        // NaN aim is rejected outright.
        handle_message(
            &mut session,
            ClientMessage::Input(PlayerInput {
                move_direction: Vec2::new(0.0, 0.0),
                aim_angle: f32::NAN,
                shooting: false,
            }),
            &ctx,
        )
        .await;
        assert!(cmd_rx.try_recv().is_err());

        // Oversized direction renormalizes to unit length.
        handle_message(
            &mut session,
            ClientMessage::Input(PlayerInput {
                move_direction: Vec2::new(3.0, 4.0),
                aim_angle: 0.0,
                shooting: true,
            }),
            &ctx,
        )
        .await;
        match cmd_rx.try_recv().unwrap() {
            SimCommand::Input { input, .. } => {
                assert!((input.move_direction.length() - 1.0).abs() < 1e-4);
                assert!(input.shooting);
            }
            other => panic!("expected input command, got {:?}", other),
        }
    }
}
