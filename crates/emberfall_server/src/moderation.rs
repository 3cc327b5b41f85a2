// ============================================================================
// CONTENT MODERATION
// ============================================================================
// rustrict handles profanity; the html escape keeps chat text inert when
// rendered by web clients.

use rustrict::CensorStr;

/// Censors profanity in a chat line, leaving clean text untouched.
pub fn censor_chat(text: &str) -> String {
    if text.is_inappropriate() {
        text.censor()
    } else {
        text.to_string()
    }
}

/// Escapes HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Result of a username check at registration time.
pub struct NameCheck {
    pub ok: bool,
    pub reason: Option<String>,
}

/// Usernames are strict: 3..=20 chars, alphanumeric plus `_`/`-`, and no
/// profanity. The username doubles as every character's display name.
pub fn check_username(username: &str) -> NameCheck {
    let trimmed = username.trim();
    if trimmed.len() < 3 {
        return NameCheck {
            ok: false,
            reason: Some("Username must be at least 3 characters".to_string()),
        };
    }
    if trimmed.len() > 20 {
        return NameCheck {
            ok: false,
            reason: Some("Username must be no more than 20 characters".to_string()),
        };
    }
    if !trimmed.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return NameCheck {
            ok: false,
            reason: Some(
                "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
            ),
        };
    }
    if trimmed.is_inappropriate() {
        return NameCheck {
            ok: false,
            reason: Some("Username contains inappropriate content".to_string()),
        };
    }
    NameCheck { ok: true, reason: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_username() {
        assert!(check_username("Valid_User-123").ok);
    }

    #[test]
    fn test_username_length_limits() {
        assert!(!check_username("ab").ok);
        assert!(!check_username("ThisUsernameIsWayTooLongForTheGame").ok);
    }

    #[test]
    fn test_username_charset() {
        assert!(!check_username("no spaces").ok);
        assert!(!check_username("<script>").ok);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b onclick="x('y')">&"#),
            "&lt;b onclick=&quot;x(&#39;y&#39;)&quot;&gt;&amp;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_clean_chat_passes_through() {
        assert_eq!(censor_chat("hello there"), "hello there");
    }
}
