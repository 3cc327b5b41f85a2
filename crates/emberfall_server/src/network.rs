use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::session::{self, SessionContext};

/// Accepts a connection's Origin header: absent (native clients) or
/// explicitly allowlisted.
pub fn origin_allowed(origin: Option<&str>, allowlist: &[String]) -> bool {
    match origin {
        None => true,
        Some(origin) => allowlist.iter().any(|allowed| allowed == origin),
    }
}

/// The WebSocket accept loop: one spawned task per connection, capped by
/// `max_connections`, each handed off to the session layer after the
/// Origin-checked handshake.
pub async fn run(ctx: SessionContext) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", ctx.config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on {}", addr);

    let active = Arc::new(AtomicUsize::new(0));
    loop {
        let (stream, peer) = listener.accept().await?;
        if active.load(Ordering::Relaxed) >= ctx.config.server.max_connections {
            warn!("connection cap reached, refusing {}", peer);
            drop(stream);
            continue;
        }

        let ctx = ctx.clone();
        let active = Arc::clone(&active);
        tokio::spawn(async move {
            active.fetch_add(1, Ordering::Relaxed);

            let allowlist = ctx.config.security.allowed_origins.clone();
            let check_origin = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let origin = req
                    .headers()
                    .get("Origin")
                    .and_then(|v| v.to_str().ok());
                if origin_allowed(origin, &allowlist) {
                    Ok(resp)
                } else {
                    debug!("rejected origin {:?} from {}", origin, peer);
                    let mut response = ErrorResponse::new(None);
                    *response.status_mut() = StatusCode::FORBIDDEN;
                    Err(response)
                }
            };

            match tokio_tungstenite::accept_hdr_async(stream, check_origin).await {
                Ok(ws) => {
                    debug!("connection established from {}", peer);
                    session::run_session(ws, ctx).await;
                    debug!("connection closed from {}", peer);
                }
                Err(e) => debug!("handshake with {} failed: {}", peer, e),
            }

            active.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_allowed() {
        let allowlist = vec![
            "http://localhost:3000".to_string(),
            "https://play.emberfall.dev".to_string(),
        ];
        // Native clients send no Origin at all.
        assert!(origin_allowed(None, &allowlist));
        assert!(origin_allowed(Some("http://localhost:3000"), &allowlist));
        assert!(origin_allowed(Some("https://play.emberfall.dev"), &allowlist));
        assert!(!origin_allowed(Some("https://evil.example"), &allowlist));
        // Scheme and port must match exactly.
        assert!(!origin_allowed(Some("https://localhost:3000"), &allowlist));
        assert!(!origin_allowed(Some("http://localhost:3001"), &allowlist));
    }
}
