use log::{info, warn};
use serde::Deserialize;
use std::fs;

use emberfall_shared::DEFAULT_PORT;

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================
// Deployment knobs only; gameplay tunables live in shared constants.
// Sources, in priority order: environment (PORT, DB_PATH), config.toml
// (path overridable via CONFIG_PATH), built-in defaults.

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: Server,
    pub security: Security,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub port: u16,
    pub max_connections: usize,
    pub db_path: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_connections: 256,
            db_path: "emberfall.db".to_string(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Security {
    /// Connections with an Origin header not in this list are refused;
    /// connections without one (native clients) are accepted.
    pub allowed_origins: Vec<String>,
    /// Line-delimited usernames, watched for live updates.
    pub admin_allowlist: String,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "https://play.emberfall.dev".to_string(),
            ],
            admin_allowlist: "admins.txt".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn load() -> Result<Self, String> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<ServerConfig>(&contents)
                .map_err(|e| format!("Failed to parse {}: {}", path, e))?,
            Err(_) => {
                info!("no {} found, using defaults", path);
                ServerConfig::default()
            }
        };

        if let Ok(port) = std::env::var("PORT") {
            match port.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!("ignoring unparseable PORT={}", port),
            }
        }
        if let Ok(db_path) = std::env::var("DB_PATH") {
            config.server.db_path = db_path;
        }

        if config.server.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.db_path, "emberfall.db");
        assert!(!config.security.allowed_origins.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [server]
            port = 9001
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.db_path, "emberfall.db");
        assert_eq!(config.security.admin_allowlist, "admins.txt");
    }

    #[test]
    fn test_full_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            [server]
            port = 9001
            max_connections = 64
            db_path = "/tmp/test.db"

            [security]
            allowed_origins = ["https://game.example"]
            admin_allowlist = "/etc/emberfall/admins.txt"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.security.allowed_origins, vec!["https://game.example"]);
    }
}
