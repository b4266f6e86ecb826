use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LogDrainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Http,
    Stdio,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_mode")]
    pub mode: ServerMode,
    #[serde(default)]
    pub http_addr: Option<String>,
    #[serde(default)]
    pub http_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            http_addr: None,
            http_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared drain credential, compared against the basic-auth password on
    /// every ingestion call. Unset disables the auth layer (bootstrap mode).
    #[serde(default)]
    pub drain_token: Option<String>,
    /// HMAC secret for webhook batch signatures. Unset bypasses verification.
    #[serde(default)]
    pub drain_secret: Option<String>,
    /// Token echoed in the `x-vercel-verify` response header.
    #[serde(default)]
    pub verify_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load a YAML or JSON config file, then apply environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LogDrainError::ConfigError(format!("read {}: {e}", path.display()))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut config: Config = if is_yaml {
            serde_yaml::from_str(&raw).map_err(|e| LogDrainError::ConfigError(e.to_string()))?
        } else {
            serde_json::from_str(&raw)
                .or_else(|_| serde_yaml::from_str(&raw))
                .map_err(|e| LogDrainError::ConfigError(e.to_string()))?
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(token) = env::var("DRAIN_AUTH_TOKEN") {
            self.auth.drain_token = Some(token);
        }
        if let Ok(secret) = env::var("LOG_DRAIN_SECRET") {
            self.auth.drain_secret = Some(secret);
        }
        if let Ok(token) = env::var("VERCEL_VERIFY_TOKEN") {
            self.auth.verify_token = Some(token);
        }
    }
}

fn default_mode() -> ServerMode {
    ServerMode::Http
}

fn default_db_url() -> String {
    "sqlite://logs.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "server:\n  mode: both\n  http_port: 8080\nauth:\n  drain_token: sekrit\n",
        )
        .unwrap();

        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.server.mode, ServerMode::Both);
        assert_eq!(cfg.server.http_port, Some(8080));
        assert_eq!(cfg.auth.drain_token.as_deref(), Some("sekrit"));
        assert_eq!(cfg.database.max_connections, 5);
    }

    #[test]
    fn json_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server": {"mode": "stdio"}}"#).unwrap();

        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.server.mode, ServerMode::Stdio);
    }
}
