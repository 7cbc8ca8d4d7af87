//! Configuration management for flowchat.
//!
//! Settings are read from `config.toml` in the data directory. Every field
//! has a default, so the file is optional and may be partial.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flowchat_client::ClientConfig;

/// File name of the settings file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// File name of the durable session store inside the data directory.
pub const STATE_FILE: &str = "state.json";

/// Root configuration for flowchat.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerSettings,
    /// Polling and composition configuration.
    #[serde(default)]
    pub chat: ChatSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Server origin (default: http://localhost:8000).
    #[serde(default = "default_server_url")]
    pub url: String,
    /// Whole-request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Polling and composition configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    /// Poll interval in milliseconds (default: 2000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Typing-signal expiry in milliseconds (default: 3000).
    #[serde(default = "default_typing_timeout_ms")]
    pub typing_timeout_ms: u64,
    /// Maximum message length in characters (default: 500).
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_typing_timeout_ms() -> u64 {
    3000
}

fn default_max_message_len() -> usize {
    500
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            typing_timeout_ms: default_typing_timeout_ms(),
            max_message_len: default_max_message_len(),
        }
    }
}

impl Settings {
    /// Load settings from `data_dir`. A missing file yields the defaults.
    pub async fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::ReadError { path, source: e }),
        };

        toml::from_str(&content).map_err(|e| ConfigError::ParseError { path, source: e })
    }

    /// Client configuration derived from these settings.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_poll_interval(Duration::from_millis(self.chat.poll_interval_ms))
            .with_typing_timeout(Duration::from_millis(self.chat.typing_timeout_ms))
            .with_max_message_len(self.chat.max_message_len)
    }

    /// Request timeout for the HTTP client.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.url, "http://localhost:8000");
        assert_eq!(settings.chat.poll_interval_ms, 2000);

        let config = settings.client_config();
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.typing_timeout, Duration::from_millis(3000));
        assert_eq!(config.max_message_len, 500);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let toml = r#"
[server]
url = "https://chat.example.com"

[chat]
poll_interval_ms = 5000
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.server.url, "https://chat.example.com");
        assert_eq!(settings.server.request_timeout_secs, 30);
        assert_eq!(settings.chat.poll_interval_ms, 5000);
        assert_eq!(settings.chat.max_message_len, 500);
    }

    #[test]
    fn empty_file_is_default() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.chat.typing_timeout_ms, 3000);
    }

    #[tokio::test]
    async fn missing_file_is_default() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path()).await.unwrap();
        assert_eq!(settings.server.url, "http://localhost:8000");
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join(CONFIG_FILE), "[chat]\npoll_interval_ms = \"fast\"")
            .await
            .unwrap();

        let err = Settings::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("flowchat");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }
}
