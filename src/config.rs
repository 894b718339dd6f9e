//! Configuration file parser for ~/.config/castfeed/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::storage::{DropboxEndpoints, DEFAULT_PART_THRESHOLD, DEFAULT_WRITE_CHUNK};

/// Environment variable holding the Dropbox access token.
pub const ACCESS_TOKEN_ENV: &str = "DROPBOX_ACCESS_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// SEC-015: Custom Debug impl masks `access_token` to prevent secret leakage
/// in logs, error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dropbox access token (alternative to DROPBOX_ACCESS_TOKEN env var).
    /// Env var takes precedence over config file.
    pub access_token: Option<String>,

    /// Buffered bytes that trigger sending an upload segment.
    pub chunk_threshold_bytes: usize,

    /// Slice size used when feeding the serialized feed into the upload buffer.
    pub write_chunk_bytes: usize,

    /// Timeout applied to every storage request.
    pub request_timeout_secs: u64,

    /// Override for the Dropbox RPC host (testing).
    pub api_base_url: Option<String>,

    /// Override for the Dropbox content host (testing).
    pub content_base_url: Option<String>,

    /// Enables debug-level logging for this crate.
    pub debug: bool,

    /// Channel and item fields that workflow input does not provide.
    pub channel: ChannelDefaults,
}

/// Fixed channel/item metadata written into every feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelDefaults {
    /// Channel `<link>` when the input has no `site_url`.
    pub site_url: Option<String>,
    pub image_url: Option<String>,
    pub language: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub subtitle: Option<String>,
    pub explicit: bool,
    /// `itunes:duration` written on items, in seconds.
    pub item_duration_secs: Option<u64>,
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            site_url: None,
            image_url: None,
            language: "en".to_string(),
            author: Some("castfeed".to_string()),
            summary: Some("Automated playlist generated by castfeed".to_string()),
            subtitle: Some("Automated playlist generated by castfeed".to_string()),
            explicit: false,
            item_duration_secs: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_token: None,
            chunk_threshold_bytes: DEFAULT_PART_THRESHOLD,
            write_chunk_bytes: DEFAULT_WRITE_CHUNK,
            request_timeout_secs: 30,
            api_base_url: None,
            content_base_url: None,
            debug: false,
            channel: ChannelDefaults::default(),
        }
    }
}

/// SEC-015: Mask access_token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("chunk_threshold_bytes", &self.chunk_threshold_bytes)
            .field("write_chunk_bytes", &self.write_chunk_bytes)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("api_base_url", &self.api_base_url)
            .field("content_base_url", &self.content_base_url)
            .field("debug", &self.debug)
            .field("channel", &self.channel)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "access_token",
                "chunk_threshold_bytes",
                "write_chunk_bytes",
                "request_timeout_secs",
                "api_base_url",
                "content_base_url",
                "debug",
                "channel",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Resolves the access token, preferring the environment over the file.
    pub fn access_token(&self) -> Option<SecretString> {
        self.access_token_with_env(std::env::var(ACCESS_TOKEN_ENV).ok())
    }

    fn access_token_with_env(&self, env_value: Option<String>) -> Option<SecretString> {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.access_token.clone())
            .map(SecretString::from)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Dropbox endpoints with any configured overrides applied.
    pub fn endpoints(&self) -> DropboxEndpoints {
        let defaults = DropboxEndpoints::default();
        DropboxEndpoints {
            api: self.api_base_url.clone().unwrap_or(defaults.api),
            content: self.content_base_url.clone().unwrap_or(defaults.content),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.access_token.is_none());
        assert_eq!(config.chunk_threshold_bytes, 5_242_880);
        assert_eq!(config.write_chunk_bytes, 4_194_304);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(!config.debug);
        assert_eq!(config.channel.language, "en");
        assert!(!config.channel.explicit);
        assert_eq!(config.endpoints(), DropboxEndpoints::default());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/castfeed_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.chunk_threshold_bytes, DEFAULT_PART_THRESHOLD);
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("castfeed_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.request_timeout_secs, 30);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("castfeed_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "debug = true\n\n[channel]\nlanguage = \"de\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.debug);
        assert_eq!(config.channel.language, "de");
        assert_eq!(config.channel.author.as_deref(), Some("castfeed")); // default
        assert_eq!(config.chunk_threshold_bytes, DEFAULT_PART_THRESHOLD); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("castfeed_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
access_token = "file-token"
chunk_threshold_bytes = 1024
write_chunk_bytes = 256
request_timeout_secs = 5
api_base_url = "http://127.0.0.1:9000"
content_base_url = "http://127.0.0.1:9001"

[channel]
site_url = "https://example.com"
image_url = "https://example.com/cover.png"
author = "Host"
explicit = true
item_duration_secs = 1800
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.chunk_threshold_bytes, 1024);
        assert_eq!(config.write_chunk_bytes, 256);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.endpoints().api, "http://127.0.0.1:9000");
        assert_eq!(config.endpoints().content, "http://127.0.0.1:9001");
        assert_eq!(config.channel.site_url.as_deref(), Some("https://example.com"));
        assert_eq!(config.channel.author.as_deref(), Some("Host"));
        assert!(config.channel.explicit);
        assert_eq!(config.channel.item_duration_secs, Some(1800));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("castfeed_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "chunk_threshold_bytes = [not valid").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = std::env::temp_dir().join("castfeed_config_test_wrong_type");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "request_timeout_secs = \"soon\"\n").unwrap();

        assert!(Config::load(&path).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = std::env::temp_dir().join("castfeed_config_test_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let big = "# padding\n".repeat(110_000);
        std::fs::write(&path, big).unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::TooLarge(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_token_takes_precedence() {
        let config = Config {
            access_token: Some("file-token".into()),
            ..Default::default()
        };

        let token = config.access_token_with_env(Some("env-token".into())).unwrap();
        assert_eq!(token.expose_secret(), "env-token");

        let token = config.access_token_with_env(None).unwrap();
        assert_eq!(token.expose_secret(), "file-token");

        // Blank env value falls through to the file
        let token = config.access_token_with_env(Some("  ".into())).unwrap();
        assert_eq!(token.expose_secret(), "file-token");

        assert!(Config::default().access_token_with_env(None).is_none());
    }

    #[test]
    fn test_debug_masks_access_token() {
        let config = Config {
            access_token: Some("sk-secret-value".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }
}
