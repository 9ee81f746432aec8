//! Configuration loading and management.
//!
//! Configuration is loaded with the following precedence:
//! 1. Environment variables (`BROKER_SESSION_*`)
//! 2. Config file (`~/.broker-session/config.toml`)
//! 3. Defaults

use crate::error::{Error, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Remote backend configuration.
    pub backend: BackendConfig,

    /// Broker defaults.
    pub broker: BrokerConfig,

    /// OAuth popup flow configuration.
    pub oauth: OAuthConfig,

    /// Retry policy for retryable calls.
    pub retry: RetryConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted session records.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_home(),
        }
    }
}

/// Remote backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL that `/broker/*` paths are appended to.
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/modules/auth".to_string(),
            timeout_seconds: 20,
        }
    }
}

impl BackendConfig {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Broker defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker name used when a payload carries none.
    pub default_name: String,

    /// Broker login page the OAuth flow starts from.
    pub login_url: String,

    /// Broker API key (empty when unset).
    pub api_key: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_name: crate::core::DEFAULT_BROKER_NAME.to_string(),
            login_url: "https://kite.zerodha.com/connect/login".to_string(),
            api_key: String::new(),
        }
    }
}

/// OAuth popup flow configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// How often the popup is polled for a redirect, in milliseconds.
    pub poll_interval_ms: u64,

    /// Give up on the flow after this many seconds.
    pub timeout_seconds: u64,

    /// The application's own origin; the popup is done once it lands here.
    pub app_origin: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            timeout_seconds: 300,
            app_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl OAuthConfig {
    /// Poll interval as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Flow timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

/// Get the default broker-session home directory.
fn default_home() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from(".broker-session"),
        |h| h.join(".broker-session"),
    )
}

/// Load configuration with precedence: env vars → file → defaults.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    let config_path = get_config_path();
    if config_path.exists() {
        let contents = fs::read_to_string(&config_path).map_err(Error::Storage)?;
        config = toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the path to the config file.
fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var("BROKER_SESSION_CONFIG") {
        return PathBuf::from(path);
    }

    if let Ok(home) = env::var("BROKER_SESSION_HOME") {
        return PathBuf::from(home).join("config.toml");
    }

    default_home().join("config.toml")
}

/// Apply environment variable overrides to config.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(path) = env::var("BROKER_SESSION_STORAGE_PATH") {
        config.storage.path = PathBuf::from(path);
    } else if let Ok(home) = env::var("BROKER_SESSION_HOME") {
        config.storage.path = PathBuf::from(home);
    }

    if let Ok(url) = env::var("BROKER_SESSION_BASE_URL") {
        config.backend.base_url = url;
    }

    if let Ok(val) = env::var("BROKER_SESSION_TIMEOUT_SECONDS") {
        if let Ok(secs) = val.parse() {
            config.backend.timeout_seconds = secs;
        }
    }

    if let Ok(key) = env::var("BROKER_SESSION_API_KEY") {
        config.broker.api_key = key.trim().to_string();
    }

    if let Ok(val) = env::var("BROKER_SESSION_MAX_ATTEMPTS") {
        if let Ok(max) = val.parse() {
            config.retry.max_attempts = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.backend.timeout_seconds, 20);
        assert_eq!(config.broker.default_name, "zerodha");
        assert_eq!(config.oauth.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.oauth.timeout(), Duration::from_secs(300));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.broker.api_key.is_empty());
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
            [backend]
            base_url = "https://api.example.com/auth"
            timeout_seconds = 5

            [broker]
            api_key = "kite-key"

            [oauth]
            poll_interval_ms = 250
            app_origin = "https://dash.example.com"

            [retry]
            max_attempts = 5
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.base_url, "https://api.example.com/auth");
        assert_eq!(config.backend.timeout(), Duration::from_secs(5));
        assert_eq!(config.broker.api_key, "kite-key");
        assert_eq!(config.oauth.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.oauth.app_origin, "https://dash.example.com");
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml = r"
            [retry]
            max_delay_ms = 1000
        ";

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.max_delay_ms, 1000);
        assert_eq!(config.retry.base_delay_ms, 500); // Default
        assert_eq!(config.oauth.timeout_seconds, 300); // Default
        assert_eq!(config.broker.default_name, "zerodha"); // Default
    }
}
