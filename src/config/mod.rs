//! Configuration management for Tethys.
//!
//! Configuration is read from `~/.config/tethys/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::reqwest_client::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    /// Remote account. Absent means no backend is configured.
    pub account: Option<AccountConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay before a failed push is retried.
    pub retry_delay_secs: u64,
    pub retry_tolerance_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: 30,
            retry_tolerance_secs: 60,
        }
    }
}

impl SyncConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountConfig {
    pub account_id: String,
    /// Base URL of the sync API, e.g. `https://www.inoreader.com/reader/api/0`.
    pub api_base: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/tethys/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("tethys").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        format!(
            r##"# Tethys Configuration

[http]
# Request timeout in seconds
timeout_secs = {timeout}

# User-Agent sent with every request
user_agent = "{user_agent}"

[sync]
# Delay before retrying a failed read-state push (seconds)
retry_delay_secs = 30

# Scheduling slack allowed for the retry (seconds)
retry_tolerance_secs = 60

[storage]
# Defaults to the platform data directory when unset
# database_path = "/path/to/tethys.db"
# credentials_path = "/path/to/credentials.json"

# Uncomment to synchronize read state with a remote account.
# [account]
# account_id = "me@example.com"
# api_base = "https://www.inoreader.com/reader/api/0"
# token_url = "https://www.inoreader.com/oauth2/token"
# client_id = ""
# client_secret = ""
"##,
            timeout = DEFAULT_TIMEOUT_SECS,
            user_agent = DEFAULT_USER_AGENT,
        )
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.sync.retry_delay_secs, 30);
        assert!(config.account.is_none());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[sync]
retry_delay_secs = 5

[account]
account_id = "me"
api_base = "https://api.example.com"
token_url = "https://api.example.com/token"
client_id = "id"
client_secret = "secret"
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.sync.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.sync.retry_tolerance_secs, 60);
        assert_eq!(config.http.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.account.unwrap().account_id, "me");
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.sync.retry_delay_secs, 30);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.http.timeout_secs, 10);
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[http]\ntimeout_secs = \"soon\"\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
