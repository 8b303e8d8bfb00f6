//! Configuration management for chatline.
//!
//! Loads configuration from ${CHATLINE_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7860";
pub const BASE_URL_ENV: &str = "CHATLINE_BASE_URL";
pub const API_KEY_ENV: &str = "CHATLINE_API_KEY";

/// Default config file contents, with comments.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for chatline configuration and data directories.
    //!
    //! CHATLINE_HOME resolution order:
    //! 1. CHATLINE_HOME environment variable (if set)
    //! 2. ~/.config/chatline (default)
    //! 3. ./.chatline when no home directory can be determined

    use std::path::PathBuf;

    pub fn chatline_home() -> PathBuf {
        if let Ok(home) = std::env::var("CHATLINE_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".chatline"),
            |h| h.join(".config").join("chatline"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        chatline_home().join("config.toml")
    }

    pub fn logs_dir() -> PathBuf {
        chatline_home().join("logs")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// 0 disables the timeout.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 0 disables the timeout.
    pub connect_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    pub refetch: bool,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self { refetch: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when CHATLINE_LOG is unset.
    pub level: String,
    pub to_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            to_file: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub edit: EditConfig,
    pub log: LogConfig,
}

impl Config {
    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    /// Base URL with precedence env > config > default.
    pub fn effective_base_url(&self) -> Result<Url> {
        let env = std::env::var(BASE_URL_ENV).ok();
        resolve_base_url(env.as_deref(), self.server.base_url.as_deref())
    }

    /// API key with precedence env > config. Blank values count as unset.
    pub fn effective_api_key(&self) -> Option<String> {
        let env = std::env::var(API_KEY_ENV).ok();
        non_blank(env.as_deref())
            .or_else(|| non_blank(self.server.api_key.as_deref()))
            .map(str::to_string)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        secs(self.server.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        secs(self.stream.connect_timeout_secs)
    }
}

/// Picks the first non-blank of `env`, `config`, the default, and validates it.
pub fn resolve_base_url(env: Option<&str>, config: Option<&str>) -> Result<Url> {
    let (raw, source) = match (non_blank(env), non_blank(config)) {
        (Some(url), _) => (url, BASE_URL_ENV),
        (None, Some(url)) => (url, "server.base_url"),
        (None, None) => (DEFAULT_BASE_URL, "default"),
    };
    Url::parse(raw).with_context(|| format!("Invalid base URL from {source}: {raw}"))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.base_url.as_deref(), Some(DEFAULT_BASE_URL));
        assert!(config.edit.refetch);
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(
            &config_path,
            "[server]\nbase_url = \"https://flows.example\"\n\n[log]\nto_file = true\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.server.base_url.as_deref(), Some("https://flows.example"));
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.log.to_file);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[server\n").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("base_url = \"http://127.0.0.1:7860\""));
        assert!(contents.contains("# api_key ="));
        assert_eq!(Config::load_from(&config_path).unwrap(), Config::default());
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "").unwrap();

        let err = Config::init(&config_path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_base_url_precedence() {
        assert_eq!(
            resolve_base_url(Some("http://env:1"), Some("http://cfg:2"))
                .unwrap()
                .as_str(),
            "http://env:1/"
        );
        assert_eq!(
            resolve_base_url(Some("  "), Some("http://cfg:2")).unwrap().as_str(),
            "http://cfg:2/"
        );
        assert_eq!(
            resolve_base_url(None, None).unwrap().as_str(),
            "http://127.0.0.1:7860/"
        );
        assert!(resolve_base_url(None, Some("not a url")).is_err());
    }

    #[test]
    fn test_zero_timeouts_disable() {
        let mut config = Config::default();
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        config.server.request_timeout_secs = 0;
        config.stream.connect_timeout_secs = 0;
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.connect_timeout(), None);
    }
}
