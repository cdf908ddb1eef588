//! Configuration for Socialhub
//!
//! Platform app registrations (client ids, secrets, redirect URIs) and
//! the store path live in a TOML file resolved per the XDG spec, with a
//! `SOCIALHUB_CONFIG` override.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub facebook: Option<AppConfig>,
    #[serde(default)]
    pub instagram: Option<AppConfig>,
    #[serde(default)]
    pub twitter: Option<AppConfig>,
    #[serde(default)]
    pub linkedin: Option<AppConfig>,
    #[serde(default)]
    pub youtube: Option<AppConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: String,
}

/// One platform's app registration.
///
/// `client_secret` doubles as the OAuth1 consumer secret for Twitter.
/// `extra` carries platform-specific knobs (API version pins, scopes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// The app registration for a platform, or a `MissingField` error
    /// naming the absent section.
    pub fn app(&self, platform: Platform) -> Result<&AppConfig> {
        let section = match platform {
            Platform::Facebook => &self.facebook,
            Platform::Instagram => &self.instagram,
            Platform::Twitter => &self.twitter,
            Platform::LinkedIn => &self.linkedin,
            Platform::YouTube => &self.youtube,
        };
        section
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField(format!("[{}]", platform)).into())
    }
}

/// Resolve the configuration file path following the XDG Base Directory
/// spec, honoring `SOCIALHUB_CONFIG`.
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SOCIALHUB_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialhub").join("config.toml"))
}

/// Resolve the data directory path following the XDG Base Directory spec.
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("socialhub"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [store]
        path = "~/.local/share/socialhub/socialhub.db"

        [facebook]
        client_id = "fb-app-id"
        client_secret = "fb-app-secret"
        redirect_uri = "https://example.test/callback/facebook"

        [twitter]
        client_id = "consumer-key"
        client_secret = "consumer-secret"
        redirect_uri = "https://example.test/callback/twitter"

        [twitter.extra]
        api_version = "1.1"
    "#;

    #[test]
    fn test_parse_sample_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.store.path, "~/.local/share/socialhub/socialhub.db");
        assert!(config.facebook.is_some());
        assert!(config.linkedin.is_none());

        let twitter = config.app(Platform::Twitter).unwrap();
        assert_eq!(twitter.client_id, "consumer-key");
        assert_eq!(twitter.extra.get("api_version").unwrap(), "1.1");
    }

    #[test]
    fn test_missing_section_is_named_error() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let err = config.app(Platform::YouTube).unwrap_err();
        assert!(format!("{}", err).contains("[youtube]"));
    }

    #[test]
    fn test_load_from_missing_path() {
        let result = Config::load_from_path(&PathBuf::from("/nonexistent/socialhub.toml"));
        assert!(result.is_err());
    }
}
