//! Application configuration management.
//!
//! This module handles loading and saving the client configuration:
//! the API base URL, the request timeout and the keychain service name.
//!
//! Configuration is stored at `~/.config/ridenow/config.json`. The
//! `RIDENOW_API_URL` and `RIDENOW_TIMEOUT_SECS` environment variables
//! override the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for the config directory path
const APP_NAME: &str = "ridenow";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Base URL of the app-facing API. Endpoint paths are joined onto it.
pub const DEFAULT_API_URL: &str = "https://ridenow-backend-99w6.onrender.com/api/v1/app/";

/// HTTP request timeout in seconds.
/// The hosted backend cold-starts slowly, so this is generous.
pub const DEFAULT_TIMEOUT_SECS: u64 = 100;

/// Keychain service under which tokens and the user record are stored
pub const DEFAULT_KEYRING_SERVICE: &str = "ridenow";

const ENV_API_URL: &str = "RIDENOW_API_URL";
const ENV_TIMEOUT_SECS: &str = "RIDENOW_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub timeout_secs: u64,
    pub keyring_service: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_SECS),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout(), Duration::from_secs(100));
        assert_eq!(config.keyring_service, "ridenow");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"api_url": "http://localhost:8000/api/v1/app/"}"#)
            .expect("partial config should parse");
        assert_eq!(config.api_url, "http://localhost:8000/api/v1/app/");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "http://10.0.0.2:8000/api/v1/app/"),
            (ENV_TIMEOUT_SECS, "15"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_url, "http://10.0.0.2:8000/api/v1/app/");
        assert_eq!(config.timeout_secs, 15);
    }

    #[test]
    fn test_invalid_timeout_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == ENV_TIMEOUT_SECS).then(|| "soon".to_string()));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);

        config.apply_overrides(|key| (key == ENV_TIMEOUT_SECS).then(|| "0".to_string()));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
