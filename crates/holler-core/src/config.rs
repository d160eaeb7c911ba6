//! Configuration management for holler.
//!
//! The protocol parameters (sample rate, channel count, level cadence) are
//! fixed constants in the crate root; the config file only carries the few
//! knobs that differ between installs.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{APP_NAME, DEFAULT_ENDPOINT, RECORD_CEILING};

/// User-editable configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the voice-agent backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Maximum recording duration in seconds before the safety timer
    /// force-stops the session
    #[serde(
        default = "default_record_ceiling",
        skip_serializing_if = "is_default_record_ceiling"
    )]
    pub record_ceiling: f32,
}

fn default_record_ceiling() -> f32 {
    RECORD_CEILING.as_secs_f32()
}

fn is_default_record_ceiling(v: &f32) -> bool {
    (*v - default_record_ceiling()).abs() < f32::EPSILON
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            record_ceiling: default_record_ceiling(),
        }
    }
}

impl Config {
    /// Backend base URL, falling back to the local default.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    /// Get the record ceiling as a Duration. Values under one second are
    /// rejected since the session could never accumulate a usable payload.
    pub fn record_ceiling(&self) -> Duration {
        if self.record_ceiling < 1.0 {
            warn!(
                configured = self.record_ceiling,
                "record_ceiling under one second, using default"
            );
            return RECORD_CEILING;
        }
        Duration::from_secs_f32(self.record_ceiling)
    }
}

/// Manages loading and saving configuration files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the default configuration directory.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Creates a new ConfigManager with a specified configuration directory.
    #[cfg(test)]
    pub fn with_config_dir<P: AsRef<std::path::Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(format!("{}.toml", APP_NAME));
        Self { config_path }
    }

    /// Returns the default path to the configuration file.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to retrieve configuration directory")?;
        Ok(config_dir.join(APP_NAME).join(format!("{}.toml", APP_NAME)))
    }

    /// Loads the configuration from the config file or returns default.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file at {:?}", self.config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file at {:?}", self.config_path))?;

        Ok(config)
    }

    /// Saves the configuration to the config file.
    pub fn save(&self, config: &Config) -> Result<()> {
        let config_dir = self
            .config_path
            .parent()
            .with_context(|| format!("Failed to get parent directory of {:?}", self.config_path))?;

        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory at {:?}", config_dir))?;

        let serialized =
            toml::to_string_pretty(&config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, serialized)
            .with_context(|| format!("Failed to write config file at {:?}", self.config_path))?;

        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path(&self) -> &std::path::Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.endpoint.is_none());
        assert_eq!(config.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.record_ceiling(), RECORD_CEILING);
    }

    #[test]
    fn test_record_ceiling_floor() {
        let config = Config {
            record_ceiling: 0.1,
            ..Default::default()
        };
        assert_eq!(config.record_ceiling(), RECORD_CEILING);

        let config = Config {
            record_ceiling: 5.0,
            ..Default::default()
        };
        assert_eq!(config.record_ceiling(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            endpoint: Some("http://voice.example.com:9000".to_string()),
            ..Default::default()
        };

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.endpoint, deserialized.endpoint);
    }

    #[test]
    fn test_config_manager_save_load() {
        let temp_dir = std::env::temp_dir().join("holler-test");
        fs::create_dir_all(&temp_dir).unwrap();

        let manager = ConfigManager::with_config_dir(&temp_dir);

        let config = Config {
            endpoint: Some("http://localhost:8000".to_string()),
            ..Default::default()
        };

        manager.save(&config).unwrap();
        let loaded = manager.load().unwrap();

        assert_eq!(config.endpoint, loaded.endpoint);

        // Cleanup
        fs::remove_dir_all(&temp_dir).ok();
    }
}
