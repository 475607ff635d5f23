//! Configuration models for tierpoint.
//!
//! Storage locations and aggregation parameters are supplied by the user in a
//! TOML file; everything else has a default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for tierpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage tiers
    pub storage: StorageConfig,

    /// Completion aggregation
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

/// Locations of the two storage tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Fast local tier where participants write their artifacts
    pub scratch: PathBuf,

    /// Durable tier that completed checkpoints migrate to
    pub persistent: PathBuf,

    /// Remove crash-left staging directories before processing reports
    #[serde(default = "default_true")]
    pub recover_on_start: bool,
}

/// Completion aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Number of participants contributing to every round
    #[serde(default = "default_participants")]
    pub participants: usize,

    /// Drop a second report from the same participant within an open round
    #[serde(default)]
    pub reject_duplicates: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            participants: default_participants(),
            reject_duplicates: false,
        }
    }
}

fn default_participants() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregator.participants == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.participants must be at least 1".to_string(),
            ));
        }
        if self.storage.scratch == self.storage.persistent {
            return Err(ConfigError::Invalid(format!(
                "storage.scratch and storage.persistent must differ (both are {})",
                self.storage.scratch.display()
            )));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
