// Configuration Management
//
// This crate handles all configuration loading for the Google login service.
// It provides:
// - Configuration structs and deserialization
// - File and environment loading logic
// - Default configuration values
//
// This keeps configuration concerns separate from the login flow itself.

use std::path::Path;
use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found. Tried paths: {paths}")]
    FileNotFound { paths: String },

    #[error("Failed to read configuration file: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Missing configuration setting: {name}")]
    MissingSetting { name: String },

    #[error("Invalid configuration setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },
}

const CONFIG_PATHS: [&str; 3] = ["config/config.yaml", "config.yaml", "config/default.yaml"];

/// Main configuration loading interface
impl ApiConfig {
    /// Load configuration from YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ApiConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the first default file location that exists
    pub fn load_from_default_paths() -> Result<Self, ConfigError> {
        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                return Self::load_from_file(path);
            }
        }

        Err(ConfigError::FileNotFound {
            paths: CONFIG_PATHS.join(", "),
        })
    }

    /// Load configuration from a file if one exists, otherwise from the environment
    pub fn load() -> Result<Self, ConfigError> {
        match Self::load_from_default_paths() {
            Err(ConfigError::FileNotFound { .. }) => Self::from_env(),
            other => other,
        }
    }
}
