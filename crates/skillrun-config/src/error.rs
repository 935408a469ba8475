//! Configuration error types

use thiserror::Error;

/// Configuration result type
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {field}: {reason}")]
    Validation { field: String, reason: String },
}

impl ConfigError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
