//! Error types for buildmoded

use thiserror::Error;

/// Error type for daemon-level operations that span several crates
#[derive(Debug, Error)]
pub enum BuildModeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl BuildModeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BuildModeError>;
