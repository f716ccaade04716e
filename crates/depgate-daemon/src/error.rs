//! Error types for depgated

use depgate_core::{ApiError, BootstrapError, StoreError};
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Approval service error: {0}")]
    Api(#[from] ApiError),

    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("State error: {0}")]
    Store(#[from] StoreError),

    #[error("Workspace scan failed: {0}")]
    Scan(String),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
