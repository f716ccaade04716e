//! Error types for the depgate engine.

use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the approval service.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 4xx: the request or credentials are wrong; never retried
    #[error("client error {status}: {message}")]
    Client {
        /// HTTP status code
        status: u16,
        /// Body returned by the service
        message: String,
    },

    /// 5xx or a network-level failure
    #[error("transient failure: {0}")]
    Transient(String),

    /// Request exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Response body did not match the contract
    #[error("malformed response: {0}")]
    Decode(String),

    /// Gateway could not be built from its configuration
    #[error("gateway configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether the transport layer should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient(_) | ApiError::Timeout)
    }

    /// Whether this was the service rejecting the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ApiError::Client { .. })
    }

    /// Asking again cannot help: the service refused the request or
    /// answered with something unreadable.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ApiError::Client { .. } | ApiError::Decode(_) | ApiError::Config(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            if status.is_client_error() {
                ApiError::Client {
                    status: status.as_u16(),
                    message: err.to_string(),
                }
            } else {
                ApiError::Transient(err.to_string())
            }
        } else if err.is_builder() {
            ApiError::Config(err.to_string())
        } else {
            ApiError::Transient(err.to_string())
        }
    }
}

/// Result type for gateway operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Malformed manifest content. Never crosses the differ boundary.
#[derive(Debug, Clone, Error)]
#[error("cannot parse {ecosystem} manifest: {reason}")]
pub struct ParseError {
    pub ecosystem: depgate_types::Ecosystem,
    pub reason: String,
}

/// Persistent key-value store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store document is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Bootstrap could not complete; automatic watching stays disabled.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bulk submission for {ecosystem} failed: {source}")]
    Queue {
        ecosystem: depgate_types::Ecosystem,
        #[source]
        source: ApiError,
    },

    #[error("cannot persist bootstrap record: {0}")]
    Store(#[from] StoreError),

    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for bootstrap operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Outcome of a fire-and-forget call (update, heartbeat).
///
/// Deliberately not a `Result`: it cannot be propagated with `?`, only
/// inspected or logged.
#[must_use = "log the outcome or drop it explicitly"]
#[derive(Debug)]
pub enum BestEffort {
    Delivered,
    Dropped(ApiError),
}

impl BestEffort {
    pub fn from_result<T>(result: ApiResult<T>) -> Self {
        match result {
            Ok(_) => BestEffort::Delivered,
            Err(err) => BestEffort::Dropped(err),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, BestEffort::Delivered)
    }

    /// Log a dropped call at `debug`; delivery is silent.
    pub fn log(self, what: &str) {
        if let BestEffort::Dropped(err) = self {
            tracing::debug!(call = what, error = %err, "Best-effort call dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ApiError::Transient("503".into()).is_retryable());
        assert!(ApiError::Timeout.is_retryable());
        let client = ApiError::Client {
            status: 401,
            message: "bad token".into(),
        };
        assert!(!client.is_retryable());
        assert!(client.is_client_error());
        assert!(client.is_permanent());
        assert!(ApiError::Decode("unknown status".into()).is_permanent());
        assert!(!ApiError::Timeout.is_permanent());
        assert!(!ApiError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_best_effort_from_result() {
        assert!(BestEffort::from_result::<()>(Ok(())).is_delivered());
        let dropped = BestEffort::from_result::<()>(Err(ApiError::Timeout));
        assert!(!dropped.is_delivered());
        dropped.log("update");
    }
}
