//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest status-poll interval we accept, whatever the configuration says.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Configuration consumed by the engine components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Approval service connection
    #[serde(default)]
    pub api: ApiConfig,

    /// Poll task timing
    #[serde(default)]
    pub polling: PollingConfig,

    /// Org-wide alert pull
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Approval service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://approvals.example.com/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token; requests go out unauthenticated when absent
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt for 5xx and network failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds, doubled per attempt
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff, in milliseconds
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_jitter_ms: default_retry_jitter(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Poll task timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Status-poll interval in seconds (floored at 3)
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Delay between connection-retry attempts in seconds
    #[serde(default = "default_connection_retry_delay")]
    pub connection_retry_delay_secs: u64,

    /// Connection-retry attempts before giving up
    #[serde(default = "default_connection_retry_attempts")]
    pub connection_retry_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            connection_retry_delay_secs: default_connection_retry_delay(),
            connection_retry_attempts: default_connection_retry_attempts(),
        }
    }
}

impl PollingConfig {
    /// Effective status-poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs).max(MIN_POLL_INTERVAL)
    }

    pub fn connection_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connection_retry_delay_secs)
    }
}

/// Org-wide alert pull
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_heartbeat_interval(),
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_retry_jitter() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    5
}

fn default_connection_retry_delay() -> u64 {
    10
}

fn default_connection_retry_attempts() -> u32 {
    30
}

fn default_heartbeat_interval() -> u64 {
    60
}
