//! Transport retry with exponential backoff and jitter.

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retries 5xx, timeouts and connection failures; never 4xx.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to every delay
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// `base * 2^attempt + random(0, jitter)` for a zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        exponential.saturating_add(jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying approval service call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(operation, attempts = attempt + 1, error = %err, "Retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn status_error(status: u16, body: String) -> ApiError {
    if (400..500).contains(&status) {
        ApiError::Client {
            status,
            message: body,
        }
    } else {
        ApiError::Transient(format!("HTTP {status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1000),
            jitter: Duration::from_millis(1000),
        }
    }

    #[test]
    fn test_delay_bounds() {
        let policy = policy(3);
        for attempt in 0..4 {
            let floor = Duration::from_millis(1000 * 2u64.pow(attempt));
            let delay = policy.delay_for(attempt);
            assert!(delay >= floor, "attempt {attempt}: {delay:?}");
            assert!(delay <= floor + Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(status_error(404, String::new()), ApiError::Client { status: 404, .. }));
        assert!(status_error(502, String::new()).is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = policy(3)
            .run("check", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::Transient("503".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: ApiResult<()> = policy(3)
            .run("request", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Client {
                    status: 403,
                    message: "forbidden".into(),
                })
            })
            .await;
        assert!(result.unwrap_err().is_client_error());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retry_count() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: ApiResult<()> = policy(2)
            .run("queue", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Timeout)
            })
            .await;
        assert!(matches!(result, Err(ApiError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
