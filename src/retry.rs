use crate::metrics::ServerMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Configuration for retry logic with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Tuned for the blob-store pipeline (§4.10): the spec calls for up to
    /// 10 retries with 10s backoff between attempts.
    pub fn blob_store(attempts: u32, backoff_secs: u64) -> Self {
        Self {
            max_attempts: attempts.max(1),
            initial_delay: Duration::from_secs(backoff_secs.max(1)),
            max_delay: Duration::from_secs(backoff_secs.max(1) * 4),
            backoff_multiplier: 1.5,
            jitter_factor: 0.2,
        }
    }

    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Error types that can be retried.
#[derive(Debug, Clone)]
pub enum RetryableError {
    ConnectionError(String),
    ResourceUnavailable(String),
    Generic(String),
}

impl std::fmt::Display for RetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionError(msg) => write!(f, "connection error: {msg}"),
            Self::ResourceUnavailable(msg) => write!(f, "resource unavailable: {msg}"),
            Self::Generic(msg) => write!(f, "retryable error: {msg}"),
        }
    }
}

impl std::error::Error for RetryableError {}

/// Retry executor with exponential backoff and jitter.
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Option<Arc<ServerMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(config: RetryConfig, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            config,
            metrics: Some(metrics),
        }
    }

    /// Execute an operation with retry logic. The error type decides
    /// retryability via [`is_retryable_error`].
    pub async fn execute<T, F, Fut, E>(&self, operation_name: &str, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Debug,
    {
        let mut attempt = 1;
        let mut delay = self.config.initial_delay;

        loop {
            if let Some(metrics) = &self.metrics {
                metrics.increment_retry_attempts();
            }

            debug!(
                operation = operation_name,
                attempt = attempt,
                max_attempts = self.config.max_attempts,
                "executing operation attempt"
            );

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        if let Some(metrics) = &self.metrics {
                            metrics.increment_retry_successes();
                        }
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if attempt >= self.config.max_attempts {
                        error!(
                            operation = operation_name,
                            attempt = attempt,
                            error = ?error,
                            "operation failed after all retry attempts"
                        );
                        return Err(error);
                    }

                    if !is_retryable_error(&error) {
                        debug!(
                            operation = operation_name,
                            error = ?error,
                            "error is not retryable, failing immediately"
                        );
                        return Err(error);
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = self.config.max_attempts,
                        error = ?error,
                        delay_ms = delay.as_millis(),
                        "operation failed, retrying after delay"
                    );

                    sleep(delay).await;

                    let next_delay = Duration::from_millis(
                        (delay.as_millis() as f64 * self.config.backoff_multiplier) as u64,
                    );
                    delay = std::cmp::min(next_delay, self.config.max_delay);

                    if self.config.jitter_factor > 0.0 {
                        let jitter = (delay.as_millis() as f64 * self.config.jitter_factor) as u64;
                        let jitter_amount = fastrand::u64(0..=jitter);
                        delay = Duration::from_millis(delay.as_millis() as u64 + jitter_amount);
                    }

                    attempt += 1;
                }
            }
        }
    }
}

fn is_retryable_error<E>(error: &E) -> bool
where
    E: std::fmt::Debug,
{
    let error_str = format!("{error:?}").to_lowercase();

    error_str.contains("timeout")
        || error_str.contains("connection")
        || error_str.contains("unavailable")
        || error_str.contains("io error")
        || error_str.contains("broken pipe")
        || error_str.contains("connection reset")
        || error_str.contains("connection refused")
        || error_str.contains("5xx")
        || error_str.contains("server error")
}
