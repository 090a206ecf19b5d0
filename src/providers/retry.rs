//! Retry configuration and the shared retry helper.
//!
//! Retrying a paid generation is opt-in: the default [`RetryConfig`] makes
//! a single attempt. When enabled, only transient errors
//! ([`VugruError::is_transient()`]) are retried, and backoff sleeps end
//! early with `Cancelled` when the attempt's token fires.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::inflight::CancelToken;
use crate::telemetry;
use crate::{Result, VugruError};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff:
///
/// ```rust
/// # use vugru::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(2)
///     .initial_delay(Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 1.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 10s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Create a new config; retries are disabled until `max_attempts` is raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `attempt + 1` (0-indexed).
    ///
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

/// Execute a provider call with retry logic.
///
/// Permanent errors are returned immediately. Transient errors are retried
/// up to `config.max_attempts`; the last one is returned when attempts run
/// out. Cancellation during a backoff sleep returns `Cancelled`.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    provider_name: &str,
    cancel: &CancelToken,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                metrics::counter!(telemetry::RETRIES_TOTAL,
                    "provider" => provider_name.to_owned(),
                )
                .increment(1);
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    provider = provider_name,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(VugruError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
