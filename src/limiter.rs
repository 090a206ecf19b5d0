//! Fixed-window admission control per client identity.
//!
//! [`RateLimiter`] keeps one window per identity. Windows live in a moka
//! cache, so lookups for different identities never contend on a shared
//! lock; each window has its own mutex, held only for the count update.
//! Idle windows are reclaimed after two window lengths without traffic.
//!
//! Time is read from `tokio::time::Instant`, which lets tests drive
//! window expiry with a paused clock.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;
use crate::types::Identity;
use crate::{Result, VugruError};

/// Configuration for per-identity rate limiting.
///
/// ```rust
/// # use vugru::RateLimitConfig;
/// # use std::time::Duration;
/// let config = RateLimitConfig::new()
///     .max_requests(10)
///     .window(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Admissions allowed per identity per window. Default: 5.
    pub max_requests: u32,
    /// Window length. Default: 60s.
    pub window: Duration,
    /// Upper bound on tracked identities. Default: 100,000.
    pub max_identities: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
            max_identities: 100_000,
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_requests(mut self, n: u32) -> Self {
        self.max_requests = n;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn max_identities(mut self, n: u64) -> Self {
        self.max_identities = n;
        self
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; `remaining` further admissions fit in the current window.
    Allowed { remaining: u32 },
    /// Window exhausted until `retry_after` elapses.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Convert a denial into [`VugruError::RateLimited`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Allowed { .. } => Ok(()),
            Self::Denied { retry_after } => Err(VugruError::rate_limited(
                retry_after,
                "Rate limit reached. Please try again later.",
            )),
        }
    }
}

#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

/// Per-identity fixed-window rate limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: moka::sync::Cache<Identity, Arc<Mutex<RateWindow>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let windows = moka::sync::Cache::builder()
            .max_capacity(config.max_identities)
            .time_to_idle(config.window.saturating_mul(2))
            .build();
        Self { config, windows }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and record one admission for `identity`.
    ///
    /// The count only grows on allowed admissions; denials leave the
    /// window untouched.
    pub fn admit(&self, identity: &Identity) -> Admission {
        let now = Instant::now();
        let slot = self.windows.get_with(identity.clone(), || {
            Arc::new(Mutex::new(RateWindow {
                window_start: now,
                count: 0,
            }))
        });
        let mut window = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let window_end = window.window_start + self.config.window;
        if now >= window_end {
            window.window_start = now;
            window.count = 0;
        }

        if window.count >= self.config.max_requests {
            let retry_after = (window.window_start + self.config.window)
                .saturating_duration_since(now);
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL).increment(1);
            debug!(
                %identity,
                count = window.count,
                retry_after_ms = retry_after.as_millis() as u64,
                "admission denied"
            );
            return Admission::Denied { retry_after };
        }

        window.count += 1;
        Admission::Allowed {
            remaining: self.config.max_requests - window.count,
        }
    }
}
