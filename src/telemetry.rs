//! Telemetry metric name constants.
//!
//! Centralised metric names for vugru operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `vugru_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `outcome`: terminal state of a generation: "succeeded", "cache_hit",
//!   or the [`VugruError::kind()`](crate::VugruError::kind) of the failure
//! - `provider`: provider name (e.g. "elevenlabs")

/// Total generation requests that reached a terminal state.
///
/// Labels: `outcome`.
pub const GENERATIONS_TOTAL: &str = "vugru_generations_total";

/// Provider dispatch duration in seconds (cache hits excluded).
///
/// Labels: `provider`.
pub const GENERATION_DURATION_SECONDS: &str = "vugru_generation_duration_seconds";

/// Total result cache hits.
pub const CACHE_HITS_TOTAL: &str = "vugru_cache_hits_total";

/// Total result cache misses (including hits on expired entries).
pub const CACHE_MISSES_TOTAL: &str = "vugru_cache_misses_total";

/// Total result cache entries removed by expiry or the size bound.
pub const CACHE_EVICTIONS_TOTAL: &str = "vugru_cache_evictions_total";

/// Total admissions denied by the windowed rate limiter.
pub const RATE_LIMITED_TOTAL: &str = "vugru_rate_limited_total";

/// Total attempts released from the in-flight registry.
///
/// Must equal the number of registered attempts once traffic drains.
pub const ATTEMPTS_RELEASED_TOTAL: &str = "vugru_attempts_released_total";

/// Total provider retries (not counting the initial call).
///
/// Labels: `provider`.
pub const RETRIES_TOTAL: &str = "vugru_retries_total";

/// Outcome label for a fresh provider generation.
pub const OUTCOME_SUCCEEDED: &str = "succeeded";

/// Outcome label for a request answered from the result cache.
pub const OUTCOME_CACHE_HIT: &str = "cache_hit";

/// Record a terminal generation outcome.
pub(crate) fn record_outcome(outcome: &'static str) {
    metrics::counter!(GENERATIONS_TOTAL, "outcome" => outcome).increment(1);
}
