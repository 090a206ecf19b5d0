//! Vugru error types

use std::time::Duration;

/// Vugru error types
///
/// The first six variants are the generation taxonomy: every failure a
/// caller of [`GenerationOrchestrator`](crate::GenerationOrchestrator) can
/// see is one of them, and the orchestrator never folds one into another.
#[derive(Debug, thiserror::Error)]
pub enum VugruError {
    // Generation taxonomy
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{reason} (retry after {}s)", .retry_after.as_secs())]
    RateLimited {
        retry_after: Duration,
        reason: String,
    },

    #[error("{0}")]
    QuotaExceeded(String),

    #[error("music provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("music generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("generation cancelled")]
    Cancelled,

    // Boundary errors
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VugruError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Configuration(_) => "configuration",
            Self::Json(_) => "invalid_request",
        }
    }

    /// Whether the failure is worth another provider call.
    ///
    /// Only upstream outages qualify; timeouts and quota errors do not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }

    /// Back-off hint carried by `RateLimited`.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    pub(crate) fn rate_limited(retry_after: Duration, reason: impl Into<String>) -> Self {
        Self::RateLimited {
            retry_after,
            reason: reason.into(),
        }
    }
}

/// Result type alias for Vugru operations
pub type Result<T> = std::result::Result<T, VugruError>;
