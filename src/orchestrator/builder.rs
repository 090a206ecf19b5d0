//! Builder for configuring orchestrator instances

use std::sync::Arc;
use std::time::Duration;

use super::GenerationOrchestrator;
use crate::cache::{CacheConfig, ResultCache, TrackStore, TrackStoreConfig};
use crate::inflight::{InFlightConfig, InFlightRegistry};
use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::providers::adapter::DEFAULT_TIMEOUT;
use crate::providers::elevenlabs::DEFAULT_BASE_URL;
use crate::providers::{ElevenLabsClient, GenerationAdapter, MusicProvider, RetryConfig};
use crate::types::GenerationLimits;
use crate::{Result, VugruError};

/// Builder for [`GenerationOrchestrator`].
///
/// ```rust,no_run
/// # use vugru::{GenerationOrchestrator, RateLimitConfig};
/// # use std::time::Duration;
/// # fn main() -> vugru::Result<()> {
/// let orchestrator = GenerationOrchestrator::builder()
///     .elevenlabs("xi-your-key")
///     .rate_limit(RateLimitConfig::new().max_requests(5))
///     .timeout(Duration::from_secs(90))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn MusicProvider>>,
    elevenlabs_key: Option<String>,
    elevenlabs_url: String,
    model_id: Option<String>,
    limits: GenerationLimits,
    rate_limit: RateLimitConfig,
    cache: CacheConfig,
    tracks: TrackStoreConfig,
    inflight: InFlightConfig,
    timeout: Duration,
    retry: RetryConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            elevenlabs_key: None,
            elevenlabs_url: DEFAULT_BASE_URL.to_string(),
            model_id: None,
            limits: GenerationLimits::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            tracks: TrackStoreConfig::default(),
            inflight: InFlightConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    /// Use a custom provider. Takes precedence over [`elevenlabs`](Self::elevenlabs).
    pub fn provider(mut self, provider: Arc<dyn MusicProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Configure the ElevenLabs provider.
    pub fn elevenlabs(mut self, api_key: impl Into<String>) -> Self {
        self.elevenlabs_key = Some(api_key.into());
        self
    }

    /// Override the ElevenLabs base URL.
    pub fn elevenlabs_base_url(mut self, url: impl Into<String>) -> Self {
        self.elevenlabs_url = url.into();
        self
    }

    /// Override the ElevenLabs music model.
    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn limits(mut self, limits: GenerationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn tracks(mut self, config: TrackStoreConfig) -> Self {
        self.tracks = config;
        self
    }

    pub fn inflight(mut self, config: InFlightConfig) -> Self {
        self.inflight = config;
        self
    }

    /// Bound on a single provider call (default: 120s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry policy for transient provider failures (default: none).
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<GenerationOrchestrator> {
        if self.timeout.is_zero() {
            return Err(VugruError::Configuration(
                "generation timeout must be non-zero".to_string(),
            ));
        }
        if self.cache.ttl.is_zero() {
            return Err(VugruError::Configuration(
                "cache ttl must be non-zero".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window.is_zero() {
            return Err(VugruError::Configuration(
                "rate limit must admit at least one request per non-empty window".to_string(),
            ));
        }
        if self.inflight.max_concurrent_per_identity == 0 {
            return Err(VugruError::Configuration(
                "max_concurrent_per_identity must be at least 1".to_string(),
            ));
        }
        if self.limits.min_duration_secs > self.limits.max_duration_secs {
            return Err(VugruError::Configuration(format!(
                "min_duration_secs ({}) exceeds max_duration_secs ({})",
                self.limits.min_duration_secs, self.limits.max_duration_secs
            )));
        }

        let provider: Arc<dyn MusicProvider> = match (self.provider, self.elevenlabs_key) {
            (Some(provider), _) => provider,
            (None, Some(key)) => {
                let mut client = ElevenLabsClient::with_base_url(key, self.elevenlabs_url)?;
                if let Some(model_id) = self.model_id {
                    client = client.model_id(model_id);
                }
                Arc::new(client)
            }
            (None, None) => {
                return Err(VugruError::Configuration(
                    "no music provider configured".to_string(),
                ));
            }
        };

        Ok(GenerationOrchestrator {
            limits: self.limits,
            limiter: RateLimiter::new(self.rate_limit),
            cache: ResultCache::new(&self.cache),
            tracks: TrackStore::new(self.tracks),
            inflight: InFlightRegistry::new(self.inflight),
            adapter: GenerationAdapter::new(provider, self.timeout),
            retry: self.retry,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
