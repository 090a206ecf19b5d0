//! Timeout and cancellation around a single provider call.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use super::traits::MusicProvider;
use crate::inflight::CancelToken;
use crate::telemetry;
use crate::types::{AudioArtifact, GenerationRequest};
use crate::{Result, VugruError};

/// Default bound on one provider call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Wraps a [`MusicProvider`] with a bounded timeout, cooperative
/// cancellation and artifact validation. Never retries.
#[derive(Clone)]
pub struct GenerationAdapter {
    provider: Arc<dyn MusicProvider>,
    timeout: Duration,
}

impl GenerationAdapter {
    pub fn new(provider: Arc<dyn MusicProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one provider call.
    ///
    /// Returns `Cancelled` as soon as `cancel` fires, dropping the pending
    /// call, and `Timeout` once the configured bound elapses. An empty body
    /// is `ProviderUnavailable`.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<AudioArtifact> {
        if cancel.is_cancelled() {
            return Err(VugruError::Cancelled);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VugruError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.provider.generate(request)) => {
                result.unwrap_or(Err(VugruError::Timeout(self.timeout)))
            }
        };

        let artifact = match outcome {
            Ok(artifact) if artifact.is_empty() => Err(VugruError::ProviderUnavailable(
                "provider returned an empty audio body".to_string(),
            )),
            other => other,
        };

        match &artifact {
            Ok(_) => {
                metrics::histogram!(telemetry::GENERATION_DURATION_SECONDS,
                    "provider" => self.provider.name().to_owned(),
                )
                .record(started.elapsed().as_secs_f64());
            }
            Err(VugruError::Cancelled) => {}
            Err(e) => {
                warn!(
                    provider = self.provider.name(),
                    error = %e,
                    kind = e.kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "provider call failed"
                );
            }
        }
        artifact
    }
}
