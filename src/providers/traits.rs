//! Provider trait for music generation backends.
//!
//! A provider performs exactly one outbound call per `generate`. Timeouts,
//! cancellation and retries are layered on top by
//! [`GenerationAdapter`](super::GenerationAdapter) and the orchestrator, so
//! implementations stay a thin protocol mapping.
//!
//! # Error contract
//!
//! Implementations map their failures onto the generation taxonomy:
//! - rejected input → `InvalidRequest`
//! - exhausted credits / billing → `QuotaExceeded`
//! - 5xx or transport failure → `ProviderUnavailable`

use async_trait::async_trait;

use crate::Result;
use crate::types::{AudioArtifact, GenerationRequest};

/// Backend that turns a validated request into audio.
#[async_trait]
pub trait MusicProvider: Send + Sync {
    /// Provider name for logging and metric labels.
    fn name(&self) -> &str;

    /// Generate one track.
    async fn generate(&self, request: &GenerationRequest) -> Result<AudioArtifact>;
}
