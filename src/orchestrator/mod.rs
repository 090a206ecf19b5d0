//! Generation orchestration.
//!
//! [`GenerationOrchestrator`] drives one request through
//! `Received → Admitted → CacheChecked → {CacheHit | Dispatched}` and on to
//! a terminal `Succeeded`, `Failed` or `Cancelled`:
//!
//! 1. validate the parameters (no limiter interaction on failure)
//! 2. admit against the per-identity rate window
//! 3. look the fingerprint up in the [`ResultCache`]; a hit ends here
//! 4. acquire an attempt slot in the [`InFlightRegistry`]
//! 5. dispatch through the [`GenerationAdapter`], retrying per [`RetryConfig`]
//! 6. release the slot; a cancel recorded before release wins
//! 7. store the artifact in the cache and the [`TrackStore`]
//!
//! Errors from the adapter pass through unchanged.

mod builder;

pub use builder::OrchestratorBuilder;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::{ResultCache, TrackStore};
use crate::inflight::{AttemptInfo, InFlightRegistry};
use crate::limiter::RateLimiter;
use crate::providers::retry::with_retry;
use crate::providers::{GenerationAdapter, RetryConfig};
use crate::telemetry;
use crate::types::{AttemptId, GenerationLimits, GenerationParams, GenerationRequest, Identity, Track};
use crate::{Result, VugruError};

/// Where a successful result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Served from the result cache; no provider call was made.
    Cache,
    /// Produced by a fresh provider call under this attempt.
    Generated { attempt_id: AttemptId },
}

/// A successful generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub track: Arc<Track>,
    pub provenance: Provenance,
}

impl GenerationOutcome {
    pub fn is_cache_hit(&self) -> bool {
        self.provenance == Provenance::Cache
    }

    pub fn attempt_id(&self) -> Option<&AttemptId> {
        match &self.provenance {
            Provenance::Generated { attempt_id } => Some(attempt_id),
            Provenance::Cache => None,
        }
    }
}

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_entries_removed: usize,
    pub tracks_purged: usize,
}

/// Coordinates admission, caching, dispatch and cancellation.
pub struct GenerationOrchestrator {
    limits: GenerationLimits,
    limiter: RateLimiter,
    cache: ResultCache,
    tracks: TrackStore,
    inflight: InFlightRegistry,
    adapter: GenerationAdapter,
    retry: RetryConfig,
}

impl GenerationOrchestrator {
    /// Create a new builder for configuring the orchestrator.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Run one generation request for `identity`.
    ///
    /// `attempt_id` lets the caller pick the id it will later pass to
    /// [`cancel`](Self::cancel); otherwise one is assigned and reported in
    /// the outcome's provenance.
    #[tracing::instrument(
        name = "generate",
        skip_all,
        fields(identity = %identity, duration = params.duration)
    )]
    pub async fn generate(
        &self,
        identity: &Identity,
        params: GenerationParams,
        attempt_id: Option<AttemptId>,
    ) -> Result<GenerationOutcome> {
        let result = self.run(identity, params, attempt_id).await;
        match &result {
            Ok(outcome) if outcome.is_cache_hit() => {
                telemetry::record_outcome(telemetry::OUTCOME_CACHE_HIT);
            }
            Ok(_) => telemetry::record_outcome(telemetry::OUTCOME_SUCCEEDED),
            Err(e) => {
                telemetry::record_outcome(e.kind());
                match e {
                    VugruError::Cancelled => info!("generation cancelled"),
                    e => info!(kind = e.kind(), error = %e, "generation failed"),
                }
            }
        }
        result
    }

    async fn run(
        &self,
        identity: &Identity,
        params: GenerationParams,
        attempt_id: Option<AttemptId>,
    ) -> Result<GenerationOutcome> {
        let request = GenerationRequest::validate(identity, params, &self.limits)?;
        // a busy identity is refused before it can spend a window slot
        if self.inflight.is_busy(identity) {
            return Err(self.inflight.busy());
        }
        self.limiter.admit(identity).into_result()?;

        let fingerprint = request.fingerprint();
        if let Some(hit) = self.cache.lookup(&fingerprint).await {
            let track = self
                .tracks
                .put(Track::from_generation(&request, hit.to_artifact()));
            debug!(
                fingerprint = fingerprint.short(),
                track_id = %track.id,
                "result cache hit"
            );
            return Ok(GenerationOutcome {
                track,
                provenance: Provenance::Cache,
            });
        }
        debug!(fingerprint = fingerprint.short(), "result cache miss");

        let guard = self.inflight.acquire(identity, attempt_id)?;
        let attempt_id = guard.attempt_id().clone();
        info!(
            %attempt_id,
            fingerprint = fingerprint.short(),
            prompt_chars = request.prompt().chars().count(),
            duration = request.duration_secs(),
            vocals_mode = request.vocals_mode().as_str(),
            "dispatching generation"
        );

        let result = with_retry(
            &self.retry,
            self.adapter.provider_name(),
            guard.token(),
            || self.adapter.generate(&request, guard.token()),
        )
        .await;

        if guard.finish() {
            return Err(VugruError::Cancelled);
        }
        let artifact = result?;

        self.cache
            .store(
                fingerprint,
                artifact.bytes.clone(),
                artifact.content_type.clone(),
                self.cache.config().ttl,
            )
            .await;
        let track = self.tracks.put(Track::from_generation(&request, artifact));
        info!(
            %attempt_id,
            track_id = %track.id,
            bytes = track.audio.len(),
            "generation succeeded"
        );

        Ok(GenerationOutcome {
            track,
            provenance: Provenance::Generated { attempt_id },
        })
    }

    /// Cancel one of `identity`'s in-flight attempts.
    ///
    /// Returns `false` for unknown, finished and foreign attempts alike.
    pub fn cancel(&self, identity: &Identity, attempt_id: &AttemptId) -> bool {
        self.inflight.cancel(Some(identity), attempt_id)
    }

    /// `identity`'s in-flight attempts, oldest first.
    pub fn list_attempts(&self, identity: &Identity) -> Vec<AttemptInfo> {
        self.inflight.list(identity)
    }

    /// A stored track, for replay.
    pub fn track(&self, id: &str) -> Option<Arc<Track>> {
        self.tracks.get(id)
    }

    /// Up to `limit` stored tracks, newest first.
    pub fn recent_tracks(&self, limit: usize) -> Vec<Arc<Track>> {
        self.tracks.recent(limit)
    }

    /// Reclaim expired cache entries and tracks, and enforce the cache bound.
    pub async fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            cache_entries_removed: self.cache.sweep().await,
            tracks_purged: self.tracks.purge_expired(),
        };
        if report != SweepReport::default() {
            debug!(
                cache_entries_removed = report.cache_entries_removed,
                tracks_purged = report.tracks_purged,
                "sweep finished"
            );
        }
        report
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the orchestrator
    /// is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let orchestrator: Weak<Self> = Arc::downgrade(self);
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                orchestrator.sweep().await;
            }
            debug!("sweeper stopped");
        })
    }

    pub fn limits(&self) -> &GenerationLimits {
        &self.limits
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    pub fn inflight(&self) -> &InFlightRegistry {
        &self.inflight
    }

    pub fn adapter(&self) -> &GenerationAdapter {
        &self.adapter
    }
}
