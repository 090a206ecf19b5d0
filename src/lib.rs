//! Vugru - Music generation request orchestrator
//!
//! This crate sits between clients and a paid music generation API. It
//! admits requests per client identity, serves repeated requests from a
//! result cache, tracks in-flight generations so they can be cancelled,
//! and keeps recent tracks for replay.
//!
//! # Example
//!
//! ```rust,no_run
//! use vugru::{GenerationOrchestrator, GenerationParams, Identity, VocalsMode};
//!
//! #[tokio::main]
//! async fn main() -> vugru::Result<()> {
//!     let orchestrator = GenerationOrchestrator::builder()
//!         .elevenlabs("xi-your-key")
//!         .build()?;
//!
//!     let outcome = orchestrator
//!         .generate(
//!             &Identity::new("alice"),
//!             GenerationParams::new("Calm piano intro", 30, VocalsMode::Instrumental),
//!             None,
//!         )
//!         .await?;
//!
//!     println!("{} ({} bytes)", outcome.track.filename, outcome.track.audio.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod inflight;
pub mod limiter;
pub mod orchestrator;
pub mod providers;
#[cfg(feature = "server")]
pub mod server;
pub mod stream;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{Result, VugruError};
pub use orchestrator::{
    GenerationOrchestrator, GenerationOutcome, OrchestratorBuilder, Provenance, SweepReport,
};
pub use version::{BuildInfo, PKG_VERSION, version_string};

pub use cache::{CacheConfig, CachedResult, ResultCache, TrackStore, TrackStoreConfig};
pub use inflight::{AttemptGuard, AttemptInfo, CancelToken, InFlightConfig, InFlightRegistry};
pub use limiter::{Admission, RateLimitConfig, RateLimiter};
pub use providers::{ElevenLabsClient, GenerationAdapter, MusicProvider, RetryConfig};

// Re-export all types
pub use types::{
    AttemptId, AudioArtifact, Fingerprint, GenerationLimits, GenerationParams, GenerationRequest,
    Identity, Track, TrackSummary, VocalsMode,
};
