//! Public types for the Vugru API.

mod artifact;
mod request;

pub use artifact::{AudioArtifact, DEFAULT_CONTENT_TYPE, Track, TrackSummary, extension_for};
pub use request::{
    AttemptId, Fingerprint, GenerationLimits, GenerationParams, GenerationRequest, Identity,
    VocalsMode,
};
