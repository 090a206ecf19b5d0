//! Audio artifacts and tracks.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::request::{Fingerprint, GenerationRequest};

/// Content type assumed when the provider does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// Binary audio produced by a successful provider call.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Bytes,
    pub content_type: String,
    /// Provider-side id for the generation, when the provider reports one.
    pub provider_track_id: Option<String>,
}

impl AudioArtifact {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            provider_track_id: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// File extension for an audio content type.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => "bin",
    }
}

static TRACK_SEQ: AtomicU64 = AtomicU64::new(0);

/// A generated track held for replay and download.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub filename: String,
    /// First 100 characters of the prompt.
    pub title: String,
    pub prompt: String,
    pub duration_secs: u32,
    pub fingerprint: Fingerprint,
    pub audio: Bytes,
    pub content_type: String,
    pub provider_track_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Track {
    /// Maximum title length in characters.
    pub const TITLE_CHARS: usize = 100;

    /// Build a track from a finished generation, assigning a fresh id.
    pub fn from_generation(request: &GenerationRequest, artifact: AudioArtifact) -> Self {
        let fingerprint = request.fingerprint();
        let created_at = Utc::now();
        let id = track_id(&fingerprint, &created_at);
        let filename = format!(
            "vugru_track_{id}.{}",
            extension_for(&artifact.content_type)
        );
        Self {
            id,
            filename,
            title: request.prompt().chars().take(Self::TITLE_CHARS).collect(),
            prompt: request.prompt().to_string(),
            duration_secs: request.duration_secs(),
            fingerprint,
            audio: artifact.bytes,
            content_type: artifact.content_type,
            provider_track_id: artifact.provider_track_id,
            created_at,
        }
    }

    /// Listing entry with the prompt shortened for display.
    pub fn summary(&self) -> TrackSummary {
        let prompt = if self.prompt.chars().count() > Self::TITLE_CHARS {
            let head: String = self.prompt.chars().take(Self::TITLE_CHARS).collect();
            format!("{head}...")
        } else {
            self.prompt.clone()
        };
        TrackSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            duration: self.duration_secs,
            prompt,
            created_at: self.created_at,
        }
    }
}

/// 12 hex chars of SHA-256 over the fingerprint, creation time and a
/// process-wide sequence number.
fn track_id(fingerprint: &Fingerprint, created_at: &DateTime<Utc>) -> String {
    let seq = TRACK_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_str().as_bytes());
    hasher.update(created_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

/// Track listing entry for `GET /api/recent_tracks`.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub id: String,
    pub filename: String,
    pub duration: u32,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationLimits, GenerationParams, Identity, VocalsMode};

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest::validate(
            &Identity::new("alice"),
            GenerationParams::new(prompt, 30, VocalsMode::Instrumental),
            &GenerationLimits::default(),
        )
        .unwrap()
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension_for("audio/mpeg"), "mp3");
        assert_eq!(extension_for("audio/wav; codecs=1"), "wav");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }

    #[test]
    fn track_ids_are_unique_for_identical_requests() {
        let req = request("Calm piano intro");
        let a = Track::from_generation(&req, AudioArtifact::new(vec![1u8; 4], "audio/mpeg"));
        let b = Track::from_generation(&req, AudioArtifact::new(vec![1u8; 4], "audio/mpeg"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 12);
        assert_eq!(a.filename, format!("vugru_track_{}.mp3", a.id));
    }

    #[test]
    fn summary_shortens_long_prompts() {
        let long = "x".repeat(150);
        let track = Track::from_generation(
            &request(&long),
            AudioArtifact::new(vec![0u8; 1], "audio/mpeg"),
        );
        let summary = track.summary();
        assert_eq!(summary.prompt.len(), 103);
        assert!(summary.prompt.ends_with("..."));
        assert_eq!(track.title.len(), 100);
    }
}
