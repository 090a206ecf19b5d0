//! Generation request types and validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, VugruError};

/// Opaque client key supplied by the authentication collaborator.
///
/// Used only for rate limiting and cancellation scoping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token naming one in-flight generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(String);

impl AttemptId {
    /// Maximum accepted length for a client-chosen attempt id.
    pub const MAX_LEN: usize = 64;

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a client-chosen attempt id.
    ///
    /// Accepts 1..=64 characters from `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(VugruError::InvalidRequest(format!(
                "attempt id must be 1-{} characters of [A-Za-z0-9_-]",
                Self::MAX_LEN
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the generated track carries vocals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocalsMode {
    #[default]
    Instrumental,
    Vocal,
}

impl VocalsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instrumental => "instrumental",
            Self::Vocal => "vocal",
        }
    }

    /// Parse the wire name. `vocals` is accepted as an alias of `vocal`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "instrumental" => Ok(Self::Instrumental),
            "vocal" | "vocals" => Ok(Self::Vocal),
            other => Err(VugruError::InvalidRequest(format!(
                "vocals_mode must be 'instrumental' or 'vocal', got '{other}'"
            ))),
        }
    }
}

/// Bounds applied during validation.
#[derive(Debug, Clone)]
pub struct GenerationLimits {
    /// Shortest accepted track, in seconds. Default: 10.
    pub min_duration_secs: u32,
    /// Longest accepted track, in seconds. Default: 60.
    pub max_duration_secs: u32,
    /// Maximum prompt length in characters. Default: 1000.
    pub max_prompt_chars: usize,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        Self {
            min_duration_secs: 10,
            max_duration_secs: 60,
            max_prompt_chars: 1000,
        }
    }
}

/// Unvalidated generation parameters, as they arrive from the transport.
///
/// This is also the JSON body of `POST /api/generate_music`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub duration: i64,
    #[serde(default)]
    pub vocals_mode: Option<String>,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>, duration: i64, vocals_mode: VocalsMode) -> Self {
        Self {
            prompt: prompt.into(),
            duration,
            vocals_mode: Some(vocals_mode.as_str().to_string()),
        }
    }
}

/// A validated generation request.
///
/// Constructed only through [`GenerationRequest::validate`], so holding one
/// proves the prompt and duration are within bounds.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    identity: Identity,
    prompt: String,
    duration_secs: u32,
    vocals_mode: VocalsMode,
}

impl GenerationRequest {
    /// Validate raw parameters for `identity`.
    pub fn validate(
        identity: &Identity,
        params: GenerationParams,
        limits: &GenerationLimits,
    ) -> Result<Self> {
        if identity.as_str().trim().is_empty() {
            return Err(VugruError::InvalidRequest(
                "a client identity is required".to_string(),
            ));
        }

        let prompt = params.prompt.trim();
        if prompt.is_empty() {
            return Err(VugruError::InvalidRequest(
                "Prompt must not be empty".to_string(),
            ));
        }
        let chars = prompt.chars().count();
        if chars > limits.max_prompt_chars {
            return Err(VugruError::InvalidRequest(format!(
                "Prompt must be at most {} characters (got {chars})",
                limits.max_prompt_chars
            )));
        }

        let in_range = params.duration >= i64::from(limits.min_duration_secs)
            && params.duration <= i64::from(limits.max_duration_secs);
        if !in_range {
            return Err(VugruError::InvalidRequest(format!(
                "Duration must be between {} and {} seconds",
                limits.min_duration_secs, limits.max_duration_secs
            )));
        }

        let vocals_mode = match params.vocals_mode.as_deref() {
            Some(raw) => VocalsMode::parse(raw)?,
            None => VocalsMode::default(),
        };

        Ok(Self {
            identity: identity.clone(),
            prompt: prompt.to_string(),
            // in range, so the cast cannot truncate
            duration_secs: params.duration as u32,
            vocals_mode,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The user's prompt, trimmed.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn vocals_mode(&self) -> VocalsMode {
        self.vocals_mode
    }

    /// Cache key for this request; identity does not participate.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.prompt, self.duration_secs, self.vocals_mode)
    }

    /// Prompt sent to the provider, with duration and mode hints appended.
    pub fn enhanced_prompt(&self) -> String {
        let mode_hint = match self.vocals_mode {
            VocalsMode::Instrumental => "Make it instrumental only, no vocals.",
            VocalsMode::Vocal => "Include expressive vocals.",
        };
        format!(
            "{}. Duration: {} seconds. {mode_hint} Ensure clean loop points for seamless playback.",
            strip_terminal_dots(&self.prompt),
            self.duration_secs
        )
    }
}

/// Deterministic content key over the normalized generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash prompt, duration and vocals mode.
    ///
    /// The prompt is normalized by collapsing whitespace runs and dropping
    /// the trailing dots the provider prompt drops, so prompts differing
    /// only in spacing or final punctuation share a fingerprint. Case is
    /// preserved.
    pub fn of(prompt: &str, duration_secs: u32, vocals_mode: VocalsMode) -> Self {
        let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        let normalized = strip_terminal_dots(&collapsed);
        let mut hasher = Sha256::new();
        hasher.update(b"vugru:v1\0");
        hasher.update(normalized.as_bytes());
        hasher.update(b"\0");
        hasher.update(duration_secs.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(vocals_mode.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

fn strip_terminal_dots(prompt: &str) -> &str {
    prompt.trim_end_matches('.')
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
