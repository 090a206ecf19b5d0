//! Audio responses and their metadata headers.
//!
//! Track metadata travels out of band in response headers. The prompt is
//! untrusted text, so it is serialized explicitly: printable ASCII goes
//! out verbatim, anything else is percent-encoded and flagged with
//! `X-Prompt-Encoding: percent`.

use std::fmt::Write;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;

use super::error::ApiError;
use crate::stream::{self, DEFAULT_CHUNK_SIZE};
use crate::types::{AttemptId, Track};

pub const X_TRACK_ID: &str = "x-track-id";
pub const X_ATTEMPT_ID: &str = "x-attempt-id";
pub const X_PROMPT: &str = "x-prompt";
pub const X_PROMPT_ENCODING: &str = "x-prompt-encoding";
pub const X_CACHE: &str = "x-cache";

/// Longest prompt echoed in `X-Prompt`, in characters.
pub const PROMPT_HEADER_CHARS: usize = 500;

/// A prompt serialized for `X-Prompt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPrompt {
    pub value: String,
    pub percent_encoded: bool,
}

/// Serialize a prompt for the `X-Prompt` header.
pub fn encode_prompt(prompt: &str) -> EncodedPrompt {
    let truncated: String = prompt.chars().take(PROMPT_HEADER_CHARS).collect();
    if truncated.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return EncodedPrompt {
            value: truncated,
            percent_encoded: false,
        };
    }

    let mut value = String::with_capacity(truncated.len() * 3);
    for b in truncated.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            value.push(b as char);
        } else {
            let _ = write!(value, "%{b:02X}");
        }
    }
    EncodedPrompt {
        value,
        percent_encoded: true,
    }
}

/// Stream a track as an audio attachment.
///
/// `cache_hit` sets `X-Cache` (omitted for replays); `attempt_id` is echoed
/// for fresh generations.
pub fn audio_response(
    track: &Track,
    cache_hit: Option<bool>,
    attempt_id: Option<&AttemptId>,
) -> Result<Response, ApiError> {
    let prompt = encode_prompt(&track.prompt);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, track.content_type.as_str())
        .header(header::CONTENT_LENGTH, track.audio.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", track.filename),
        )
        .header(X_TRACK_ID, track.id.as_str())
        .header(X_PROMPT, prompt.value);

    if prompt.percent_encoded {
        builder = builder.header(X_PROMPT_ENCODING, HeaderValue::from_static("percent"));
    }
    if let Some(hit) = cache_hit {
        builder = builder.header(X_CACHE, if hit { "hit" } else { "miss" });
    }
    if let Some(attempt_id) = attempt_id {
        builder = builder.header(X_ATTEMPT_ID, attempt_id.as_str());
    }

    let body = Body::from_stream(stream::chunked(track.audio.clone(), DEFAULT_CHUNK_SIZE));
    builder
        .body(body)
        .map_err(|e| ApiError::internal(format!("failed to build audio response: {e}")))
}
