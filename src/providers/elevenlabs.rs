//! ElevenLabs Music API client.
//!
//! See: <https://elevenlabs.io/docs/api-reference/music/compose>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::MusicProvider;
use crate::types::{AudioArtifact, DEFAULT_CONTENT_TYPE, GenerationRequest, VocalsMode};
use crate::{Result, VugruError, version};

/// Default base URL for the ElevenLabs API
pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Default music model
pub const DEFAULT_MODEL_ID: &str = "music_v1";

/// Rough provider cost, used to suggest a duration that fits the caller's
/// remaining credits (788 credits bought about 35 seconds).
const CREDITS_PER_SECOND: f64 = 22.5;

/// Response headers that may carry the provider's id for a generation.
const TRACK_ID_HEADERS: [&str; 2] = ["song-id", "request-id"];

/// Client for the ElevenLabs Music API.
#[derive(Clone)]
pub struct ElevenLabsClient {
    api_key: String,
    http: Client,
    base_url: String,
    model_id: String,
}

impl ElevenLabsClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        // no total timeout: the adapter bounds the whole call
        let http = Client::builder()
            .user_agent(version::user_agent())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VugruError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
        })
    }

    /// Use a different music model.
    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }
}

#[async_trait]
impl MusicProvider for ElevenLabsClient {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<AudioArtifact> {
        let url = format!("{}/v1/music", self.base_url);
        let prompt = request.enhanced_prompt();
        debug!(model = %self.model_id, prompt = %prompt, "composing track");

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&ComposeRequest {
                prompt: &prompt,
                music_length_ms: u64::from(request.duration_secs()) * 1000,
                model_id: &self.model_id,
                force_instrumental: request.vocals_mode() == VocalsMode::Instrumental,
            })
            .send()
            .await
            .map_err(|e| VugruError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(
                status.as_u16(),
                &body,
                request.duration_secs(),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let provider_track_id = TRACK_ID_HEADERS.iter().find_map(|name| {
            response
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VugruError::ProviderUnavailable(e.to_string()))?;

        Ok(AudioArtifact {
            bytes,
            content_type,
            provider_track_id,
        })
    }
}

/// Map a non-success provider status onto the generation taxonomy.
pub(crate) fn map_error_status(status: u16, body: &str, duration_secs: u32) -> VugruError {
    let client_error = (400..500).contains(&status);
    if status == 402 || (client_error && body.contains("quota_exceeded")) {
        return VugruError::QuotaExceeded(quota_message(body, duration_secs));
    }
    if client_error {
        return VugruError::InvalidRequest(format!(
            "music provider rejected the request ({status}): {}",
            error_detail(body)
        ));
    }
    VugruError::ProviderUnavailable(format!("HTTP {status}: {}", error_detail(body)))
}

fn quota_message(body: &str, duration_secs: u32) -> String {
    match parse_credits(body) {
        Some((remaining, required)) => {
            let max_duration = (remaining as f64 / CREDITS_PER_SECOND).floor() as u64;
            format!(
                "Not enough credits. You have {remaining} credits but need {required} for \
                 {duration_secs} seconds. Try a shorter duration (max ~{max_duration} seconds)."
            )
        }
        None => "Not enough credits for this request. Try a shorter duration (20 seconds or less)."
            .to_string(),
    }
}

/// Extract `(remaining, required)` from
/// "You have R credits remaining, while Q credits are required".
fn parse_credits(message: &str) -> Option<(u64, u64)> {
    let (_, rest) = message.split_once("You have ")?;
    let (remaining, rest) = rest.split_once(" credits remaining, while ")?;
    let (required, _) = rest.split_once(" credits are required")?;
    Some((remaining.trim().parse().ok()?, required.trim().parse().ok()?))
}

/// Human-readable detail from an error body, `{"detail": ...}` when possible.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(ErrorDetail::Message(message)),
        }) => message,
        Ok(ErrorBody {
            detail: Some(ErrorDetail::Structured { message, status }),
        }) => message
            .or(status)
            .unwrap_or_else(|| "unknown error".to_string()),
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.chars().take(200).collect(),
    }
}

#[derive(Serialize)]
struct ComposeRequest<'a> {
    prompt: &'a str,
    music_length_ms: u64,
    model_id: &'a str,
    force_instrumental: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Structured {
        message: Option<String>,
        status: Option<String>,
    },
}
