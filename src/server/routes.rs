//! HTTP handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use super::AppState;
use super::auth::Authenticated;
use super::error::ApiError;
use super::headers::{X_ATTEMPT_ID, audio_response};
use crate::types::{AttemptId, GenerationParams, TrackSummary};
use crate::version::BuildInfo;

/// Tracks listed by `GET /api/recent_tracks`.
pub const RECENT_TRACKS: usize = 5;

pub async fn health() -> Json<Value> {
    let build = BuildInfo::current();
    Json(json!({
        "status": "ok",
        "version": build.to_string(),
        "git_sha": build.short_sha(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn generate_music(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    headers: HeaderMap,
    body: Result<Json<GenerationParams>, JsonRejection>,
) -> Result<Response, ApiError> {
    let attempt_id = headers
        .get(X_ATTEMPT_ID)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::bad_request("X-Attempt-ID must be ASCII"))
                .and_then(|raw| AttemptId::parse(raw).map_err(ApiError::from))
        })
        .transpose()?;
    let Json(params) = body?;

    let outcome = state
        .orchestrator
        .generate(&identity, params, attempt_id)
        .await?;
    audio_response(
        &outcome.track,
        Some(outcome.is_cache_hit()),
        outcome.attempt_id(),
    )
}

pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let track = state
        .orchestrator
        .track(&id)
        .ok_or_else(|| ApiError::not_found("Track not found"))?;
    debug!(track_id = %track.id, "replaying track");
    audio_response(&track, None, None)
}

#[derive(Serialize)]
pub struct RecentTracks {
    pub tracks: Vec<TrackSummary>,
}

pub async fn recent_tracks(State(state): State<AppState>) -> Json<RecentTracks> {
    let tracks = state
        .orchestrator
        .recent_tracks(RECENT_TRACKS)
        .iter()
        .map(|track| track.summary())
        .collect();
    Json(RecentTracks { tracks })
}

#[derive(Serialize)]
pub struct AttemptView {
    pub attempt_id: String,
    pub started_ms_ago: u64,
}

#[derive(Serialize)]
pub struct Attempts {
    pub attempts: Vec<AttemptView>,
}

pub async fn list_generations(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
) -> Json<Attempts> {
    let attempts = state
        .orchestrator
        .list_attempts(&identity)
        .into_iter()
        .map(|info| AttemptView {
            started_ms_ago: info.elapsed().as_millis() as u64,
            attempt_id: info.attempt_id.to_string(),
        })
        .collect();
    Json(Attempts { attempts })
}

pub async fn cancel_generation(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // malformed ids are reported like unknown ones
    let cancelled = AttemptId::parse(&raw_id)
        .map(|attempt_id| state.orchestrator.cancel(&identity, &attempt_id))
        .unwrap_or(false);
    if cancelled {
        Ok(Json(json!({ "cancelled": true })))
    } else {
        Err(ApiError::not_found("No active generation with that id"))
    }
}
