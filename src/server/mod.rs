//! HTTP service for the orchestrator.
//!
//! This module provides:
//! - Configuration types (`config`)
//! - Bearer authentication (`auth`)
//! - Error-to-response mapping (`error`)
//! - Audio response serialization (`headers`)
//! - Route handlers (`routes`) and the axum [`router`]
//!
//! | Method   | Path                            | Auth   |
//! |----------|---------------------------------|--------|
//! | `GET`    | `/api/health`                   | none   |
//! | `POST`   | `/api/generate_music`           | bearer |
//! | `GET`    | `/api/track/:id`                | none   |
//! | `GET`    | `/api/recent_tracks`            | none   |
//! | `GET`    | `/api/generations`              | bearer |
//! | `DELETE` | `/api/generations/:attempt_id`  | bearer |

pub mod auth;
pub mod config;
pub mod error;
pub mod headers;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

pub use auth::{Authenticated, Authenticator, StaticTokenAuthenticator};
pub use error::ApiError;

use crate::orchestrator::GenerationOrchestrator;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<GenerationOrchestrator>, auth: Arc<dyn Authenticator>) -> Self {
        Self { orchestrator, auth }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/generate_music", post(routes::generate_music))
        .route("/api/track/:id", get(routes::get_track))
        .route("/api/recent_tracks", get(routes::recent_tracks))
        .route("/api/generations", get(routes::list_generations))
        .route(
            "/api/generations/:attempt_id",
            delete(routes::cancel_generation),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
