//! Bearer authentication at the HTTP boundary.
//!
//! The orchestrator only needs an opaque [`Identity`]; issuing and
//! validating credentials belongs to an external service, reached through
//! the [`Authenticator`] trait.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use super::AppState;
use super::error::ApiError;
use crate::types::Identity;
use crate::{Result, VugruError};

/// Resolves bearer tokens to identities.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validate `token`, returning `Unauthorized` when it is not accepted.
    async fn authenticate(&self, token: &str) -> Result<Identity>;
}

/// Fixed token table, loaded from the secrets file.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: HashMap<String, Identity>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| VugruError::Unauthorized("Invalid bearer token".to_string()))
    }
}

/// Extractor yielding the caller's identity.
pub struct Authenticated(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    VugruError::Unauthorized("Missing or malformed bearer token".to_string())
                })?;
        let identity = state.auth.authenticate(bearer.token()).await?;
        Ok(Self(identity))
    }
}
