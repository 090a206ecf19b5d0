//! API error handling

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::VugruError;

/// Status used for cancelled generations (nginx's "client closed request").
pub fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
            retry_after: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "detail": self.message,
            "kind": self.kind,
        }));
        let mut response = (self.status, body).into_response();

        if let Some(retry_after) = self.retry_after {
            // whole seconds, rounded up so clients never retry early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

impl From<VugruError> for ApiError {
    fn from(err: VugruError) -> Self {
        let status = match &err {
            VugruError::InvalidRequest(_) | VugruError::Json(_) => StatusCode::BAD_REQUEST,
            VugruError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            VugruError::QuotaExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            VugruError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            VugruError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            VugruError::Cancelled => client_closed_request(),
            VugruError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            VugruError::NotFound(_) => StatusCode::NOT_FOUND,
            VugruError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
            retry_after: err.retry_after(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}
