//! HTTP surface tests: routing, auth, headers and error mapping.

#![cfg(feature = "server")]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use vugru::server::{AppState, StaticTokenAuthenticator, router};
use vugru::{
    AttemptId, AudioArtifact, GenerationOrchestrator, GenerationRequest, Identity, MusicProvider,
    RateLimitConfig, Result, VugruError,
};

// ============================================================================
// Mock providers
// ============================================================================

const AUDIO_LEN: usize = 45 * 1024;

struct MockProvider {
    delay: Duration,
    calls: AtomicU32,
}

#[async_trait]
impl MusicProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<AudioArtifact> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AudioArtifact::new(vec![0x55u8; AUDIO_LEN], "audio/mpeg"))
    }
}

struct BrokeProvider;

#[async_trait]
impl MusicProvider for BrokeProvider {
    fn name(&self) -> &str {
        "broke"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<AudioArtifact> {
        Err(VugruError::QuotaExceeded(
            "Not enough credits for this request. Try a shorter duration (20 seconds or less)."
                .into(),
        ))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn mock(delay: Duration) -> Arc<MockProvider> {
    Arc::new(MockProvider {
        delay,
        calls: AtomicU32::new(0),
    })
}

fn app_with(orchestrator: GenerationOrchestrator) -> (Router, Arc<GenerationOrchestrator>) {
    let orchestrator = Arc::new(orchestrator);
    let auth = StaticTokenAuthenticator::default()
        .with_token("alice-token", Identity::new("alice"))
        .with_token("bob-token", Identity::new("bob"));
    let state = AppState::new(orchestrator.clone(), Arc::new(auth));
    (router(state), orchestrator)
}

fn app(provider: Arc<dyn MusicProvider>) -> (Router, Arc<GenerationOrchestrator>) {
    app_with(
        GenerationOrchestrator::builder()
            .provider(provider)
            .build()
            .unwrap(),
    )
}

fn generate_request(token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/generate_music")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

// ============================================================================
// Health and auth
// ============================================================================

#[tokio::test]
async fn health_reports_version() {
    let (app, _) = app(mock(Duration::ZERO));
    let response = app.oneshot(get("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(
        body["version"]
            .as_str()
            .unwrap()
            .starts_with(vugru::PKG_VERSION)
    );
}

#[tokio::test]
async fn generate_requires_bearer_token() {
    let (app, orchestrator) = app(mock(Duration::ZERO));

    let request = Request::builder()
        .method("POST")
        .uri("/api/generate_music")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"prompt": "beat", "duration": 30}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header_str(&response, "www-authenticate"), "Bearer");

    let response = app
        .oneshot(generate_request(
            "wrong-token",
            json!({"prompt": "beat", "duration": 30}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["kind"], "unauthorized");
    assert!(orchestrator.tracks().is_empty());
}

// ============================================================================
// Generation
// ============================================================================

#[tokio::test]
async fn generate_streams_audio_with_metadata_headers() {
    let provider = mock(Duration::ZERO);
    let (app, _) = app(provider.clone());
    let body = json!({"prompt": "Calm piano intro", "duration": 30, "vocals_mode": "instrumental"});

    let response = app
        .clone()
        .oneshot(generate_request("alice-token", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "audio/mpeg");
    assert_eq!(header_str(&response, "content-length"), "46080");
    assert_eq!(header_str(&response, "x-cache"), "miss");
    assert_eq!(header_str(&response, "x-prompt"), "Calm piano intro");
    assert!(response.headers().get("x-prompt-encoding").is_none());
    assert!(response.headers().get("x-attempt-id").is_some());

    let track_id = header_str(&response, "x-track-id").to_string();
    assert_eq!(track_id.len(), 12);
    assert_eq!(
        header_str(&response, "content-disposition"),
        format!("attachment; filename=\"vugru_track_{track_id}.mp3\"")
    );
    let first = body_bytes(response).await;
    assert_eq!(first.len(), AUDIO_LEN);

    let response = app
        .oneshot(generate_request("bob-token", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-cache"), "hit");
    assert!(response.headers().get("x-attempt-id").is_none());
    assert_ne!(header_str(&response, "x-track-id"), track_id);
    assert_eq!(body_bytes(response).await, first);
    assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn caller_attempt_id_is_echoed() {
    let (app, _) = app(mock(Duration::ZERO));
    let mut request = generate_request("alice-token", json!({"prompt": "beat", "duration": 20}));
    request
        .headers_mut()
        .insert("x-attempt-id", "my-attempt_1".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-attempt-id"), "my-attempt_1");
}

#[tokio::test]
async fn malformed_attempt_id_is_rejected() {
    let (app, _) = app(mock(Duration::ZERO));
    let mut request = generate_request("alice-token", json!({"prompt": "beat", "duration": 20}));
    request
        .headers_mut()
        .insert("x-attempt-id", "has spaces".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_ascii_prompt_is_percent_encoded() {
    let (app, _) = app(mock(Duration::ZERO));
    let response = app
        .oneshot(generate_request(
            "alice-token",
            json!({"prompt": "Café\nnights", "duration": 30}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-prompt"), "Caf%C3%A9%0Anights");
    assert_eq!(header_str(&response, "x-prompt-encoding"), "percent");
}

#[tokio::test]
async fn out_of_range_duration_is_bad_request() {
    let provider = mock(Duration::ZERO);
    let (app, _) = app(provider.clone());
    let response = app
        .oneshot(generate_request(
            "alice-token",
            json!({"prompt": "beat", "duration": 999}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Duration must be between 10 and 60 seconds");
    assert_eq!(body["kind"], "invalid_request");
    assert_eq!(provider.calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (app, _) = app(mock(Duration::ZERO));
    let request = Request::builder()
        .method("POST")
        .uri("/api/generate_music")
        .header(header::AUTHORIZATION, "Bearer alice-token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body")
    );
}

#[tokio::test]
async fn quota_exceeded_is_payment_required() {
    let (app, _) = app(Arc::new(BrokeProvider));
    let response = app
        .oneshot(generate_request(
            "alice-token",
            json!({"prompt": "beat", "duration": 60}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "quota_exceeded");
    assert!(body["detail"].as_str().unwrap().contains("20 seconds or less"));
}

#[tokio::test]
async fn rate_limited_carries_retry_after() {
    let (app, _) = app_with(
        GenerationOrchestrator::builder()
            .provider(mock(Duration::ZERO))
            .rate_limit(RateLimitConfig::new().max_requests(1))
            .build()
            .unwrap(),
    );
    let body = json!({"prompt": "beat", "duration": 30});

    let response = app
        .clone()
        .oneshot(generate_request("alice-token", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(generate_request("alice-token", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = header_str(&response, "retry-after").parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(body_json(response).await["kind"], "rate_limited");
}

// ============================================================================
// Replay
// ============================================================================

#[tokio::test]
async fn track_replay_and_recent_listing() {
    let (app, _) = app(mock(Duration::ZERO));
    let response = app
        .clone()
        .oneshot(generate_request(
            "alice-token",
            json!({"prompt": "Lo-fi rain", "duration": 15}),
        ))
        .await
        .unwrap();
    let track_id = header_str(&response, "x-track-id").to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/track/{track_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-cache").is_none());
    assert_eq!(body_bytes(response).await.len(), AUDIO_LEN);

    let response = app
        .clone()
        .oneshot(get("/api/track/000000000000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["detail"], "Track not found");

    let response = app.oneshot(get("/api/recent_tracks")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let tracks = body["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0]["id"], track_id.as_str());
    assert_eq!(tracks[0]["duration"], 15);
    assert_eq!(tracks[0]["prompt"], "Lo-fi rain");
}

// ============================================================================
// In-flight listing and cancellation
// ============================================================================

#[tokio::test]
async fn cancel_unknown_attempt_is_not_found() {
    let (app, _) = app(mock(Duration::ZERO));
    for id in ["missing", "bad%20id"] {
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/generations/{id}"))
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["kind"], "not_found");
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_over_http_ends_generation_with_499() {
    let (app, orchestrator) = app(mock(Duration::from_secs(30)));
    let attempt_id = AttemptId::new("gen-http");

    let pending = {
        let app = app.clone();
        let mut request =
            generate_request("alice-token", json!({"prompt": "Ambient", "duration": 30}));
        request
            .headers_mut()
            .insert("x-attempt-id", "gen-http".parse().unwrap());
        tokio::spawn(async move { app.oneshot(request).await.unwrap() })
    };
    while !orchestrator.inflight().contains(&attempt_id) {
        tokio::task::yield_now().await;
    }

    let list = Request::builder()
        .uri("/api/generations")
        .header(header::AUTHORIZATION, "Bearer alice-token")
        .body(Body::empty())
        .unwrap();
    let body = body_json(app.clone().oneshot(list).await.unwrap()).await;
    assert_eq!(body["attempts"][0]["attempt_id"], "gen-http");

    // another identity neither sees nor cancels it
    let foreign = Request::builder()
        .method("DELETE")
        .uri("/api/generations/gen-http")
        .header(header::AUTHORIZATION, "Bearer bob-token")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(foreign).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let cancel = Request::builder()
        .method("DELETE")
        .uri("/api/generations/gen-http")
        .header(header::AUTHORIZATION, "Bearer alice-token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(cancel).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cancelled"], true);

    let response = pending.await.unwrap();
    assert_eq!(response.status().as_u16(), 499);
    assert_eq!(body_json(response).await["kind"], "cancelled");
    assert!(orchestrator.cache().is_empty().await);
}
