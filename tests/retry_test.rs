//! Tests for opt-in retry of transient provider failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use vugru::{
    AttemptId, AudioArtifact, GenerationOrchestrator, GenerationParams, GenerationRequest,
    Identity, MusicProvider, Result, RetryConfig, VocalsMode, VugruError,
};

// ============================================================================
// Mock providers
// ============================================================================

/// Fails with `error` for the first `failures` calls, then succeeds.
struct FlakyProvider {
    failures: u32,
    error: fn() -> VugruError,
    calls: AtomicU32,
}

impl FlakyProvider {
    fn new(failures: u32, error: fn() -> VugruError) -> Arc<Self> {
        Arc::new(Self {
            failures,
            error,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MusicProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<AudioArtifact> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if call < self.failures {
            Err((self.error)())
        } else {
            Ok(AudioArtifact::new(vec![9u8; 512], "audio/mpeg"))
        }
    }
}

fn unavailable() -> VugruError {
    VugruError::ProviderUnavailable("HTTP 503: overloaded".into())
}

fn orchestrator(provider: Arc<FlakyProvider>, retry: RetryConfig) -> GenerationOrchestrator {
    GenerationOrchestrator::builder()
        .provider(provider)
        .retry(retry)
        .build()
        .unwrap()
}

fn params() -> GenerationParams {
    GenerationParams::new("Retro arcade", 30, VocalsMode::Instrumental)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_when_enabled() {
    let provider = FlakyProvider::new(1, unavailable);
    let orchestrator = orchestrator(
        provider.clone(),
        RetryConfig::new()
            .max_attempts(2)
            .initial_delay(Duration::from_secs(1)),
    );

    let outcome = orchestrator
        .generate(&Identity::new("alice"), params(), None)
        .await
        .unwrap();
    assert!(!outcome.is_cache_hit());
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn default_makes_a_single_call() {
    let provider = FlakyProvider::new(1, unavailable);
    let orchestrator = orchestrator(provider.clone(), RetryConfig::default());

    let err = orchestrator
        .generate(&Identity::new("alice"), params(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider_unavailable");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn attempts_run_out_with_last_error() {
    let provider = FlakyProvider::new(10, unavailable);
    let orchestrator = orchestrator(provider.clone(), RetryConfig::new().max_attempts(3));

    let err = orchestrator
        .generate(&Identity::new("alice"), params(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider_unavailable");
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_are_not_retried() {
    let cases: [fn() -> VugruError; 3] = [
        || VugruError::QuotaExceeded("Not enough credits".into()),
        || VugruError::InvalidRequest("rejected".into()),
        || VugruError::Timeout(Duration::from_secs(60)),
    ];
    for error in cases {
        let provider = FlakyProvider::new(1, error);
        let orchestrator = orchestrator(provider.clone(), RetryConfig::new().max_attempts(3));
        assert!(
            orchestrator
                .generate(&Identity::new("alice"), params(), None)
                .await
                .is_err()
        );
        assert_eq!(provider.calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_retrying() {
    let provider = FlakyProvider::new(10, unavailable);
    let orchestrator = Arc::new(orchestrator(
        provider.clone(),
        RetryConfig::new()
            .max_attempts(5)
            .initial_delay(Duration::from_secs(30)),
    ));
    let attempt_id = AttemptId::new("gen-backoff");

    let task = {
        let orchestrator = orchestrator.clone();
        let attempt_id = attempt_id.clone();
        tokio::spawn(async move {
            orchestrator
                .generate(&Identity::new("alice"), params(), Some(attempt_id))
                .await
        })
    };
    // the first call fails immediately, leaving the attempt in its backoff sleep
    while provider.calls() == 0 {
        tokio::task::yield_now().await;
    }

    assert!(orchestrator.cancel(&Identity::new("alice"), &attempt_id));
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, VugruError::Cancelled));
    assert_eq!(provider.calls(), 1);
}
