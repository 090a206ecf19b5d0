//! Music provider implementations and the call adapter.
//!
//! - [`MusicProvider`]: one outbound generation call per invocation.
//! - [`ElevenLabsClient`]: the HTTP provider.
//! - [`GenerationAdapter`]: timeout, cancellation, artifact validation.
//! - [`RetryConfig`]: orchestrator-owned retry policy (off by default).

pub mod adapter;
pub mod elevenlabs;
pub mod retry;
pub mod traits;

pub use adapter::GenerationAdapter;
pub use elevenlabs::ElevenLabsClient;
pub use retry::RetryConfig;
pub use traits::MusicProvider;
