//! Configuration loading for vugrud.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `~/.vugru/config.toml` (user)
//! 3. `/etc/vugru/config.toml` (system)
//!
//! With no explicit path and no file found, built-in defaults apply.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.vugru/secrets.toml` (user, must be 0600)
//! 2. `/etc/vugru/secrets.toml` (system, must be 0600)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheConfig, TrackStoreConfig};
use crate::inflight::InFlightConfig;
use crate::limiter::RateLimitConfig;
use crate::orchestrator::OrchestratorBuilder;
use crate::providers::RetryConfig;
use crate::providers::elevenlabs::{DEFAULT_BASE_URL, DEFAULT_MODEL_ID};
use crate::types::{GenerationLimits, Identity};
use crate::{Result, VugruError};

/// Environment variable consulted when no ElevenLabs key is in the secrets file.
pub const ELEVENLABS_API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub tracks: TracksSection,
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0:5000).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:5000".to_string()
}

/// Admission limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Generations per identity per window (default: 5).
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,
    /// Window length in seconds (default: 60).
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Generations one identity may have in flight (default: 1).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_per_identity: usize,
    /// Retry-After sent when an identity is busy (default: 5).
    #[serde(default = "default_busy_retry_after")]
    pub busy_retry_after_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
            max_concurrent_per_identity: default_max_concurrent(),
            busy_retry_after_secs: default_busy_retry_after(),
        }
    }
}

fn default_requests_per_window() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    1
}

fn default_busy_retry_after() -> u64 {
    5
}

/// Request bounds and provider call policy.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u32,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Bound on one provider call (default: 120).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts after a transient provider failure (default: 0).
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
            max_prompt_chars: default_max_prompt_chars(),
            timeout_secs: default_timeout(),
            max_retries: 0,
        }
    }
}

fn default_min_duration() -> u32 {
    10
}

fn default_max_duration() -> u32 {
    60
}

fn default_max_prompt_chars() -> usize {
    1000
}

fn default_timeout() -> u64 {
    120
}

/// Result cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
    /// Background sweep period; 0 disables the sweeper (default: 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    900
}

fn default_cache_entries() -> u64 {
    256
}

fn default_sweep_interval() -> u64 {
    60
}

/// Replay buffer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TracksSection {
    #[serde(default = "default_max_tracks")]
    pub max_tracks: usize,
    /// Age after which tracks stop being served; 0 keeps them until evicted.
    #[serde(default = "default_track_age")]
    pub max_age_secs: u64,
}

impl Default for TracksSection {
    fn default() -> Self {
        Self {
            max_tracks: default_max_tracks(),
            max_age_secs: default_track_age(),
        }
    }
}

fn default_max_tracks() -> usize {
    100
}

fn default_track_age() -> u64 {
    900
}

/// Music provider endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model_id: default_model_id(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; an error if missing)
    /// 2. `~/.vugru/config.toml`
    /// 3. `/etc/vugru/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            VugruError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            VugruError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(VugruError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".vugru").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/vugru/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    pub fn generation_limits(&self) -> GenerationLimits {
        GenerationLimits {
            min_duration_secs: self.generation.min_duration_secs,
            max_duration_secs: self.generation.max_duration_secs,
            max_prompt_chars: self.generation.max_prompt_chars,
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new()
            .max_requests(self.limits.requests_per_window)
            .window(Duration::from_secs(self.limits.window_secs))
    }

    pub fn inflight(&self) -> InFlightConfig {
        InFlightConfig::new()
            .max_concurrent_per_identity(self.limits.max_concurrent_per_identity)
            .busy_retry_after(Duration::from_secs(self.limits.busy_retry_after_secs))
    }

    pub fn result_cache(&self) -> CacheConfig {
        CacheConfig::new()
            .ttl(Duration::from_secs(self.cache.ttl_secs))
            .max_entries(self.cache.max_entries)
    }

    pub fn track_store(&self) -> TrackStoreConfig {
        let max_age = (self.tracks.max_age_secs > 0)
            .then(|| Duration::from_secs(self.tracks.max_age_secs));
        TrackStoreConfig::new()
            .max_tracks(self.tracks.max_tracks)
            .max_age(max_age)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new().max_attempts(self.generation.max_retries.saturating_add(1))
    }

    /// Sweeper period, or `None` when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache.sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.cache.sweep_interval_secs))
    }

    /// An orchestrator builder carrying every setting except the provider key.
    pub fn orchestrator_builder(&self) -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .limits(self.generation_limits())
            .rate_limit(self.rate_limit())
            .inflight(self.inflight())
            .cache(self.result_cache())
            .tracks(self.track_store())
            .timeout(Duration::from_secs(self.generation.timeout_secs))
            .retry(self.retry())
            .elevenlabs_base_url(&self.provider.base_url)
            .model_id(&self.provider.model_id)
    }
}

/// Secrets configuration (API keys and client tokens).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub elevenlabs: Option<ApiKeySecret>,
    #[serde(default)]
    pub auth: AuthSecrets,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Bearer tokens accepted by the static authenticator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSecrets {
    /// Token → identity.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.vugru/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/vugru/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (the API key may come from
    /// the environment).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".vugru").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/vugru/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            VugruError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            VugruError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            VugruError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(VugruError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// ElevenLabs API key, falling back to `ELEVENLABS_API_KEY`.
    pub fn elevenlabs_api_key(&self) -> Option<String> {
        self.elevenlabs
            .as_ref()
            .map(|s| s.api_key.clone())
            .or_else(|| std::env::var(ELEVENLABS_API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Bearer token → identity table.
    pub fn token_identities(&self) -> HashMap<String, Identity> {
        self.auth
            .tokens
            .iter()
            .map(|(token, identity)| (token.clone(), Identity::new(identity.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.address, "0.0.0.0:5000");
        assert_eq!(config.limits.requests_per_window, 5);
        assert_eq!(config.limits.max_concurrent_per_identity, 1);
        assert_eq!(config.generation.timeout_secs, 120);
        assert_eq!(config.generation.max_retries, 0);
        assert_eq!(config.cache.ttl_secs, 900);
        assert_eq!(config.provider.model_id, "music_v1");
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [server]
            address = "127.0.0.1:8000"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.address, "127.0.0.1:8000");
        // Defaults preserved
        assert_eq!(config.limits.window_secs, 60);
        assert_eq!(config.generation.max_duration_secs, 60);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            address = "127.0.0.1:5000"

            [limits]
            requests_per_window = 10
            window_secs = 30
            max_concurrent_per_identity = 2
            busy_retry_after_secs = 3

            [generation]
            min_duration_secs = 5
            max_duration_secs = 90
            max_prompt_chars = 500
            timeout_secs = 60
            max_retries = 1

            [cache]
            ttl_secs = 60
            max_entries = 8
            sweep_interval_secs = 0

            [tracks]
            max_tracks = 10
            max_age_secs = 0

            [provider]
            base_url = "http://localhost:9999"
            model_id = "music_v2"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.rate_limit().max_requests, 10);
        assert_eq!(config.rate_limit().window, Duration::from_secs(30));
        assert_eq!(config.inflight().max_concurrent_per_identity, 2);
        assert_eq!(config.inflight().busy_retry_after, Duration::from_secs(3));
        assert_eq!(config.generation_limits().min_duration_secs, 5);
        assert_eq!(config.retry().max_attempts, 2);
        assert_eq!(config.result_cache().max_entries, 8);
        assert_eq!(config.sweep_interval(), None);
        assert_eq!(config.track_store().max_age, None);
        assert_eq!(config.provider.base_url, "http://localhost:9999");
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [elevenlabs]
            api_key = "xi-test-key"

            [auth.tokens]
            "token-a" = "alice"
            "token-b" = "bob"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.elevenlabs_api_key(), Some("xi-test-key".to_string()));
        let tokens = secrets.token_identities();
        assert_eq!(tokens.get("token-a"), Some(&Identity::new("alice")));
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn load_from_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[limits]\nrequests_per_window = 2\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.limits.requests_per_window, 2);
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_secrets_are_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "[elevenlabs]\napi_key = \"k\"\n").unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let err = Secrets::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        assert!(Secrets::load_from_file(&path).is_ok());
    }
}
