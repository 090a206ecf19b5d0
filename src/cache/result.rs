//! Fingerprint-addressed cache of finished audio artifacts.
//!
//! [`ResultCache`] lets identical generation requests, possibly from
//! different identities, share one paid provider call. Entries are written
//! only once the complete artifact is in hand and are never mutated.
//!
//! # Expiry
//!
//! Every entry carries its own `expires_at`. Lookups compare it against
//! `tokio::time::Instant::now()`, so an expired entry is invisible even
//! before it is reclaimed. Reclamation happens three ways:
//!
//! - moka's per-entry expiry (wall clock, backstop)
//! - [`ResultCache::sweep`] on every store
//! - the orchestrator's periodic sweeper task
//!
//! # Size bound
//!
//! After expired entries are removed, the oldest-created entries are
//! evicted until at most `max_entries` remain.

use std::time::Duration;

use bytes::Bytes;
use moka::future::Cache;
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;
use crate::types::{AudioArtifact, Fingerprint};

const MIN_TTL: Duration = Duration::from_nanos(1);

/// Configuration for the result cache.
///
/// ```rust
/// # use vugru::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(512)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached artifacts. Default: 256.
    pub max_entries: u64,
    /// Time-to-live for cached artifacts. Default: 15 minutes.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A cached artifact.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub fingerprint: Fingerprint,
    pub audio: Bytes,
    pub content_type: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CachedResult {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.created_at)
    }

    /// The cached audio as an artifact, sharing the same buffer.
    pub fn to_artifact(&self) -> AudioArtifact {
        AudioArtifact::new(self.audio.clone(), self.content_type.clone())
    }
}

/// Per-entry TTL for moka, read from the stored value.
struct EntryTtl;

impl moka::Expiry<Fingerprint, CachedResult> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &CachedResult,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl())
    }

    fn expire_after_update(
        &self,
        _key: &Fingerprint,
        value: &CachedResult,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl())
    }
}

/// In-memory artifact cache keyed on [`Fingerprint`].
pub struct ResultCache {
    entries: Cache<Fingerprint, CachedResult>,
    config: CacheConfig,
}

impl ResultCache {
    /// Create a new result cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            // hard backstop; `sweep` keeps the count at `max_entries`
            .max_capacity(config.max_entries.saturating_mul(2).max(1))
            .expire_after(EntryTtl)
            .build();
        Self {
            entries,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live artifact.
    ///
    /// Returns `None` on a miss or when the entry has expired. Emits cache
    /// hit/miss metrics.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<CachedResult> {
        match self.entries.get(fingerprint).await {
            Some(entry) if !entry.is_expired_at(Instant::now()) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                Some(entry)
            }
            _ => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    /// Store a complete artifact under `fingerprint` for `ttl`.
    ///
    /// Overwrites any previous entry for the same fingerprint, then sweeps.
    /// A zero `ttl` is raised to the shortest representable lifetime so the
    /// entry always expires strictly after it was created.
    pub async fn store(
        &self,
        fingerprint: Fingerprint,
        audio: Bytes,
        content_type: impl Into<String>,
        ttl: Duration,
    ) -> CachedResult {
        let created_at = Instant::now();
        let entry = CachedResult {
            fingerprint: fingerprint.clone(),
            audio,
            content_type: content_type.into(),
            created_at,
            expires_at: created_at + ttl.max(MIN_TTL),
        };
        self.entries.insert(fingerprint, entry.clone()).await;
        self.sweep().await;
        entry
    }

    /// Remove expired entries, then evict oldest-created entries until the
    /// size bound holds. Returns the number of entries removed.
    pub async fn sweep(&self) -> usize {
        self.entries.run_pending_tasks().await;
        let now = Instant::now();

        let mut live = Vec::new();
        let mut expired = Vec::new();
        for (key, entry) in self.entries.iter() {
            if entry.is_expired_at(now) {
                expired.push(key);
            } else {
                live.push((key, entry.created_at));
            }
        }

        let mut removed = expired.len();
        for key in expired {
            self.entries.invalidate(key.as_ref()).await;
        }

        let max = usize::try_from(self.config.max_entries).unwrap_or(usize::MAX);
        if live.len() > max {
            live.sort_by_key(|(_, created_at)| *created_at);
            let excess = live.len() - max;
            for (key, _) in live.into_iter().take(excess) {
                self.entries.invalidate(key.as_ref()).await;
                removed += 1;
            }
        }

        if removed > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(removed as u64);
            debug!(removed, "result cache swept");
        }
        removed
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        self.entries.run_pending_tasks().await;
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
