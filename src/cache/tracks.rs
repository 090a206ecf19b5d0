//! Volatile replay buffer of recently generated tracks.
//!
//! Not the system of record: tracks are evicted oldest-first once the
//! store is full, and hidden once older than `max_age`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::types::Track;

/// Configuration for the [`TrackStore`].
#[derive(Debug, Clone)]
pub struct TrackStoreConfig {
    /// Maximum number of tracks held. Default: 100.
    pub max_tracks: usize,
    /// Age after which a track is no longer served. Default: 15 minutes.
    /// `None` keeps tracks until evicted by count.
    pub max_age: Option<Duration>,
}

impl Default for TrackStoreConfig {
    fn default() -> Self {
        Self {
            max_tracks: 100,
            max_age: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl TrackStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_tracks(mut self, n: usize) -> Self {
        self.max_tracks = n;
        self
    }

    pub fn max_age(mut self, age: Option<Duration>) -> Self {
        self.max_age = age;
        self
    }
}

struct StoredTrack {
    track: Arc<Track>,
    stored_at: Instant,
}

#[derive(Default)]
struct Inner {
    tracks: HashMap<String, StoredTrack>,
    /// Track ids, oldest first.
    order: VecDeque<String>,
}

/// Bounded in-memory track history, keyed by track id.
pub struct TrackStore {
    config: TrackStoreConfig,
    inner: RwLock<Inner>,
}

impl TrackStore {
    pub fn new(config: TrackStoreConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert a track, evicting the oldest tracks beyond `max_tracks`.
    pub fn put(&self, track: Track) -> Arc<Track> {
        let track = Arc::new(track);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.tracks.contains_key(&track.id) {
            inner.order.retain(|id| id != &track.id);
        }
        inner.tracks.insert(
            track.id.clone(),
            StoredTrack {
                track: Arc::clone(&track),
                stored_at: Instant::now(),
            },
        );
        inner.order.push_back(track.id.clone());

        while inner.order.len() > self.config.max_tracks {
            if let Some(oldest) = inner.order.pop_front() {
                inner.tracks.remove(&oldest);
                debug!(track_id = %oldest, "evicted track from replay buffer");
            }
        }
        track
    }

    /// Look up a live track by id.
    pub fn get(&self, id: &str) -> Option<Arc<Track>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        inner
            .tracks
            .get(id)
            .filter(|stored| !self.is_expired(stored, now))
            .map(|stored| Arc::clone(&stored.track))
    }

    /// Up to `limit` live tracks, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<Track>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.tracks.get(id))
            .filter(|stored| !self.is_expired(stored, now))
            .take(limit)
            .map(|stored| Arc::clone(&stored.track))
            .collect()
    }

    /// Drop tracks older than `max_age`. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let Some(max_age) = self.config.max_age else {
            return 0;
        };
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let before = inner.order.len();

        // insertion order is age order, so expired ids form a prefix
        while let Some(id) = inner.order.front() {
            let expired = inner
                .tracks
                .get(id)
                .is_none_or(|stored| now.saturating_duration_since(stored.stored_at) >= max_age);
            if !expired {
                break;
            }
            if let Some(id) = inner.order.pop_front() {
                inner.tracks.remove(&id);
            }
        }
        before - inner.order.len()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tracks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, stored: &StoredTrack, now: Instant) -> bool {
        self.config
            .max_age
            .is_some_and(|max_age| now.saturating_duration_since(stored.stored_at) >= max_age)
    }
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(TrackStoreConfig::default())
    }
}
