//! Caching subsystem.
//!
//! Two independent stores:
//!
//! - [`ResultCache`]: fingerprint → finished artifact, with TTL expiry
//!   and an oldest-first size bound. Consulted before any provider call.
//!
//! - [`TrackStore`]: track id → generated track, a bounded replay buffer
//!   behind `GET /api/track/{id}` and `GET /api/recent_tracks`.

pub mod result;
pub mod tracks;

pub use result::{CacheConfig, CachedResult, ResultCache};
pub use tracks::{TrackStore, TrackStoreConfig};
