//! In-flight attempt tracking and cancellation.
//!
//! Every provider dispatch runs inside an [`AttemptGuard`] obtained from
//! [`InFlightRegistry::acquire`]. The guard releases its slot exactly once:
//! explicitly through [`AttemptGuard::finish`], or on drop when the owning
//! future is abandoned (client disconnect, panic).
//!
//! Cancellation and release take the same lock, so the answer to "was this
//! attempt cancelled?" is decided once, at release. A cancel that lands
//! before release always wins, even if the provider already answered.

mod token;

pub use token::CancelToken;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::telemetry;
use crate::types::{AttemptId, Identity};
use crate::{Result, VugruError};

/// Reason attached to the per-identity concurrency denial.
pub const BUSY_REASON: &str = "A music generation request is already in progress";

/// Configuration for the in-flight registry.
#[derive(Debug, Clone)]
pub struct InFlightConfig {
    /// Attempts one identity may have in flight at once. Default: 1.
    pub max_concurrent_per_identity: usize,
    /// `retry_after` reported when the identity is busy. Default: 5s.
    pub busy_retry_after: Duration,
}

impl Default for InFlightConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_identity: 1,
            busy_retry_after: Duration::from_secs(5),
        }
    }
}

impl InFlightConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent_per_identity(mut self, n: usize) -> Self {
        self.max_concurrent_per_identity = n;
        self
    }

    pub fn busy_retry_after(mut self, retry_after: Duration) -> Self {
        self.busy_retry_after = retry_after;
        self
    }
}

/// Snapshot of an active attempt.
#[derive(Debug, Clone)]
pub struct AttemptInfo {
    pub attempt_id: AttemptId,
    pub identity: Identity,
    pub started_at: Instant,
}

impl AttemptInfo {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

struct Slot {
    started_at: Instant,
    token: CancelToken,
}

/// Attempt ids are scoped to their owner; two identities may use the same id.
type SlotKey = (Identity, AttemptId);

/// Registry of active generation attempts.
pub struct InFlightRegistry {
    config: InFlightConfig,
    slots: Mutex<HashMap<SlotKey, Slot>>,
    registered: AtomicU64,
    released: AtomicU64,
}

impl InFlightRegistry {
    pub fn new(config: InFlightConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            registered: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &InFlightConfig {
        &self.config
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SlotKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an attempt for `identity`.
    ///
    /// Uses `attempt_id` when given, otherwise assigns a fresh one. Fails
    /// with `InvalidRequest` if the identity already has an active attempt
    /// with that id, and with `RateLimited` if the identity is at its
    /// concurrency limit. Ids held by other identities are invisible here.
    ///
    /// The caller owns the slot and must [`release`](Self::release) it;
    /// prefer [`acquire`](Self::acquire), which does so automatically.
    pub fn register(
        &self,
        identity: &Identity,
        attempt_id: Option<AttemptId>,
    ) -> Result<(AttemptId, CancelToken)> {
        let attempt_id =
            attempt_id.unwrap_or_else(|| AttemptId::new(uuid::Uuid::new_v4().simple().to_string()));
        let key = (identity.clone(), attempt_id);
        let mut slots = self.slots();

        if slots.contains_key(&key) {
            return Err(VugruError::InvalidRequest(format!(
                "attempt id '{}' is already in use",
                key.1
            )));
        }
        if Self::active(&slots, identity) >= self.config.max_concurrent_per_identity {
            return Err(self.busy());
        }

        let token = CancelToken::new();
        let attempt_id = key.1.clone();
        slots.insert(
            key,
            Slot {
                started_at: Instant::now(),
                token: token.clone(),
            },
        );
        self.registered.fetch_add(1, Ordering::Relaxed);
        debug!(%identity, %attempt_id, "attempt registered");
        Ok((attempt_id, token))
    }

    /// Register an attempt and wrap it in a guard that releases on drop.
    pub fn acquire(
        &self,
        identity: &Identity,
        attempt_id: Option<AttemptId>,
    ) -> Result<AttemptGuard<'_>> {
        let (attempt_id, token) = self.register(identity, attempt_id)?;
        Ok(AttemptGuard {
            registry: self,
            identity: identity.clone(),
            attempt_id,
            token,
            finished: false,
        })
    }

    /// Signal cancellation of an active attempt.
    ///
    /// With `owner` set, only that identity's attempt matches; without it,
    /// every identity's attempt carrying the id is cancelled. Returns
    /// `false` when nothing matched; unknown, finished and foreign ids are
    /// indistinguishable.
    pub fn cancel(&self, owner: Option<&Identity>, attempt_id: &AttemptId) -> bool {
        let slots = self.slots();
        let mut matched = false;
        for ((identity, id), slot) in slots.iter() {
            if id == attempt_id && owner.is_none_or(|o| o == identity) {
                slot.token.cancel();
                debug!(%identity, %attempt_id, "attempt cancellation requested");
                matched = true;
            }
        }
        matched
    }

    /// Whether `identity` is at its concurrency limit right now.
    pub fn is_busy(&self, identity: &Identity) -> bool {
        Self::active(&self.slots(), identity) >= self.config.max_concurrent_per_identity
    }

    /// The denial returned to a busy identity.
    pub(crate) fn busy(&self) -> VugruError {
        VugruError::rate_limited(self.config.busy_retry_after, BUSY_REASON)
    }

    fn active(slots: &HashMap<SlotKey, Slot>, identity: &Identity) -> usize {
        slots.keys().filter(|(owner, _)| owner == identity).count()
    }

    /// Remove an attempt from the registry.
    ///
    /// Returns whether it had been cancelled, or `None` if it was not
    /// registered.
    pub fn release(&self, identity: &Identity, attempt_id: &AttemptId) -> Option<bool> {
        let slot = self
            .slots()
            .remove(&(identity.clone(), attempt_id.clone()))?;
        self.released.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::ATTEMPTS_RELEASED_TOTAL).increment(1);
        debug!(
            %attempt_id,
            elapsed_ms = slot.started_at.elapsed().as_millis() as u64,
            "attempt released"
        );
        Some(slot.token.is_cancelled())
    }

    /// Active attempts for `identity`, oldest first.
    pub fn list(&self, identity: &Identity) -> Vec<AttemptInfo> {
        let mut attempts: Vec<_> = self
            .slots()
            .iter()
            .filter(|((owner, _), _)| owner == identity)
            .map(|((owner, id), slot)| AttemptInfo {
                attempt_id: id.clone(),
                identity: owner.clone(),
                started_at: slot.started_at,
            })
            .collect();
        attempts.sort_by_key(|a| a.started_at);
        attempts
    }

    /// Whether any identity has an active attempt with this id.
    pub fn contains(&self, attempt_id: &AttemptId) -> bool {
        self.slots().keys().any(|(_, id)| id == attempt_id)
    }

    /// Number of active attempts.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attempts registered since creation.
    pub fn registered_total(&self) -> u64 {
        self.registered.load(Ordering::Relaxed)
    }

    /// Attempts released since creation.
    pub fn released_total(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new(InFlightConfig::default())
    }
}

/// Scoped ownership of one registered attempt.
#[must_use = "dropping the guard releases the attempt immediately"]
pub struct AttemptGuard<'a> {
    registry: &'a InFlightRegistry,
    identity: Identity,
    attempt_id: AttemptId,
    token: CancelToken,
    finished: bool,
}

impl AttemptGuard<'_> {
    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Release the attempt and report whether it was cancelled first.
    pub fn finish(mut self) -> bool {
        self.finished = true;
        self.registry
            .release(&self.identity, &self.attempt_id)
            .unwrap_or(false)
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self
            .registry
            .release(&self.identity, &self.attempt_id)
            .is_some()
        {
            telemetry::record_outcome("cancelled");
            warn!(attempt_id = %self.attempt_id, "attempt abandoned before completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_reports_cancellation() {
        let registry = InFlightRegistry::default();
        let alice = Identity::new("alice");
        let (id, token) = registry.register(&alice, None).unwrap();
        assert!(registry.cancel(Some(&alice), &id));
        assert!(token.is_cancelled());
        assert_eq!(registry.release(&alice, &id), Some(true));
        assert_eq!(registry.release(&alice, &id), None);
    }

    #[test]
    fn generated_ids_are_valid_attempt_ids() {
        let registry = InFlightRegistry::default();
        let (id, _) = registry.register(&Identity::new("alice"), None).unwrap();
        assert!(AttemptId::parse(id.as_str()).is_ok());
    }
}
