//! # Lock Coordinator
//!
//! Exclusive, non-blocking, per-record locks on top of the store's
//! `lock`/`unlock` primitive. Locks are never queued: a held record is
//! denied immediately with the holder's session, and the caller decides
//! whether to continue read-only.
//!
//! ## Modes
//!
//! - [`LockMode::Exclusive`]: ordinary editing. The caller commits on close.
//! - [`LockMode::ExclusiveReviewHold`]: held during a review. Only a
//!   completed review decision commits; closing without one discards.
//!
//! ## Release
//!
//! [`LockGuard`] releases on drop. Releasing twice is a no-op, and a stale
//! token never releases a later acquisition of the same record.
//!
//! ## Batches
//!
//! [`LockCoordinator::try_lock_all`] acquires in [`RecordKey`] order
//! (natural key, then version) and is all-or-nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use qrl_core::{RecordKey, SessionId};

use crate::entity::{EntityStore, LockOutcome};

/// How a lock's holder intends to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Editing lock; commit on close.
    Exclusive,
    /// Review lock; commit only when a decision completes.
    ExclusiveReviewHold,
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Exclusive => "exclusive",
            Self::ExclusiveReviewHold => "review-hold",
        })
    }
}

/// A lock request was denied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("record {key} is locked by {holder}")]
pub struct LockDenied {
    /// The contested record.
    pub key: RecordKey,
    /// The session holding it.
    pub holder: SessionId,
}

/// Proof of one lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    /// Locked record.
    pub key: RecordKey,
    /// Holding session.
    pub session: SessionId,
    /// Close behaviour.
    pub mode: LockMode,
    serial: u64,
}

#[derive(Debug, Clone, Copy)]
struct Held {
    session: SessionId,
    mode: LockMode,
    serial: u64,
}

struct Inner {
    store: Arc<dyn EntityStore>,
    held: DashMap<RecordKey, Held>,
    next_serial: AtomicU64,
}

/// Issues per-record lock tokens. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LockCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("held", &self.inner.held.len())
            .finish_non_exhaustive()
    }
}

impl LockCoordinator {
    /// Create a coordinator over a store's lock table.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                held: DashMap::new(),
                next_serial: AtomicU64::new(1),
            }),
        }
    }

    /// Try to lock one record.
    pub fn try_lock(
        &self,
        key: &RecordKey,
        session: SessionId,
        mode: LockMode,
    ) -> Result<LockGuard, LockDenied> {
        match self.inner.store.lock(key, session) {
            LockOutcome::Acquired => {
                let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
                self.inner.held.insert(
                    key.clone(),
                    Held {
                        session,
                        mode,
                        serial,
                    },
                );
                tracing::debug!(record = %key, %session, %mode, "lock acquired");
                Ok(LockGuard {
                    coordinator: self.clone(),
                    token: LockToken {
                        key: key.clone(),
                        session,
                        mode,
                        serial,
                    },
                    released: false,
                })
            }
            LockOutcome::HeldBy(holder) => {
                tracing::warn!(record = %key, %session, %holder, "lock denied");
                Err(LockDenied {
                    key: key.clone(),
                    holder,
                })
            }
        }
    }

    /// Lock every record or none. Keys are deduplicated and acquired in
    /// sorted order; on the first denial, locks already taken are released.
    pub fn try_lock_all(
        &self,
        keys: &[RecordKey],
        session: SessionId,
        mode: LockMode,
    ) -> Result<Vec<LockGuard>, LockDenied> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            guards.push(self.try_lock(key, session, mode)?);
        }
        Ok(guards)
    }

    /// Release a token. Returns whether a lock was released; a token that
    /// was already released (or superseded) is a no-op.
    pub fn release(&self, token: &LockToken) -> bool {
        let removed = self
            .inner
            .held
            .remove_if(&token.key, |_, held| held.serial == token.serial)
            .is_some();
        if removed {
            self.inner.store.unlock(&token.key, token.session);
            tracing::debug!(record = %token.key, session = %token.session, "lock released");
        }
        removed
    }

    /// The session and mode holding a record, if any.
    pub fn holder(&self, key: &RecordKey) -> Option<(SessionId, LockMode)> {
        if let Some(held) = self.inner.held.get(key) {
            return Some((held.session, held.mode));
        }
        self.inner
            .store
            .lock_holder(key)
            .map(|session| (session, LockMode::Exclusive))
    }

    /// Whether a specific token is still the live lock on its record.
    pub fn is_held(&self, token: &LockToken) -> bool {
        self.inner
            .held
            .get(&token.key)
            .is_some_and(|held| held.serial == token.serial)
    }
}

/// A held lock. Releases on drop.
#[derive(Debug)]
pub struct LockGuard {
    coordinator: LockCoordinator,
    token: LockToken,
    released: bool,
}

impl LockGuard {
    /// The token this guard holds.
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// The locked record.
    pub fn key(&self) -> &RecordKey {
        &self.token.key
    }

    /// The lock mode.
    pub fn mode(&self) -> LockMode {
        self.token.mode
    }

    /// Release now. Calling again is a no-op.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.coordinator.release(&self.token);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use qrl_core::NaturalKey;

    fn key(nk: &str, v: u32) -> RecordKey {
        RecordKey::first(NaturalKey::new(nk).unwrap()).with_version(v)
    }

    fn coordinator() -> LockCoordinator {
        LockCoordinator::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn second_session_is_denied_with_holder() {
        let locks = coordinator();
        let s1 = SessionId::new();
        let s2 = SessionId::new();
        let _g = locks.try_lock(&key("A", 1), s1, LockMode::Exclusive).unwrap();
        let denied = locks
            .try_lock(&key("A", 1), s2, LockMode::Exclusive)
            .unwrap_err();
        assert_eq!(denied.holder, s1);
        assert_eq!(locks.holder(&key("A", 1)), Some((s1, LockMode::Exclusive)));
    }

    #[test]
    fn same_session_relock_is_denied() {
        let locks = coordinator();
        let s1 = SessionId::new();
        let _g = locks.try_lock(&key("A", 1), s1, LockMode::Exclusive).unwrap();
        assert!(locks.try_lock(&key("A", 1), s1, LockMode::Exclusive).is_err());
    }

    #[test]
    fn drop_releases() {
        let locks = coordinator();
        let s1 = SessionId::new();
        {
            let _g = locks
                .try_lock(&key("A", 1), s1, LockMode::ExclusiveReviewHold)
                .unwrap();
            assert_eq!(
                locks.holder(&key("A", 1)),
                Some((s1, LockMode::ExclusiveReviewHold))
            );
        }
        assert!(locks.holder(&key("A", 1)).is_none());
        assert!(locks
            .try_lock(&key("A", 1), SessionId::new(), LockMode::Exclusive)
            .is_ok());
    }

    #[test]
    fn double_release_is_noop() {
        let locks = coordinator();
        let mut g = locks
            .try_lock(&key("A", 1), SessionId::new(), LockMode::Exclusive)
            .unwrap();
        let token = g.token().clone();
        g.release();
        g.release();
        assert!(!locks.release(&token));
        assert!(!locks.is_held(&token));
    }

    #[test]
    fn stale_token_does_not_release_new_holder() {
        let locks = coordinator();
        let mut first = locks
            .try_lock(&key("A", 1), SessionId::new(), LockMode::Exclusive)
            .unwrap();
        let stale = first.token().clone();
        first.release();

        let s2 = SessionId::new();
        let _second = locks.try_lock(&key("A", 1), s2, LockMode::Exclusive).unwrap();
        assert!(!locks.release(&stale));
        assert_eq!(locks.holder(&key("A", 1)).map(|(s, _)| s), Some(s2));
    }

    #[test]
    fn batch_is_sorted_and_deduplicated() {
        let locks = coordinator();
        let guards = locks
            .try_lock_all(
                &[key("B", 1), key("A", 2), key("A", 1), key("B", 1)],
                SessionId::new(),
                LockMode::Exclusive,
            )
            .unwrap();
        let order: Vec<String> = guards.iter().map(|g| g.key().to_string()).collect();
        assert_eq!(order, vec!["A@v1", "A@v2", "B@v1"]);
    }

    #[test]
    fn batch_failure_releases_acquired() {
        let locks = coordinator();
        let other = SessionId::new();
        let _held = locks.try_lock(&key("B", 1), other, LockMode::Exclusive).unwrap();

        let s1 = SessionId::new();
        let denied = locks
            .try_lock_all(&[key("A", 1), key("B", 1), key("C", 1)], s1, LockMode::Exclusive)
            .unwrap_err();
        assert_eq!(denied.key, key("B", 1));
        assert_eq!(denied.holder, other);
        assert!(locks.holder(&key("A", 1)).is_none());
        assert!(locks.holder(&key("C", 1)).is_none());
    }
}
