//! # In-Memory Entity Store
//!
//! Reference [`EntityStore`] for tests, the CLI demo and embedding.
//!
//! - Records live in a `parking_lot::RwLock<BTreeMap>`; a commit validates
//!   and writes every staged record under one write lock, so readers see
//!   the whole transaction or none of it.
//! - The lock table is a `DashMap`, so lock traffic never contends with
//!   record reads.
//! - Commit failures can be injected to exercise rollback paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use qrl_core::{RecordKey, SessionId};
use qrl_state::Record;

use crate::entity::{EntityStore, LockOutcome, RecordQuery, Transaction};
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum CommitFault {
    Next(String),
    Touching(RecordKey, String),
}

/// Thread-safe in-memory store. Cheap to clone; clones share data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<BTreeMap<RecordKey, Record>>>,
    locks: Arc<DashMap<RecordKey, SessionId>>,
    faults: Arc<Mutex<Vec<CommitFault>>>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write records directly, bypassing revision checks. For seeding.
    pub fn seed(&self, records: impl IntoIterator<Item = Record>) {
        let mut guard = self.records.write();
        for mut record in records {
            record.is_new = false;
            guard.insert(record.key.clone(), record);
        }
    }

    /// Fail the next commit with `reason`.
    pub fn fail_next_commit(&self, reason: impl Into<String>) {
        self.faults.lock().push(CommitFault::Next(reason.into()));
    }

    /// Fail the next commit that writes `key`.
    pub fn fail_commit_touching(&self, key: RecordKey, reason: impl Into<String>) {
        self.faults
            .lock()
            .push(CommitFault::Touching(key, reason.into()));
    }

    /// Every stored record, ordered by key.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.read().values().cloned().collect()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_fault(&self, txn: &Transaction) -> Option<String> {
        let mut faults = self.faults.lock();
        let keys = txn.keys();
        let idx = faults.iter().position(|f| match f {
            CommitFault::Next(_) => true,
            CommitFault::Touching(key, _) => keys.contains(key),
        })?;
        Some(match faults.remove(idx) {
            CommitFault::Next(reason) | CommitFault::Touching(_, reason) => reason,
        })
    }
}

impl EntityStore for InMemoryStore {
    fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    fn select(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read();
        let matches = records
            .values()
            .filter(|r| {
                query
                    .natural_key
                    .as_ref()
                    .map_or(true, |nk| &r.key.natural_key == nk)
            })
            .filter(|r| query.active_flag_field.is_none() || r.is_active());
        // Records carry their version in the key, whatever the field name.
        if query.latest_by.is_some() {
            return Ok(matches.max_by_key(|r| r.key.version).cloned().into_iter().collect());
        }
        Ok(matches.cloned().collect())
    }

    fn commit(&self, txn: Transaction) -> Result<Vec<Record>, StoreError> {
        if let Some(reason) = self.take_fault(&txn) {
            tracing::warn!(records = txn.records().len(), %reason, "commit failed");
            return Err(StoreError::CommitFailed(reason));
        }

        let mut guard = self.records.write();
        for record in txn.records() {
            match guard.get(&record.key) {
                Some(_) if record.is_new => return Err(StoreError::Duplicate(record.key.clone())),
                Some(stored) if stored.revision != record.revision => {
                    return Err(StoreError::Conflict {
                        key: record.key.clone(),
                        expected: record.revision,
                        found: stored.revision,
                    });
                }
                None if !record.is_new => return Err(StoreError::NotFound(record.key.clone())),
                _ => {}
            }
        }

        let mut written = Vec::with_capacity(txn.records().len());
        for mut record in txn.into_records() {
            record.revision += 1;
            record.is_new = false;
            guard.insert(record.key.clone(), record.clone());
            written.push(record);
        }
        tracing::debug!(records = written.len(), "transaction committed");
        Ok(written)
    }

    fn lock(&self, key: &RecordKey, session: SessionId) -> LockOutcome {
        match self.locks.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(session);
                LockOutcome::Acquired
            }
            Entry::Occupied(slot) => LockOutcome::HeldBy(*slot.get()),
        }
    }

    fn unlock(&self, key: &RecordKey, session: SessionId) -> bool {
        self.locks
            .remove_if(key, |_, holder| *holder == session)
            .is_some()
    }

    fn lock_holder(&self, key: &RecordKey) -> Option<SessionId> {
        self.locks.get(key).map(|holder| *holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrl_core::NaturalKey;
    use qrl_state::ApprovalState;

    fn key(nk: &str, v: u32) -> RecordKey {
        RecordKey::first(NaturalKey::new(nk).unwrap()).with_version(v)
    }

    fn commit_one(store: &InMemoryStore, record: Record) -> Result<Vec<Record>, StoreError> {
        let mut txn = Transaction::new();
        txn.stage(record);
        store.commit(txn)
    }

    #[test]
    fn commit_new_record_bumps_revision() {
        let store = InMemoryStore::new();
        let written = commit_one(&store, Record::draft(key("A", 1), "sop")).unwrap();
        assert_eq!(written[0].revision, 1);
        assert!(!written[0].is_new);
        assert_eq!(store.get(&key("A", 1)).unwrap().unwrap().revision, 1);
    }

    #[test]
    fn duplicate_new_record_is_rejected() {
        let store = InMemoryStore::new();
        commit_one(&store, Record::draft(key("A", 1), "sop")).unwrap();
        let err = commit_one(&store, Record::draft(key("A", 1), "sop")).unwrap_err();
        assert_eq!(err, StoreError::Duplicate(key("A", 1)));
    }

    #[test]
    fn stale_revision_is_conflict() {
        let store = InMemoryStore::new();
        commit_one(&store, Record::draft(key("A", 1), "sop")).unwrap();
        let first = store.get(&key("A", 1)).unwrap().unwrap();
        let second = first.clone();

        commit_one(&store, first).unwrap();
        let err = commit_one(&store, second).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, found: 2, .. }));
    }

    #[test]
    fn failed_commit_writes_nothing() {
        let store = InMemoryStore::new();
        store.fail_next_commit("disk full");
        let mut txn = Transaction::new();
        txn.stage(Record::draft(key("A", 1), "sop"));
        txn.stage(Record::draft(key("A", 2), "sop"));
        assert_eq!(
            store.commit(txn).unwrap_err(),
            StoreError::CommitFailed("disk full".into())
        );
        assert!(store.is_empty());

        commit_one(&store, Record::draft(key("A", 1), "sop")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn conflict_in_batch_writes_nothing() {
        let store = InMemoryStore::new();
        commit_one(&store, Record::draft(key("A", 1), "sop")).unwrap();
        let mut txn = Transaction::new();
        txn.stage(Record::draft(key("A", 2), "sop"));
        txn.stage(Record::draft(key("A", 1), "sop"));
        assert!(store.commit(txn).is_err());
        assert!(store.get(&key("A", 2)).unwrap().is_none());
    }

    #[test]
    fn targeted_fault_waits_for_its_key() {
        let store = InMemoryStore::new();
        store.fail_commit_touching(key("B", 1), "injected");
        commit_one(&store, Record::draft(key("A", 1), "sop")).unwrap();
        assert!(commit_one(&store, Record::draft(key("B", 1), "sop")).is_err());
        assert!(commit_one(&store, Record::draft(key("B", 1), "sop")).is_ok());
    }

    #[test]
    fn select_filters_group_and_active() {
        let store = InMemoryStore::new();
        store.seed([
            Record::imported(key("A", 1), "sop", ApprovalState::Authorised, false).unwrap(),
            Record::imported(key("A", 2), "sop", ApprovalState::Authorised, true).unwrap(),
            Record::imported(key("B", 1), "sop", ApprovalState::Authorised, true).unwrap(),
        ]);
        let group = store
            .select(&RecordQuery::group(NaturalKey::new("A").unwrap()))
            .unwrap();
        assert_eq!(group.len(), 2);
        let active = store
            .select(&RecordQuery::group(NaturalKey::new("A").unwrap()).active("active"))
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key, key("A", 2));
    }

    #[test]
    fn select_latest_returns_highest_version() {
        let store = InMemoryStore::new();
        store.seed([
            Record::imported(key("A", 1), "sop", ApprovalState::Cancelled, false).unwrap(),
            Record::imported(key("A", 3), "sop", ApprovalState::Draft, false).unwrap(),
            Record::imported(key("A", 2), "sop", ApprovalState::Authorised, true).unwrap(),
        ]);
        let group = RecordQuery::group(NaturalKey::new("A").unwrap());
        let latest = store.select(&group.clone().latest("version")).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].key, key("A", 3));

        let latest_active = store
            .select(&group.active("active").latest("version"))
            .unwrap();
        assert_eq!(latest_active[0].key, key("A", 2));

        let empty = store
            .select(&RecordQuery::group(NaturalKey::new("Z").unwrap()).latest("version"))
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn lock_table_is_per_session() {
        let store = InMemoryStore::new();
        let s1 = SessionId::new();
        let s2 = SessionId::new();
        assert_eq!(store.lock(&key("A", 1), s1), LockOutcome::Acquired);
        assert_eq!(store.lock(&key("A", 1), s2), LockOutcome::HeldBy(s1));
        assert!(!store.unlock(&key("A", 1), s2));
        assert!(store.unlock(&key("A", 1), s1));
        assert!(!store.unlock(&key("A", 1), s1));
        assert_eq!(store.lock_holder(&key("A", 1)), None);
    }
}
