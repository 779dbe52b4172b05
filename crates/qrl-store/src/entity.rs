//! # Entity Store Contract
//!
//! The persistent store is an external collaborator. The lifecycle needs
//! four primitives from it: `select`, `commit`, `lock` and `unlock`.
//!
//! A [`Transaction`] is the unit of atomicity: every record staged in it is
//! written, or none is. Records carry a `revision`; a staged record whose
//! revision no longer matches the stored one fails the whole commit with
//! [`StoreError::Conflict`].

use qrl_core::{NaturalKey, RecordKey, SessionId};
use qrl_state::Record;

use crate::error::StoreError;

/// Result of a store-level lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The session now holds the record.
    Acquired,
    /// Another session (or this one, earlier) already holds it.
    HeldBy(SessionId),
}

/// Filter for [`EntityStore::select`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Restrict to one version group.
    pub natural_key: Option<NaturalKey>,
    /// Name of the active-flag field to filter on, per the record schema.
    /// `None` returns active and inactive members alike.
    pub active_flag_field: Option<String>,
    /// Name of the version field to rank by, per the record schema. When
    /// set, only the highest-versioned match is returned.
    pub latest_by: Option<String>,
}

impl RecordQuery {
    /// Every member of a version group.
    pub fn group(natural_key: NaturalKey) -> Self {
        Self {
            natural_key: Some(natural_key),
            active_flag_field: None,
            latest_by: None,
        }
    }

    /// Restrict to active members, using the schema's flag field name.
    pub fn active(mut self, active_flag_field: impl Into<String>) -> Self {
        self.active_flag_field = Some(active_flag_field.into());
        self
    }

    /// Restrict to the highest version, using the schema's version field
    /// name.
    pub fn latest(mut self, version_field: impl Into<String>) -> Self {
        self.latest_by = Some(version_field.into());
        self
    }
}

/// Records staged for one atomic commit.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    records: Vec<Record>,
}

impl Transaction {
    /// An empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a record write. A record staged twice keeps the later copy.
    pub fn stage(&mut self, record: Record) {
        match self.records.iter_mut().find(|r| r.key == record.key) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Staged records, in staging order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Keys of the staged records.
    pub fn keys(&self) -> Vec<RecordKey> {
        self.records.iter().map(|r| r.key.clone()).collect()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume into the staged records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// The persistent entity store.
pub trait EntityStore: Send + Sync {
    /// Read one record.
    fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError>;

    /// Read every record matching the query, ordered by key.
    fn select(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError>;

    /// Write a transaction atomically. Returns the records as stored, with
    /// bumped revisions.
    fn commit(&self, txn: Transaction) -> Result<Vec<Record>, StoreError>;

    /// Try to take the record's lock for `session`. Never blocks.
    fn lock(&self, key: &RecordKey, session: SessionId) -> LockOutcome;

    /// Release the record's lock if `session` holds it. Returns whether a
    /// lock was released.
    fn unlock(&self, key: &RecordKey, session: SessionId) -> bool;

    /// The session currently holding the record's lock.
    fn lock_holder(&self, key: &RecordKey) -> Option<SessionId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: u32) -> RecordKey {
        RecordKey::first(NaturalKey::new("SOP-001").unwrap()).with_version(v)
    }

    #[test]
    fn staging_same_key_replaces() {
        let mut txn = Transaction::new();
        txn.stage(Record::draft(key(1), "sop"));
        txn.stage(Record::draft(key(2), "sop"));
        let mut again = Record::draft(key(1), "sop");
        again.removed = true;
        txn.stage(again);

        assert_eq!(txn.records().len(), 2);
        assert!(txn.records()[0].removed);
        assert_eq!(txn.keys(), vec![key(1), key(2)]);
    }

    #[test]
    fn group_query_builder() {
        let q = RecordQuery::group(NaturalKey::new("SOP-001").unwrap()).active("is_active");
        assert_eq!(q.active_flag_field.as_deref(), Some("is_active"));
        assert!(q.natural_key.is_some());
        assert!(q.latest_by.is_none());

        let q = RecordQuery::group(NaturalKey::new("SOP-001").unwrap()).latest("revision_no");
        assert_eq!(q.latest_by.as_deref(), Some("revision_no"));
    }
}
