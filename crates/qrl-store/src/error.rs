//! Store errors.

use qrl_core::RecordKey;
use thiserror::Error;

/// Errors surfaced by an [`EntityStore`](crate::EntityStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with this key exists.
    #[error("record {0} not found")]
    NotFound(RecordKey),

    /// A new record collides with an existing key.
    #[error("record {0} already exists")]
    Duplicate(RecordKey),

    /// The record changed since it was read.
    #[error("record {key} was modified concurrently (expected revision {expected}, found {found})")]
    Conflict {
        /// The stale record.
        key: RecordKey,
        /// Revision the writer read.
        expected: u64,
        /// Revision currently stored.
        found: u64,
    },

    /// The commit boundary rejected the transaction. Nothing was written.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// The schema catalogue could not be loaded.
    #[error("schema catalogue error: {0}")]
    Schema(String),
}
