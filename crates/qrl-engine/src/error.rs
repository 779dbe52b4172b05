//! # Transition Errors
//!
//! Every way a requested action can fail, and the class the UI uses to pick
//! between a retry offer, a message, and a loud abort.
//!
//! | Variant                 | Class           |
//! |-------------------------|-----------------|
//! | `LockDenied`            | Recoverable     |
//! | `Store` (conflict/fail) | Recoverable     |
//! | `IllegalTransition`     | UserError       |
//! | `SubmissionFailed`      | UserError       |
//! | `DeactivationDeclined`  | UserError       |
//! | `MissingPlan`           | DataIntegrity   |
//! | `ReviewerIneligible`    | DataIntegrity*  |
//! | `MissingCapability`     | Fatal           |
//! | `Succession`            | Fatal           |
//! | `Integrity`             | Fatal           |
//!
//! \* a requester lacking the delegation privilege is a user error.

use qrl_core::{QrlError, RecordKey, SessionId};
use qrl_state::{Refusal, ReviewRefusal, SuccessionError};
use qrl_store::{LockDenied, StoreError};
use thiserror::Error;

/// How the caller should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Retry later, or continue read-only.
    Recoverable,
    /// Show the message; nothing to retry.
    UserError,
    /// The record's data must be fixed (usually its plan).
    DataIntegrity,
    /// A caller or configuration bug. Abort loudly.
    Fatal,
}

/// Failure of a requested action. No partial effect is ever committed.
#[derive(Error, Debug)]
pub enum TransitionError {
    /// Another session holds the record.
    #[error("record {key} is locked by {holder}")]
    LockDenied {
        /// The contested record.
        key: RecordKey,
        /// The holding session.
        holder: SessionId,
        /// Whether the record may be opened read-only instead.
        display_fallback: bool,
    },

    /// The action is not legal in the record's current state.
    #[error("{}", .0.reason)]
    IllegalTransition(Refusal),

    /// The record's schema lacks a capability the action needs.
    #[error("record type {record_type:?} does not declare the {capability} capability")]
    MissingCapability {
        /// The record's type.
        record_type: String,
        /// The missing capability.
        capability: &'static str,
    },

    /// Submission or review needs an inspection plan with an assignment.
    #[error("record {key}: {reason}")]
    MissingPlan {
        /// The record lacking a plan.
        key: RecordKey,
        /// Human-readable reason.
        reason: String,
    },

    /// The resolved reviewer may not decide this record.
    #[error("{}", .0.reason)]
    ReviewerIneligible(ReviewRefusal),

    /// The submission router returned a state outside the submission
    /// vocabulary.
    #[error("submission of {key} failed: {reason}")]
    SubmissionFailed {
        /// The record being submitted.
        key: RecordKey,
        /// Human-readable reason.
        reason: String,
    },

    /// The user declined to deactivate the active predecessor.
    #[error("authorising {key} requires deactivating {predecessor}, which was declined")]
    DeactivationDeclined {
        /// The record being authorised.
        key: RecordKey,
        /// The active predecessor.
        predecessor: RecordKey,
    },

    /// No record with this key exists.
    #[error("record {0} not found")]
    NotFound(RecordKey),

    /// The review session already closed.
    #[error("review of {0} is closed")]
    ReviewClosed(RecordKey),

    /// The edit session already closed.
    #[error("edit of {0} is closed")]
    EditClosed(RecordKey),

    /// Version succession was asked to cross version groups.
    #[error(transparent)]
    Succession(#[from] SuccessionError),

    /// The store rejected a read or the commit.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A lifecycle invariant would be broken.
    #[error(transparent)]
    Integrity(#[from] QrlError),
}

impl TransitionError {
    /// Classify the failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::LockDenied { .. } => ErrorClass::Recoverable,
            Self::Store(StoreError::Conflict { .. } | StoreError::CommitFailed(_)) => {
                ErrorClass::Recoverable
            }
            Self::Store(StoreError::NotFound(_) | StoreError::Duplicate(_)) => {
                ErrorClass::UserError
            }
            Self::Store(StoreError::Schema(_)) => ErrorClass::Fatal,
            Self::IllegalTransition(_)
            | Self::SubmissionFailed { .. }
            | Self::DeactivationDeclined { .. }
            | Self::NotFound(_)
            | Self::ReviewClosed(_)
            | Self::EditClosed(_) => ErrorClass::UserError,
            Self::MissingPlan { .. } => ErrorClass::DataIntegrity,
            Self::ReviewerIneligible(refusal) if refusal.is_data_integrity() => {
                ErrorClass::DataIntegrity
            }
            Self::ReviewerIneligible(_) => ErrorClass::UserError,
            Self::MissingCapability { .. } | Self::Succession(_) | Self::Integrity(_) => {
                ErrorClass::Fatal
            }
        }
    }

    /// Whether the UI may offer to open the record read-only.
    pub fn offers_display(&self) -> bool {
        match self {
            Self::LockDenied {
                display_fallback, ..
            } => *display_fallback,
            Self::IllegalTransition(refusal) => refusal.display_fallback,
            _ => false,
        }
    }
}

impl From<LockDenied> for TransitionError {
    fn from(denied: LockDenied) -> Self {
        Self::LockDenied {
            key: denied.key,
            holder: denied.holder,
            display_fallback: true,
        }
    }
}

impl From<ReviewRefusal> for TransitionError {
    fn from(refusal: ReviewRefusal) -> Self {
        Self::ReviewerIneligible(refusal)
    }
}
