//! # Version Succession
//!
//! Decides and applies what happens to a version group when one member is
//! authorised. This is the only module that writes the active flag.
//!
//! ## Phases
//!
//! - [`VersionSuccessionManager::plan`] is pure: it inspects the new record
//!   and the group's current active member and returns a [`SuccessionPlan`].
//!   A plan that deactivates a predecessor carries a confirmation prompt;
//!   the caller obtains the answer before applying.
//! - [`VersionSuccessionManager::apply`] mutates the records in memory. The
//!   caller stages both records in the same store transaction, so a failed
//!   commit undoes the new record's authorisation and the predecessor's
//!   deactivation together.
//!
//! ## Rules (single-active-version on)
//!
//! 1. Effective start in the future: the new record is held `Pending`,
//!    inactive; the predecessor stays active.
//! 2. Active predecessor: deactivate it (`active_end = now`) and activate
//!    the new record.
//! 3. Otherwise the new record becomes `Authorised` and active.
//!
//! With single-active-version off, the new record is activated and nothing
//! else is touched.

use qrl_core::{PolicyConfig, QrlError, RecordKey, Timestamp};
use thiserror::Error;

use crate::action::Action;
use crate::record::{ApprovalState, Attribution, Record};

/// What authorising a record does to its version group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessionPlan {
    /// Multiple active versions allowed; activate without touching others.
    Concurrent,
    /// No active predecessor; activate the new record.
    Activate,
    /// Deactivate the predecessor, then activate the new record.
    Supersede {
        /// The active member being superseded.
        predecessor: RecordKey,
    },
    /// Future start date; hold the new record as `Pending`.
    HoldPending {
        /// When the record becomes due for activation.
        effective_from: Timestamp,
    },
}

impl SuccessionPlan {
    /// The confirmation question to ask before applying, if any.
    pub fn confirmation_prompt(&self) -> Option<String> {
        match self {
            Self::Supersede { predecessor } => Some(format!(
                "deactivate predecessor version {}?",
                predecessor.version
            )),
            _ => None,
        }
    }

    /// Whether applying this plan touches a second record.
    pub fn touches_predecessor(&self) -> bool {
        matches!(self, Self::Supersede { .. })
    }
}

/// A change applied to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessionEffect {
    /// Record became `Authorised` and active.
    Activated(RecordKey),
    /// Record was deactivated with the given end date.
    Deactivated {
        /// The superseded record.
        key: RecordKey,
        /// Its active end date.
        at: Timestamp,
    },
    /// Record was held `Pending` until its start date.
    HeldPending {
        /// The held record.
        key: RecordKey,
        /// Its effective start date.
        until: Timestamp,
    },
}

/// Succession failures. All indicate a caller bug.
#[derive(Error, Debug)]
pub enum SuccessionError {
    /// Predecessor and new record are not in the same version group, or
    /// the plan names a predecessor other than the one supplied.
    #[error("succession conflict: {new} cannot succeed {predecessor}")]
    Conflict {
        /// The record being authorised.
        new: RecordKey,
        /// The mismatched predecessor.
        predecessor: RecordKey,
    },

    /// A supersede plan was applied without its predecessor.
    #[error("succession plan for {0} requires its predecessor")]
    MissingPredecessor(RecordKey),

    /// A record refused the state or flag change.
    #[error(transparent)]
    Integrity(#[from] QrlError),
}

/// Maintains the single-active-version invariant.
#[derive(Debug, Clone, Copy)]
pub struct VersionSuccessionManager {
    policy: PolicyConfig,
}

impl VersionSuccessionManager {
    /// Create a manager for a policy.
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    /// Decide the succession for `new`, given the group's active member.
    ///
    /// # Errors
    ///
    /// [`SuccessionError::Conflict`] if `predecessor` belongs to another
    /// group or is `new` itself.
    pub fn plan(
        &self,
        new: &Record,
        predecessor: Option<&Record>,
        now: Timestamp,
    ) -> Result<SuccessionPlan, SuccessionError> {
        if let Some(pred) = predecessor {
            if !pred.key.same_group(&new.key) || pred.key == new.key {
                return Err(SuccessionError::Conflict {
                    new: new.key.clone(),
                    predecessor: pred.key.clone(),
                });
            }
        }

        if !self.policy.single_active_version {
            return Ok(SuccessionPlan::Concurrent);
        }
        if let Some(effective_from) = new.effective_from.filter(|at| *at > now) {
            return Ok(SuccessionPlan::HoldPending { effective_from });
        }
        Ok(match predecessor {
            Some(pred) if pred.is_active() => SuccessionPlan::Supersede {
                predecessor: pred.key.clone(),
            },
            _ => SuccessionPlan::Activate,
        })
    }

    /// Apply a plan to the in-memory records.
    ///
    /// `action` and `by` are recorded in the new record's history.
    pub fn apply(
        &self,
        plan: &SuccessionPlan,
        new: &mut Record,
        predecessor: Option<&mut Record>,
        action: Action,
        by: Attribution,
        now: Timestamp,
    ) -> Result<Vec<SuccessionEffect>, SuccessionError> {
        let mut effects = Vec::with_capacity(2);
        match plan {
            SuccessionPlan::HoldPending { effective_from } => {
                new.transition(ApprovalState::Pending, action, by, None)?;
                effects.push(SuccessionEffect::HeldPending {
                    key: new.key.clone(),
                    until: *effective_from,
                });
                tracing::info!(record = %new.key, until = %effective_from, "held pending");
                return Ok(effects);
            }
            SuccessionPlan::Supersede { predecessor: expected } => {
                let pred = predecessor
                    .ok_or_else(|| SuccessionError::MissingPredecessor(new.key.clone()))?;
                if &pred.key != expected || !pred.key.same_group(&new.key) {
                    return Err(SuccessionError::Conflict {
                        new: new.key.clone(),
                        predecessor: pred.key.clone(),
                    });
                }
                pred.set_active(false, now)?;
                effects.push(SuccessionEffect::Deactivated {
                    key: pred.key.clone(),
                    at: now,
                });
                tracing::info!(record = %pred.key, successor = %new.key, "predecessor deactivated");
            }
            SuccessionPlan::Activate | SuccessionPlan::Concurrent => {}
        }

        new.transition(ApprovalState::Authorised, action, by, None)?;
        new.set_active(true, now)?;
        effects.push(SuccessionEffect::Activated(new.key.clone()));
        tracing::info!(record = %new.key, "activated");
        Ok(effects)
    }
}
