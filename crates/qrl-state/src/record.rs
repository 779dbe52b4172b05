//! # Record Model
//!
//! A versioned, regulated business record and the plan that governs its
//! review.
//!
//! ## States
//!
//! ```text
//!            ┌──────────── Resubmit ───────────┐
//!            ▼                                 │
//! Draft ──Submit──▶ Inspection ──Reject──▶ Rejected ──Cancel──▶ Cancelled
//!   │                   │                                          │
//!   │ (low, no plan)    │ Approve                                  │
//!   ▼                   ▼                                          │
//! Authorised ◀──── (succession) ────▶ Pending (future start date)  │
//!   │                                                              │
//!   └──────── NewVersion ──▶ Draft vN+1 ◀──────── NewVersion ──────┘
//! ```
//!
//! ## Invariants
//!
//! - `active` implies the state is `Authorised` or `Pending`. Enforced by
//!   [`Record::transition`] and the crate-private active setter.
//! - Only [`crate::succession`] flips the active flag.
//! - Superseded versions are deactivated, never deleted; their approval
//!   state stays as it was.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use qrl_core::{ActorId, NaturalKey, PrivilegeId, QrlError, RecordKey, Timestamp};

use crate::action::Action;

// ─── Approval State ──────────────────────────────────────────────────

/// The approval state of a record version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApprovalState {
    /// Unsubmitted, or reset for resubmission.
    Draft,
    /// Submitted and awaiting review.
    Inspection,
    /// Review declined; returned for correction.
    Rejected,
    /// Authorised but not yet active (future effective date).
    Pending,
    /// Approved and active.
    Authorised,
    /// Withdrawn. Only a new version leaves this state.
    Cancelled,
}

impl ApprovalState {
    /// Every state, in lifecycle order.
    pub const ALL: [ApprovalState; 6] = [
        ApprovalState::Draft,
        ApprovalState::Inspection,
        ApprovalState::Rejected,
        ApprovalState::Pending,
        ApprovalState::Authorised,
        ApprovalState::Cancelled,
    ];

    /// Whether a record in this state may carry the active flag.
    pub fn may_be_active(&self) -> bool {
        matches!(self, Self::Authorised | Self::Pending)
    }
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::Inspection => "INSPECTION",
            Self::Rejected => "REJECTED",
            Self::Pending => "PENDING",
            Self::Authorised => "AUTHORISED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

// ─── Inspection Plan ─────────────────────────────────────────────────

/// Who an inspection assignment is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Assignee {
    /// A specific named actor.
    Actor(ActorId),
    /// Any actor holding the privilege.
    AnyWithPrivilege(PrivilegeId),
}

/// One review task within an inspection plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionAssignment {
    /// Who may complete this assignment.
    pub assignee: Assignee,
    /// The reviewer who completed it, once approved.
    pub completed_by: Option<ActorId>,
}

impl InspectionAssignment {
    /// An open assignment for a named actor.
    pub fn actor(actor: ActorId) -> Self {
        Self {
            assignee: Assignee::Actor(actor),
            completed_by: None,
        }
    }

    /// An open assignment for any holder of a privilege.
    pub fn privilege(privilege: PrivilegeId) -> Self {
        Self {
            assignee: Assignee::AnyWithPrivilege(privilege),
            completed_by: None,
        }
    }

    /// Whether a reviewer still has to complete this assignment.
    pub fn is_open(&self) -> bool {
        self.completed_by.is_none()
    }
}

/// Review plan attached to a record.
///
/// `participants` are the actors who produced the work under inspection.
/// Under high security they may not review it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionPlan {
    /// Review tasks. An empty list counts as "no plan" for review gating.
    pub assignments: Vec<InspectionAssignment>,
    /// Actors ineligible to review under high security.
    pub participants: BTreeSet<ActorId>,
}

impl InspectionPlan {
    /// Whether the plan has at least one assignment.
    pub fn has_assignments(&self) -> bool {
        !self.assignments.is_empty()
    }

    /// Whether any assignment is still waiting for a reviewer.
    pub fn is_open(&self) -> bool {
        self.assignments.iter().any(InspectionAssignment::is_open)
    }

    /// Whether every assignment has been completed.
    pub fn is_complete(&self) -> bool {
        self.has_assignments() && !self.is_open()
    }

    /// Whether the actor took part in producing the inspected work.
    pub fn is_participant(&self, actor: &ActorId) -> bool {
        self.participants.contains(actor)
    }

    /// Clear every completion so the plan runs again from the start.
    pub fn reopen(&mut self) {
        for assignment in &mut self.assignments {
            assignment.completed_by = None;
        }
    }
}

// ─── Attachments & Audit ─────────────────────────────────────────────

/// A document attached to the latest revision of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name as uploaded.
    pub name: String,
    /// Opaque reference into the document store.
    pub reference: String,
}

/// Who performed a lifecycle step.
///
/// For delegated reviews, `actor` is the reviewer of record and `delegate`
/// the privileged actor who acted on their behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// The actor the step is recorded against.
    pub actor: ActorId,
    /// The actor who performed it on `actor`'s behalf, if any.
    pub delegate: Option<ActorId>,
}

impl Attribution {
    /// A step performed by the actor themselves.
    pub fn by(actor: ActorId) -> Self {
        Self {
            actor,
            delegate: None,
        }
    }
}

/// Record of a single approval-state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransitionRecord {
    /// State before the transition.
    pub from_state: ApprovalState,
    /// State after the transition.
    pub to_state: ApprovalState,
    /// The action that caused it.
    pub action: Action,
    /// Who performed it.
    pub by: Attribution,
    /// When it happened.
    pub timestamp: Timestamp,
    /// Free-text reason, when one was given.
    pub reason: Option<String>,
}

// ─── Record ──────────────────────────────────────────────────────────

/// One version of a regulated business record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Natural key and version.
    pub key: RecordKey,
    /// Schema type name, used for capability lookups.
    pub record_type: String,
    state: ApprovalState,
    active: bool,
    active_end: Option<Timestamp>,
    /// Future start date; authorising before it holds the record `Pending`.
    pub effective_from: Option<Timestamp>,
    /// Optional review plan.
    pub inspection_plan: Option<InspectionPlan>,
    /// Removal flag toggled by Remove/Restore.
    pub removed: bool,
    /// Dependent records that removal cascades to.
    pub children: Vec<RecordKey>,
    /// Business payload.
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Latest attachments, carried forward to new versions on request.
    pub attachments: Vec<Attachment>,
    /// Who last submitted this version.
    pub submitted_by: Option<ActorId>,
    /// Who last decided the review.
    pub reviewed_by: Option<Attribution>,
    /// Store row version; bumped on every commit.
    pub revision: u64,
    /// True until the record is first committed.
    #[serde(skip)]
    pub is_new: bool,
    history: Vec<StateTransitionRecord>,
}

impl Record {
    /// A new, uncommitted draft.
    pub fn draft(key: RecordKey, record_type: impl Into<String>) -> Self {
        Self {
            key,
            record_type: record_type.into(),
            state: ApprovalState::Draft,
            active: false,
            active_end: None,
            effective_from: None,
            inspection_plan: None,
            removed: false,
            children: Vec::new(),
            fields: BTreeMap::new(),
            attachments: Vec::new(),
            submitted_by: None,
            reviewed_by: None,
            revision: 0,
            is_new: true,
            history: Vec::new(),
        }
    }

    /// Reconstruct a record loaded from an existing store, e.g. during a
    /// migration import.
    ///
    /// # Errors
    ///
    /// Returns `QrlError::Integrity` if `active` is set on a state that may
    /// not be active.
    pub fn imported(
        key: RecordKey,
        record_type: impl Into<String>,
        state: ApprovalState,
        active: bool,
    ) -> Result<Self, QrlError> {
        if active && !state.may_be_active() {
            return Err(QrlError::Integrity(format!(
                "record {key} cannot be active in state {state}"
            )));
        }
        let mut record = Self::draft(key, record_type);
        record.state = state;
        record.active = active;
        Ok(record)
    }

    /// Attach an inspection plan.
    pub fn with_plan(mut self, plan: InspectionPlan) -> Self {
        self.inspection_plan = Some(plan);
        self
    }

    /// Set a future effective start date.
    pub fn with_effective_from(mut self, at: Timestamp) -> Self {
        self.effective_from = Some(at);
        self
    }

    /// Set a business field.
    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Current approval state.
    pub fn state(&self) -> ApprovalState {
        self.state
    }

    /// Whether this version is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When this version stopped being active, if it was superseded.
    pub fn active_end(&self) -> Option<Timestamp> {
        self.active_end
    }

    /// The state-change audit trail.
    pub fn history(&self) -> &[StateTransitionRecord] {
        &self.history
    }

    /// Whether an inspection plan with at least one open assignment exists.
    pub fn has_open_plan(&self) -> bool {
        self.inspection_plan
            .as_ref()
            .is_some_and(InspectionPlan::is_open)
    }

    /// Whether a plan with at least one assignment exists.
    pub fn has_assigned_plan(&self) -> bool {
        self.inspection_plan
            .as_ref()
            .is_some_and(InspectionPlan::has_assignments)
    }

    /// Whether the effective start date lies after `now`.
    pub fn starts_after(&self, now: Timestamp) -> bool {
        self.effective_from.is_some_and(|at| at > now)
    }

    /// Move to a new approval state and append an audit entry.
    ///
    /// # Errors
    ///
    /// Returns `QrlError::Integrity` if the record is active and the target
    /// state may not be active.
    pub fn transition(
        &mut self,
        to: ApprovalState,
        action: Action,
        by: Attribution,
        reason: Option<String>,
    ) -> Result<(), QrlError> {
        if self.active && !to.may_be_active() {
            return Err(QrlError::Integrity(format!(
                "active record {} cannot move to {to}",
                self.key
            )));
        }
        self.history.push(StateTransitionRecord {
            from_state: self.state,
            to_state: to,
            action,
            by,
            timestamp: Timestamp::now(),
            reason,
        });
        self.state = to;
        Ok(())
    }

    /// Return to the draft baseline before a (re)submission: clears the
    /// previous review decision and reopens every plan assignment.
    pub fn reset_to_draft(&mut self, action: Action, by: Attribution) -> Result<(), QrlError> {
        if self.state != ApprovalState::Draft {
            self.transition(ApprovalState::Draft, action, by, Some("reset for submission".into()))?;
        }
        self.reviewed_by = None;
        if let Some(plan) = self.inspection_plan.as_mut() {
            plan.reopen();
        }
        Ok(())
    }

    /// Build the next version of this record as a new draft.
    ///
    /// The inspection plan is copied with its completions cleared.
    /// Attachments are carried forward only when `carry_attachments` is set.
    pub fn next_version(&self, version: u32, carry_attachments: bool) -> Record {
        let mut next = Record::draft(self.key.with_version(version), self.record_type.clone());
        next.fields = self.fields.clone();
        next.children = self.children.clone();
        next.inspection_plan = self.inspection_plan.clone();
        if let Some(plan) = next.inspection_plan.as_mut() {
            plan.reopen();
        }
        if carry_attachments {
            next.attachments = self.attachments.clone();
        }
        next
    }

    /// Build version 1 of a new natural key from this record's content.
    pub fn copy_as(&self, natural_key: NaturalKey) -> Record {
        let mut copy = self.next_version(1, true);
        copy.key = RecordKey::first(natural_key);
        copy.children.clear();
        copy
    }

    /// Set or clear the active flag. Only [`crate::succession`] calls this.
    pub(crate) fn set_active(&mut self, active: bool, at: Timestamp) -> Result<(), QrlError> {
        if active && !self.state.may_be_active() {
            return Err(QrlError::Integrity(format!(
                "record {} cannot be activated in state {}",
                self.key, self.state
            )));
        }
        if self.active && !active {
            self.active_end = Some(at);
        }
        if active {
            self.active_end = None;
        }
        self.active = active;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
