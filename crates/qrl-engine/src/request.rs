//! # Requests and Results
//!
//! The UI layer builds an [`ActionRequest`] per button click and calls
//! [`TransitionEngine::request_action`](crate::TransitionEngine::request_action).
//!
//! ## Confirmations
//!
//! Some actions need a yes/no answer from the user (deactivate the active
//! predecessor, carry attachments forward, continue read-only). The engine
//! never waits for one: it returns [`TransitionResult::ConfirmationRequired`]
//! with the open prompts, holding nothing. The UI asks, records the answers
//! on the request with [`ActionRequest::confirm`], and sends it again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qrl_core::{ActorId, NaturalKey, RecordKey, SessionId, Timestamp};
use qrl_state::{Action, Attachment, InspectionPlan, Record, SuccessionEffect};

/// Who is acting, and from which session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    /// The authenticated actor.
    pub actor: ActorId,
    /// The editing session; locks belong to it.
    pub session: SessionId,
}

impl ActorContext {
    /// A context with a fresh session.
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            session: SessionId::new(),
        }
    }
}

/// Field edits applied by Modify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordEdit {
    /// Fields to set or overwrite.
    pub set_fields: BTreeMap<String, serde_json::Value>,
    /// Fields to remove.
    pub clear_fields: Vec<String>,
    /// Replacement inspection plan.
    pub inspection_plan: Option<InspectionPlan>,
    /// Replacement effective start date.
    pub effective_from: Option<Timestamp>,
    /// Replacement attachment list.
    pub attachments: Option<Vec<Attachment>>,
}

impl RecordEdit {
    /// Set one field.
    pub fn field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.set_fields.insert(name.into(), value);
        self
    }

    /// Replace the inspection plan.
    pub fn plan(mut self, plan: InspectionPlan) -> Self {
        self.inspection_plan = Some(plan);
        self
    }

    /// Replace the effective start date.
    pub fn effective_from(mut self, at: Timestamp) -> Self {
        self.effective_from = Some(at);
        self
    }

    /// Replace the attachments.
    pub fn attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    pub(crate) fn apply_to(&self, record: &mut Record) {
        for name in &self.clear_fields {
            record.fields.remove(name);
        }
        for (name, value) in &self.set_fields {
            record.fields.insert(name.clone(), value.clone());
        }
        if let Some(plan) = &self.inspection_plan {
            record.inspection_plan = Some(plan.clone());
        }
        if let Some(at) = self.effective_from {
            record.effective_from = Some(at);
        }
        if let Some(attachments) = &self.attachments {
            record.attachments = attachments.clone();
        }
    }
}

/// The action-specific part of a request.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Create version 1 of a new natural key.
    Add(Box<Record>),
    /// Edit fields.
    Modify {
        /// Target record.
        key: RecordKey,
        /// The edits.
        edit: RecordEdit,
    },
    /// Read-only view.
    Display(RecordKey),
    /// Start a new group from an existing record.
    Copy {
        /// Record to copy from.
        source: RecordKey,
        /// Natural key of the new group.
        natural_key: NaturalKey,
    },
    /// Start the next version of a group.
    NewVersion(RecordKey),
    /// Flag the record and its children removed.
    Remove(RecordKey),
    /// Clear the removal flag on the record and its children.
    Restore(RecordKey),
    /// Send a draft for review.
    Submit(RecordKey),
    /// Send a rejected record back for review.
    Resubmit(RecordKey),
    /// Accept an inspection, optionally on another actor's behalf.
    Approve {
        /// Target record.
        key: RecordKey,
        /// Reviewer to act for.
        on_behalf_of: Option<ActorId>,
    },
    /// Decline an inspection.
    Reject {
        /// Target record.
        key: RecordKey,
        /// Reviewer to act for.
        on_behalf_of: Option<ActorId>,
        /// Why it was declined.
        reason: Option<String>,
    },
    /// Withdraw a rejected record.
    Cancel {
        /// Target record.
        key: RecordKey,
        /// Why it was withdrawn.
        reason: Option<String>,
    },
}

impl Operation {
    /// The lifecycle action this operation performs.
    pub fn action(&self) -> Action {
        match self {
            Self::Add(_) => Action::Add,
            Self::Modify { .. } => Action::Modify,
            Self::Display(_) => Action::Display,
            Self::Copy { .. } => Action::Copy,
            Self::NewVersion(_) => Action::NewVersion,
            Self::Remove(_) => Action::Remove,
            Self::Restore(_) => Action::Restore,
            Self::Submit(_) => Action::Submit,
            Self::Resubmit(_) => Action::Resubmit,
            Self::Approve { .. } => Action::Approve,
            Self::Reject { .. } => Action::Reject,
            Self::Cancel { .. } => Action::Cancel,
        }
    }

    /// The record the operation targets.
    pub fn key(&self) -> &RecordKey {
        match self {
            Self::Add(record) => &record.key,
            Self::Copy { source, .. } => source,
            Self::Modify { key, .. }
            | Self::Approve { key, .. }
            | Self::Reject { key, .. }
            | Self::Cancel { key, .. } => key,
            Self::Display(key)
            | Self::NewVersion(key)
            | Self::Remove(key)
            | Self::Restore(key)
            | Self::Submit(key)
            | Self::Resubmit(key) => key,
        }
    }
}

/// A question the user must answer before the action can proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfirmationKind {
    /// Deactivate the group's active version.
    DeactivatePredecessor,
    /// Copy attachments into the new version.
    CarryAttachments,
    /// Continue read-only when editing is refused.
    DisplayFallback,
}

/// An open confirmation, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Which answer the engine needs.
    pub kind: ConfirmationKind,
    /// The question text.
    pub message: String,
}

/// Answers to previously returned prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Confirmations(BTreeMap<ConfirmationKind, bool>);

impl Confirmations {
    /// The answer for a prompt, if the user gave one.
    pub fn get(&self, kind: ConfirmationKind) -> Option<bool> {
        self.0.get(&kind).copied()
    }

    /// Record an answer.
    pub fn set(&mut self, kind: ConfirmationKind, answer: bool) {
        self.0.insert(kind, answer);
    }

    /// Whether the user accepted the prompt.
    pub fn accepted(&self, kind: ConfirmationKind) -> bool {
        self.get(kind) == Some(true)
    }
}

/// One user action.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// What to do.
    pub operation: Operation,
    /// Answers to earlier prompts.
    pub confirmations: Confirmations,
}

impl ActionRequest {
    /// A request with no answers yet.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            confirmations: Confirmations::default(),
        }
    }

    /// Record an answer and return the request for re-issue.
    pub fn confirm(mut self, kind: ConfirmationKind, answer: bool) -> Self {
        self.confirmations.set(kind, answer);
        self
    }

    /// Add a new version-1 draft.
    pub fn add(record: Record) -> Self {
        Self::new(Operation::Add(Box::new(record)))
    }

    /// Edit a record in place.
    pub fn modify(key: RecordKey, edit: RecordEdit) -> Self {
        Self::new(Operation::Modify { key, edit })
    }

    /// Open a record read-only.
    pub fn display(key: RecordKey) -> Self {
        Self::new(Operation::Display(key))
    }

    /// Copy a record into a new version group.
    pub fn copy(source: RecordKey, natural_key: NaturalKey) -> Self {
        Self::new(Operation::Copy {
            source,
            natural_key,
        })
    }

    /// Draft the next version of a record's group.
    pub fn new_version(key: RecordKey) -> Self {
        Self::new(Operation::NewVersion(key))
    }

    /// Mark a record and its children removed.
    pub fn remove(key: RecordKey) -> Self {
        Self::new(Operation::Remove(key))
    }

    /// Undo a removal, cascading to children.
    pub fn restore(key: RecordKey) -> Self {
        Self::new(Operation::Restore(key))
    }

    /// Submit a draft for review or authorisation.
    pub fn submit(key: RecordKey) -> Self {
        Self::new(Operation::Submit(key))
    }

    /// Resubmit a rejected record.
    pub fn resubmit(key: RecordKey) -> Self {
        Self::new(Operation::Resubmit(key))
    }

    /// Approve as the requesting actor.
    pub fn approve(key: RecordKey) -> Self {
        Self::new(Operation::Approve {
            key,
            on_behalf_of: None,
        })
    }

    /// Approve on behalf of an assigned reviewer.
    pub fn approve_on_behalf(key: RecordKey, reviewer: ActorId) -> Self {
        Self::new(Operation::Approve {
            key,
            on_behalf_of: Some(reviewer),
        })
    }

    /// Reject a record under inspection.
    pub fn reject(key: RecordKey, reason: Option<String>) -> Self {
        Self::new(Operation::Reject {
            key,
            on_behalf_of: None,
            reason,
        })
    }

    /// Withdraw a rejected record for good.
    pub fn cancel(key: RecordKey, reason: Option<String>) -> Self {
        Self::new(Operation::Cancel { key, reason })
    }
}

/// Records written by a committed action.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// The target record as stored.
    pub record: Record,
    /// Other records written in the same transaction (predecessor,
    /// cascaded children).
    pub cascaded: Vec<Record>,
    /// Active-flag changes made by succession.
    pub effects: Vec<SuccessionEffect>,
}

impl Committed {
    pub(crate) fn from_written(
        mut written: Vec<Record>,
        effects: Vec<SuccessionEffect>,
    ) -> Option<Self> {
        if written.is_empty() {
            return None;
        }
        let record = written.remove(0);
        Some(Self {
            record,
            cascaded: written,
            effects,
        })
    }
}

/// Outcome of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// The action committed.
    Committed(Box<Committed>),
    /// The record, opened read-only. No lock is held.
    ReadOnly(Box<Record>),
    /// The user must answer these prompts; nothing was changed or held.
    ConfirmationRequired(Vec<Prompt>),
}

impl TransitionResult {
    /// The committed target record, if the action committed.
    pub fn committed(&self) -> Option<&Record> {
        match self {
            Self::Committed(c) => Some(&c.record),
            _ => None,
        }
    }

    /// The prompts to ask, if any.
    pub fn prompts(&self) -> &[Prompt] {
        match self {
            Self::ConfirmationRequired(prompts) => prompts,
            _ => &[],
        }
    }
}
