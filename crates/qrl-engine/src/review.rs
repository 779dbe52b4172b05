//! # Review Sessions
//!
//! A [`ReviewSession`] is an open review dialog. It holds the record's
//! [`LockMode::ExclusiveReviewHold`] lock and a working copy the reviewer
//! may scribble on.
//!
//! - [`ReviewSession::decide`] commits the decision only: state, reviewer
//!   and assignment completion, applied to the record as it was when the
//!   review opened. Working-copy edits are never written.
//! - [`ReviewSession::abandon`], or dropping the session, releases the hold
//!   and discards everything.
//!
//! The hold is released after every decision, committed or failed. The one
//! exception is a decision that needs a confirmation: the hold stays so the
//! reviewer can answer and decide again.

use qrl_store::{LockGuard, LockMode};
use qrl_state::{Record, ResolvedReviewer};

use crate::engine::TransitionEngine;
use crate::error::TransitionError;
use crate::request::{ActorContext, Confirmations, TransitionResult};

/// A reviewer's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Accept; completes the reviewer's assignment.
    Approve,
    /// Decline and return the record for correction.
    Reject {
        /// Why it was declined.
        reason: Option<String>,
    },
}

/// An open review holding the record's review lock.
pub struct ReviewSession<'e> {
    engine: &'e TransitionEngine,
    guard: Option<LockGuard>,
    original: Record,
    working: Record,
    reviewer: ResolvedReviewer,
    ctx: ActorContext,
}

impl std::fmt::Debug for ReviewSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewSession")
            .field("record", &self.original.key)
            .field("reviewer", &self.reviewer)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<'e> ReviewSession<'e> {
    pub(crate) fn new(
        engine: &'e TransitionEngine,
        guard: LockGuard,
        record: Record,
        reviewer: ResolvedReviewer,
        ctx: ActorContext,
    ) -> Self {
        debug_assert_eq!(guard.mode(), LockMode::ExclusiveReviewHold);
        Self {
            engine,
            guard: Some(guard),
            working: record.clone(),
            original: record,
            reviewer,
            ctx,
        }
    }

    /// The working copy shown to the reviewer.
    pub fn record(&self) -> &Record {
        &self.working
    }

    /// Mutable working copy. Edits here are discarded.
    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.working
    }

    /// Who the decision will be recorded against.
    pub fn reviewer(&self) -> &ResolvedReviewer {
        &self.reviewer
    }

    /// Whether the review lock is still held.
    pub fn is_open(&self) -> bool {
        self.guard
            .as_ref()
            .is_some_and(|guard| self.engine.locks().is_held(guard.token()))
    }

    /// Commit a decision.
    pub fn decide(
        &mut self,
        decision: ReviewDecision,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        if !self.is_open() {
            self.guard = None;
            return Err(TransitionError::ReviewClosed(self.original.key.clone()));
        }

        let result = self.engine.apply_decision(
            &self.original,
            &self.reviewer,
            &decision,
            &self.ctx,
            confirmations,
        );
        if !matches!(result, Ok(TransitionResult::ConfirmationRequired(_))) {
            self.close();
        }
        result
    }

    /// Close without a decision, discarding the working copy.
    pub fn abandon(mut self) {
        tracing::info!(record = %self.original.key, "review abandoned");
        self.close();
    }

    fn close(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.release();
        }
    }
}
