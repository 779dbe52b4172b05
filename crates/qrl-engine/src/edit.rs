//! # Edit Sessions
//!
//! An [`EditSession`] is an open editing dialog. It holds the record's
//! [`LockMode::Exclusive`] lock across calls, so other sessions are denied
//! (and offered Display) while it is open.
//!
//! Each [`EditSession::save`] commits immediately through the Modify
//! pipeline. [`EditSession::submit`] submits through the held lock and
//! closes the session. Dropping the session releases the lock.

use qrl_core::RecordKey;
use qrl_store::{LockGuard, LockMode};

use crate::engine::TransitionEngine;
use crate::error::TransitionError;
use crate::request::{ActorContext, Confirmations, RecordEdit, TransitionResult};

/// An open edit holding the record's exclusive lock.
pub struct EditSession<'e> {
    engine: &'e TransitionEngine,
    guard: Option<LockGuard>,
    key: RecordKey,
    ctx: ActorContext,
}

impl std::fmt::Debug for EditSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("record", &self.key)
            .field("session", &self.ctx.session)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<'e> EditSession<'e> {
    pub(crate) fn new(
        engine: &'e TransitionEngine,
        guard: LockGuard,
        key: RecordKey,
        ctx: ActorContext,
    ) -> Self {
        debug_assert_eq!(guard.mode(), LockMode::Exclusive);
        Self {
            engine,
            guard: Some(guard),
            key,
            ctx,
        }
    }

    /// The record being edited.
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Whether the edit lock is still held.
    pub fn is_open(&self) -> bool {
        self.guard
            .as_ref()
            .is_some_and(|guard| self.engine.locks().is_held(guard.token()))
    }

    /// Commit an edit. The session stays open for further saves.
    pub fn save(&mut self, edit: &RecordEdit) -> Result<TransitionResult, TransitionError> {
        self.ensure_open()?;
        self.engine.apply_edit(&self.key, edit, &self.ctx)
    }

    /// Submit the record (resubmit, if it was rejected). The session closes
    /// unless the submission needs a confirmation.
    pub fn submit(
        &mut self,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        self.ensure_open()?;
        let result = self.engine.submit_held(&self.key, &self.ctx, confirmations);
        if !matches!(result, Ok(TransitionResult::ConfirmationRequired(_))) {
            self.close();
        }
        result
    }

    /// Close the session, releasing the lock.
    pub fn close(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.release();
            tracing::info!(record = %self.key, "edit closed");
        }
    }

    fn ensure_open(&mut self) -> Result<(), TransitionError> {
        if self.is_open() {
            return Ok(());
        }
        self.guard = None;
        Err(TransitionError::EditClosed(self.key.clone()))
    }
}
