//! # Transition Engine
//!
//! The single entry point the UI calls for lifecycle actions. Every request
//! runs the same pipeline, strictly in order:
//!
//! ```text
//! read ─▶ legal? ─▶ lock ─▶ re-read ─▶ legal? ─▶ mutate ─▶ succession ─▶ commit
//! ```
//!
//! ## Atomicity
//!
//! One request is one store transaction. Locks are held by [`LockGuard`]s
//! that live until the commit returns, so every exit path (success, refusal,
//! store failure, panic) releases them. Nothing is written when any step
//! fails.
//!
//! ## Succession
//!
//! Authorising actions (Submit under low security, the final Approve,
//! activation of a due `Pending` record) consult the
//! [`VersionSuccessionManager`]. Under single-active-version the engine first
//! try-locks every other member of the version group, so two sessions can
//! never activate different members at once. When succession needs to
//! deactivate the active member, the engine asks for confirmation and stages
//! that member in the same transaction.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use qrl_core::{ActorId, PolicyConfig, QrlError, RecordKey, SecurityMode, Timestamp};
use qrl_state::{
    Action, ActionSet, ApprovalState, Attribution, PrivilegeChecker, Record, RecordFacts, Refusal,
    RefusalKind, ResolvedReviewer, ReviewDelegate, ReviewRefusal, ReviewerChoice, StateEvaluator,
    SuccessionEffect, SuccessionPlan, VersionSuccessionManager,
};
use qrl_store::{
    EntityStore, LockCoordinator, LockGuard, LockMode, RecordQuery, SchemaCatalog, StoreError,
    Transaction,
};

use crate::edit::EditSession;
use crate::error::TransitionError;
use crate::request::{
    ActionRequest, ActorContext, Committed, ConfirmationKind, Confirmations, Operation, Prompt,
    RecordEdit, TransitionResult,
};
use crate::review::{ReviewDecision, ReviewSession};
use crate::router::{is_submission_target, SubmissionRouter};

/// Outcome of preparing an authorisation.
enum Staged {
    Ready {
        txn: Transaction,
        effects: Vec<SuccessionEffect>,
        guards: Vec<LockGuard>,
    },
    NeedsConfirmation(Vec<Prompt>),
}

/// Orchestrates lifecycle actions over an entity store.
pub struct TransitionEngine {
    policy: PolicyConfig,
    store: Arc<dyn EntityStore>,
    schemas: Arc<dyn SchemaCatalog>,
    locks: LockCoordinator,
    evaluator: StateEvaluator,
    reviews: ReviewDelegate,
    succession: VersionSuccessionManager,
    router: Option<Arc<dyn SubmissionRouter>>,
}

impl std::fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("policy", &self.policy)
            .field("locks", &self.locks)
            .field("router", &self.router.is_some())
            .finish_non_exhaustive()
    }
}

impl TransitionEngine {
    /// Build an engine. The policy is copied into every component.
    pub fn new(
        policy: PolicyConfig,
        store: Arc<dyn EntityStore>,
        schemas: Arc<dyn SchemaCatalog>,
        privileges: Arc<dyn PrivilegeChecker>,
    ) -> Self {
        Self {
            locks: LockCoordinator::new(Arc::clone(&store)),
            evaluator: StateEvaluator::new(policy),
            reviews: ReviewDelegate::new(policy, privileges),
            succession: VersionSuccessionManager::new(policy),
            policy,
            store,
            schemas,
            router: None,
        }
    }

    /// Delegate submission routing to an external decision procedure.
    pub fn with_router(mut self, router: Arc<dyn SubmissionRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// The active policy.
    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// The lock coordinator, shared with any other engine over the same
    /// store.
    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    // ─── Queries ─────────────────────────────────────────────────────

    /// Actions the actor may take on the record right now. Drives which
    /// buttons are enabled.
    pub fn legal_actions(
        &self,
        key: &RecordKey,
        actor: &ActorId,
    ) -> Result<ActionSet, TransitionError> {
        let record = self.load(key)?;
        Ok(self.evaluator.legal_actions(&record, &self.facts(&record, actor)))
    }

    /// Options for the "choose reviewer" dialog.
    pub fn resolve_review_options(
        &self,
        key: &RecordKey,
        actor: &ActorId,
    ) -> Result<Vec<ReviewerChoice>, TransitionError> {
        let record = self.load(key)?;
        Ok(self.reviews.resolve_review_options(&record, actor))
    }

    // ─── Entry Point ─────────────────────────────────────────────────

    /// Perform one user action.
    pub fn request_action(
        &self,
        request: &ActionRequest,
        ctx: &ActorContext,
    ) -> Result<TransitionResult, TransitionError> {
        let action = request.operation.action();
        let span = tracing::info_span!(
            "request_action",
            %action,
            record = %request.operation.key(),
            actor = %ctx.actor,
            session = %ctx.session,
        );
        let _entered = span.enter();

        let confirmations = &request.confirmations;
        let result = match &request.operation {
            Operation::Add(record) => self.add((**record).clone(), ctx, confirmations),
            Operation::Modify { key, edit } => self.modify(key, edit, ctx, confirmations),
            Operation::Display(key) => self.display(key),
            Operation::Copy {
                source,
                natural_key,
            } => self.copy(source, natural_key.clone(), ctx),
            Operation::NewVersion(key) => self.new_version(key, ctx, confirmations),
            Operation::Remove(key) => self.set_removed(key, true, ctx),
            Operation::Restore(key) => self.set_removed(key, false, ctx),
            Operation::Submit(key) => self.submit(key, Action::Submit, ctx, confirmations),
            Operation::Resubmit(key) => self.submit(key, Action::Resubmit, ctx, confirmations),
            Operation::Approve { key, on_behalf_of } => self
                .begin_review(key, ctx, on_behalf_of.as_ref())
                .and_then(|mut session| session.decide(ReviewDecision::Approve, confirmations)),
            Operation::Reject {
                key,
                on_behalf_of,
                reason,
            } => self
                .begin_review(key, ctx, on_behalf_of.as_ref())
                .and_then(|mut session| {
                    session.decide(
                        ReviewDecision::Reject {
                            reason: reason.clone(),
                        },
                        confirmations,
                    )
                }),
            Operation::Cancel { key, reason } => self.cancel(key, reason.clone(), ctx),
        };

        if let Err(err) = &result {
            tracing::warn!(class = ?err.class(), error = %err, "action refused");
        }
        result
    }

    /// Open a review of a record under inspection, holding its review lock.
    ///
    /// The reviewer is resolved before the lock is taken and again after,
    /// against the re-read record.
    pub fn begin_review(
        &self,
        key: &RecordKey,
        ctx: &ActorContext,
        on_behalf_of: Option<&ActorId>,
    ) -> Result<ReviewSession<'_>, TransitionError> {
        let record = self.load(key)?;
        self.resolve_reviewer(&record, ctx, on_behalf_of)?;

        let guard = self
            .locks
            .try_lock(key, ctx.session, LockMode::ExclusiveReviewHold)?;
        let record = self.load(key)?;
        let reviewer = self.resolve_reviewer(&record, ctx, on_behalf_of)?;
        tracing::info!(record = %key, reviewer = %reviewer.identity.actor, "review opened");
        Ok(ReviewSession::new(self, guard, record, reviewer, ctx.clone()))
    }

    /// Open a record for editing, holding its exclusive lock until the
    /// session closes.
    pub fn begin_edit(
        &self,
        key: &RecordKey,
        ctx: &ActorContext,
    ) -> Result<EditSession<'_>, TransitionError> {
        let (guard, _) = self.secure(key, Action::Modify, ctx)?;
        tracing::info!(record = %key, session = %ctx.session, "edit opened");
        Ok(EditSession::new(self, guard, key.clone(), ctx.clone()))
    }

    /// React to the external "effective date reached" trigger: promote a due
    /// `Pending` record, deactivating the group's active member.
    ///
    /// Deactivation was confirmed when the record was approved, so no prompt
    /// is raised here.
    pub fn activate_due(
        &self,
        key: &RecordKey,
        ctx: &ActorContext,
        now: Timestamp,
    ) -> Result<TransitionResult, TransitionError> {
        let guard = self.locks.try_lock(key, ctx.session, LockMode::Exclusive)?;
        let record = self.load(key)?;
        if record.state() != ApprovalState::Pending {
            return Err(TransitionError::IllegalTransition(Refusal {
                action: Action::Approve,
                reason: format!("record {key} is {}, not pending activation", record.state()),
                display_fallback: false,
            }));
        }
        if record.starts_after(now) {
            return Err(TransitionError::IllegalTransition(Refusal {
                action: Action::Approve,
                reason: format!(
                    "record {key} is not due until {}",
                    record
                        .effective_from
                        .map_or_else(String::new, |at| at.to_string())
                ),
                display_fallback: false,
            }));
        }

        let mut confirmations = Confirmations::default();
        confirmations.set(ConfirmationKind::DeactivatePredecessor, true);
        let by = Attribution::by(ctx.actor.clone());
        let result =
            self.finish_authorisation(record, Action::Approve, by, ctx, &confirmations, now);
        drop(guard);
        result
    }

    // ─── Actions ─────────────────────────────────────────────────────

    fn add(
        &self,
        mut record: Record,
        ctx: &ActorContext,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        if record.key.version != 1 || record.state() != ApprovalState::Draft || record.is_active() {
            return Err(QrlError::Validation(format!(
                "new record {} must be an inactive draft at version 1",
                record.key
            ))
            .into());
        }
        record.is_new = true;
        record.revision = 0;
        self.ensure_new_group(&record.key)?;

        let guard = self
            .locks
            .try_lock(&record.key, ctx.session, LockMode::Exclusive)?;
        let result = if self.policy.submit_on_add {
            self.submit_record(record, Action::Submit, ctx, confirmations)
        } else {
            let mut txn = Transaction::new();
            txn.stage(record);
            self.commit(txn, Vec::new(), Action::Add, ctx)
        };
        drop(guard);
        result
    }

    fn modify(
        &self,
        key: &RecordKey,
        edit: &RecordEdit,
        ctx: &ActorContext,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        let accepts_display = confirmations.accepted(ConfirmationKind::DisplayFallback);
        let record = self.load(key)?;

        if let Err(refusal) = self
            .evaluator
            .evaluate_modify(&record, &self.facts(&record, &ctx.actor))
        {
            if accepts_display && refusal.display_fallback {
                tracing::info!(record = %key, reason = %refusal.reason, "opened read-only");
                return Ok(TransitionResult::ReadOnly(Box::new(record)));
            }
            return Err(TransitionError::IllegalTransition(refusal));
        }

        let guard = match self.locks.try_lock(key, ctx.session, LockMode::Exclusive) {
            Ok(guard) => guard,
            Err(denied) if accepts_display => {
                tracing::info!(record = %key, holder = %denied.holder, "opened read-only");
                return Ok(TransitionResult::ReadOnly(Box::new(record)));
            }
            Err(denied) => return Err(denied.into()),
        };

        let result = self.apply_edit(key, edit, ctx);
        drop(guard);
        result
    }

    fn display(&self, key: &RecordKey) -> Result<TransitionResult, TransitionError> {
        let record = self.load(key)?;
        if !self.evaluator.can_display(&record) {
            return Err(TransitionError::IllegalTransition(Refusal {
                action: Action::Display,
                reason: format!("record {key} cannot be displayed"),
                display_fallback: false,
            }));
        }
        Ok(TransitionResult::ReadOnly(Box::new(record)))
    }

    fn copy(
        &self,
        source: &RecordKey,
        natural_key: qrl_core::NaturalKey,
        ctx: &ActorContext,
    ) -> Result<TransitionResult, TransitionError> {
        let copy = self.load(source)?.copy_as(natural_key);
        self.ensure_new_group(&copy.key)?;
        let guard = self
            .locks
            .try_lock(&copy.key, ctx.session, LockMode::Exclusive)?;
        let mut txn = Transaction::new();
        txn.stage(copy);
        let result = self.commit(txn, Vec::new(), Action::Copy, ctx);
        drop(guard);
        result
    }

    fn new_version(
        &self,
        key: &RecordKey,
        ctx: &ActorContext,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        let source = self.load(key)?;
        self.check(Action::NewVersion, &source, &ctx.actor)?;

        let carry = if source.attachments.is_empty() {
            false
        } else {
            match confirmations.get(ConfirmationKind::CarryAttachments) {
                Some(answer) => answer,
                None => {
                    return Ok(TransitionResult::ConfirmationRequired(vec![Prompt {
                        kind: ConfirmationKind::CarryAttachments,
                        message: format!(
                            "carry {} attachment(s) forward to the new version?",
                            source.attachments.len()
                        ),
                    }]));
                }
            }
        };

        let query = RecordQuery::group(key.natural_key.clone())
            .latest(self.schemas.version_field(&source.record_type));
        let highest = self
            .store
            .select(&query)?
            .iter()
            .map(|r| r.key.version)
            .max()
            .unwrap_or(key.version);
        let next = highest.checked_add(1).ok_or_else(|| {
            QrlError::Integrity(format!("version group {} is out of versions", key.natural_key))
        })?;

        let draft = source.next_version(next, carry);
        let guard = self
            .locks
            .try_lock(&draft.key, ctx.session, LockMode::Exclusive)?;
        let mut txn = Transaction::new();
        txn.stage(draft);
        let result = self.commit(txn, Vec::new(), Action::NewVersion, ctx);
        drop(guard);
        result
    }

    fn set_removed(
        &self,
        key: &RecordKey,
        removed: bool,
        ctx: &ActorContext,
    ) -> Result<TransitionResult, TransitionError> {
        let action = if removed { Action::Remove } else { Action::Restore };
        let record = self.load(key)?;
        self.require_removable(&record)?;
        self.check(action, &record, &ctx.actor)?;

        let keys = self.cascade_keys(&record)?;
        let guards = self
            .locks
            .try_lock_all(&keys, ctx.session, LockMode::Exclusive)?;

        let target = self.load(key)?;
        self.check(action, &target, &ctx.actor)?;
        let mut txn = Transaction::new();
        for key in &keys {
            let mut member = self.load(key)?;
            self.require_removable(&member)?;
            member.removed = removed;
            txn.stage(member);
        }
        let result = self.commit(txn, Vec::new(), action, ctx);
        drop(guards);
        result
    }

    fn submit(
        &self,
        key: &RecordKey,
        action: Action,
        ctx: &ActorContext,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        let (guard, record) = self.secure(key, action, ctx)?;
        let result = self.submit_record(record, action, ctx, confirmations);
        drop(guard);
        result
    }

    fn cancel(
        &self,
        key: &RecordKey,
        reason: Option<String>,
        ctx: &ActorContext,
    ) -> Result<TransitionResult, TransitionError> {
        let (guard, mut record) = self.secure(key, Action::Cancel, ctx)?;
        record.transition(
            ApprovalState::Cancelled,
            Action::Cancel,
            Attribution::by(ctx.actor.clone()),
            reason,
        )?;
        let mut txn = Transaction::new();
        txn.stage(record);
        let result = self.commit(txn, Vec::new(), Action::Cancel, ctx);
        drop(guard);
        result
    }

    // ─── Submission & Authorisation ──────────────────────────────────

    /// Reset to the draft baseline, route, and commit. The caller holds the
    /// record's lock until this returns.
    fn submit_record(
        &self,
        mut record: Record,
        action: Action,
        ctx: &ActorContext,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        let by = Attribution::by(ctx.actor.clone());
        record.reset_to_draft(action, by.clone())?;
        record.submitted_by = Some(ctx.actor.clone());

        match self.route(&record)? {
            ApprovalState::Inspection => {
                record.transition(ApprovalState::Inspection, action, by, None)?;
                let mut txn = Transaction::new();
                txn.stage(record);
                self.commit(txn, Vec::new(), action, ctx)
            }
            _ => {
                let now = Timestamp::now();
                self.finish_authorisation(record, action, by, ctx, confirmations, now)
            }
        }
    }

    fn route(&self, record: &Record) -> Result<ApprovalState, TransitionError> {
        if let Some(router) = &self.router {
            let state = router.route(record, &self.policy);
            if !is_submission_target(state) {
                return Err(TransitionError::SubmissionFailed {
                    key: record.key.clone(),
                    reason: format!("the decision procedure returned {state}"),
                });
            }
            return Ok(state);
        }

        if record.has_assigned_plan() {
            return Ok(ApprovalState::Inspection);
        }
        if self.policy.security_mode == SecurityMode::Low
            || self.schemas.is_review_exempt(&record.record_type)
        {
            return Ok(ApprovalState::Authorised);
        }
        Err(TransitionError::MissingPlan {
            key: record.key.clone(),
            reason: "high security requires an inspection plan with at least one assignment"
                .to_string(),
        })
    }

    /// Run succession for `record` and commit it with any predecessor.
    pub(crate) fn finish_authorisation(
        &self,
        record: Record,
        action: Action,
        by: Attribution,
        ctx: &ActorContext,
        confirmations: &Confirmations,
        now: Timestamp,
    ) -> Result<TransitionResult, TransitionError> {
        match self.authorise(record, action, by, ctx, confirmations, now)? {
            Staged::NeedsConfirmation(prompts) => {
                Ok(TransitionResult::ConfirmationRequired(prompts))
            }
            Staged::Ready {
                txn,
                effects,
                guards,
            } => {
                let result = self.commit(txn, effects, action, ctx);
                drop(guards);
                result
            }
        }
    }

    fn authorise(
        &self,
        mut record: Record,
        action: Action,
        by: Attribution,
        ctx: &ActorContext,
        confirmations: &Confirmations,
        now: Timestamp,
    ) -> Result<Staged, TransitionError> {
        // Every other member is held from here to the commit, so the active
        // member read below cannot change and no peer can activate another.
        let guards = self.lock_group(&record, ctx)?;
        let candidate = self.active_member(&record)?;
        let plan = self.succession.plan(&record, candidate.as_ref(), now)?;

        // A record held pending will supersede the active member when it
        // comes due, so the question is asked now rather than at activation.
        let asked = match &plan {
            SuccessionPlan::Supersede { predecessor } => plan
                .confirmation_prompt()
                .map(|message| (predecessor.clone(), message)),
            SuccessionPlan::HoldPending { effective_from } => candidate
                .as_ref()
                .filter(|c| c.is_active())
                .map(|c| {
                    let message = format!(
                        "deactivate predecessor version {} when version {} takes effect on {}?",
                        c.key.version, record.key.version, effective_from
                    );
                    (c.key.clone(), message)
                }),
            SuccessionPlan::Activate | SuccessionPlan::Concurrent => None,
        };
        if let Some((pred_key, message)) = asked {
            match confirmations.get(ConfirmationKind::DeactivatePredecessor) {
                None => {
                    return Ok(Staged::NeedsConfirmation(vec![Prompt {
                        kind: ConfirmationKind::DeactivatePredecessor,
                        message,
                    }]));
                }
                Some(false) => {
                    return Err(TransitionError::DeactivationDeclined {
                        key: record.key.clone(),
                        predecessor: pred_key,
                    });
                }
                Some(true) => {}
            }
        }

        let mut predecessor = match &plan {
            SuccessionPlan::Supersede { .. } => candidate,
            _ => None,
        };

        let effects = self.succession.apply(
            &plan,
            &mut record,
            predecessor.as_mut(),
            action,
            by,
            now,
        )?;
        let mut txn = Transaction::new();
        txn.stage(record);
        if let Some(pred) = predecessor {
            txn.stage(pred);
        }
        Ok(Staged::Ready {
            txn,
            effects,
            guards,
        })
    }

    /// Write an edit to a record whose lock the caller holds.
    pub(crate) fn apply_edit(
        &self,
        key: &RecordKey,
        edit: &RecordEdit,
        ctx: &ActorContext,
    ) -> Result<TransitionResult, TransitionError> {
        let mut record = self.load(key)?;
        self.check(Action::Modify, &record, &ctx.actor)?;
        edit.apply_to(&mut record);
        let mut txn = Transaction::new();
        txn.stage(record);
        self.commit(txn, Vec::new(), Action::Modify, ctx)
    }

    /// Submit (or resubmit, when rejected) a record whose lock the caller
    /// holds.
    pub(crate) fn submit_held(
        &self,
        key: &RecordKey,
        ctx: &ActorContext,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        let record = self.load(key)?;
        let action = match record.state() {
            ApprovalState::Rejected => Action::Resubmit,
            _ => Action::Submit,
        };
        self.check(action, &record, &ctx.actor)?;
        self.submit_record(record, action, ctx, confirmations)
    }

    /// Apply a review decision to the record as it was when the review
    /// opened. Called by [`ReviewSession::decide`] while the hold is live.
    pub(crate) fn apply_decision(
        &self,
        original: &Record,
        reviewer: &ResolvedReviewer,
        decision: &ReviewDecision,
        ctx: &ActorContext,
        confirmations: &Confirmations,
    ) -> Result<TransitionResult, TransitionError> {
        let mut record = original.clone();
        let by = reviewer.identity.clone();
        record.reviewed_by = Some(by.clone());

        match decision {
            ReviewDecision::Reject { reason } => {
                record.transition(ApprovalState::Rejected, Action::Reject, by, reason.clone())?;
                let mut txn = Transaction::new();
                txn.stage(record);
                self.commit(txn, Vec::new(), Action::Reject, ctx)
            }
            ReviewDecision::Approve => {
                if let (Some(idx), Some(plan)) =
                    (reviewer.assignment, record.inspection_plan.as_mut())
                {
                    if let Some(assignment) = plan.assignments.get_mut(idx) {
                        assignment.completed_by = Some(by.actor.clone());
                    }
                }
                if record.has_open_plan() {
                    tracing::info!(
                        record = %record.key,
                        reviewer = %by.actor,
                        "assignment completed"
                    );
                    let mut txn = Transaction::new();
                    txn.stage(record);
                    return self.commit(txn, Vec::new(), Action::Approve, ctx);
                }
                let now = Timestamp::now();
                self.finish_authorisation(record, Action::Approve, by, ctx, confirmations, now)
            }
        }
    }

    // ─── Helpers ─────────────────────────────────────────────────────

    fn load(&self, key: &RecordKey) -> Result<Record, TransitionError> {
        self.store
            .get(key)?
            .ok_or_else(|| TransitionError::NotFound(key.clone()))
    }

    fn facts(&self, record: &Record, actor: &ActorId) -> RecordFacts {
        RecordFacts {
            can_review: record.state() == ApprovalState::Inspection
                && self.reviews.can_review(record, actor).is_ok(),
            removable: self.schemas.has_removal_capability(&record.record_type),
        }
    }

    fn check(
        &self,
        action: Action,
        record: &Record,
        actor: &ActorId,
    ) -> Result<(), TransitionError> {
        self.evaluator
            .check(action, record, &self.facts(record, actor))
            .map_err(TransitionError::IllegalTransition)
    }

    /// Read, check, lock, then re-read and re-check: the record may have
    /// moved between the first read and the lock.
    fn secure(
        &self,
        key: &RecordKey,
        action: Action,
        ctx: &ActorContext,
    ) -> Result<(LockGuard, Record), TransitionError> {
        let record = self.load(key)?;
        self.check(action, &record, &ctx.actor)?;
        let guard = self.locks.try_lock(key, ctx.session, LockMode::Exclusive)?;
        let record = self.load(key)?;
        self.check(action, &record, &ctx.actor)?;
        Ok((guard, record))
    }

    fn resolve_reviewer(
        &self,
        record: &Record,
        ctx: &ActorContext,
        on_behalf_of: Option<&ActorId>,
    ) -> Result<ResolvedReviewer, TransitionError> {
        let resolved = self
            .reviews
            .resolve_reviewer(record, &ctx.actor, on_behalf_of)
            .map_err(|refusal| self.review_refusal(record, refusal))?;
        let facts = RecordFacts {
            can_review: true,
            removable: self.schemas.has_removal_capability(&record.record_type),
        };
        self.evaluator
            .check(Action::Approve, record, &facts)
            .map_err(TransitionError::IllegalTransition)?;
        Ok(resolved)
    }

    fn review_refusal(&self, record: &Record, refusal: ReviewRefusal) -> TransitionError {
        match refusal.kind {
            RefusalKind::NotUnderInspection => TransitionError::IllegalTransition(Refusal {
                action: Action::Approve,
                reason: refusal.reason,
                display_fallback: true,
            }),
            RefusalKind::MissingPlan => TransitionError::MissingPlan {
                key: record.key.clone(),
                reason: refusal.reason,
            },
            _ => TransitionError::ReviewerIneligible(refusal),
        }
    }

    fn require_removable(&self, record: &Record) -> Result<(), TransitionError> {
        if self.schemas.has_removal_capability(&record.record_type) {
            return Ok(());
        }
        Err(TransitionError::MissingCapability {
            record_type: record.record_type.clone(),
            capability: "removal",
        })
    }

    /// The record and every transitive child, target first.
    fn cascade_keys(&self, record: &Record) -> Result<Vec<RecordKey>, TransitionError> {
        let mut seen = BTreeSet::from([record.key.clone()]);
        let mut order = vec![record.key.clone()];
        let mut queue: VecDeque<RecordKey> = record.children.iter().cloned().collect();
        while let Some(key) = queue.pop_front() {
            if !seen.insert(key.clone()) {
                continue;
            }
            let child = self.load(&key)?;
            queue.extend(child.children.iter().cloned());
            order.push(key);
        }
        Ok(order)
    }

    /// Lock every member of `record`'s group except `record` itself, which
    /// the caller already holds. Empty when several members may be active.
    ///
    /// A member drafted after the listing cannot be activated without the
    /// target's lock, so the listing does not need to be re-checked.
    fn lock_group(
        &self,
        record: &Record,
        ctx: &ActorContext,
    ) -> Result<Vec<LockGuard>, TransitionError> {
        if !self.policy.single_active_version {
            return Ok(Vec::new());
        }
        let others: Vec<RecordKey> = self
            .store
            .select(&RecordQuery::group(record.key.natural_key.clone()))?
            .into_iter()
            .map(|member| member.key)
            .filter(|key| key != &record.key)
            .collect();
        Ok(self
            .locks
            .try_lock_all(&others, ctx.session, LockMode::Exclusive)?)
    }

    /// The group's active member other than `record`, under
    /// single-active-version.
    fn active_member(&self, record: &Record) -> Result<Option<Record>, TransitionError> {
        if !self.policy.single_active_version {
            return Ok(None);
        }
        let query = RecordQuery::group(record.key.natural_key.clone())
            .active(self.schemas.active_flag_field(&record.record_type));
        let mut active: Vec<Record> = self
            .store
            .select(&query)?
            .into_iter()
            .filter(|r| r.key != record.key)
            .collect();
        match active.len() {
            0 | 1 => Ok(active.pop()),
            n => Err(QrlError::Integrity(format!(
                "version group {} has {n} active members",
                record.key.natural_key
            ))
            .into()),
        }
    }

    fn ensure_new_group(&self, key: &RecordKey) -> Result<(), TransitionError> {
        let existing = self
            .store
            .select(&RecordQuery::group(key.natural_key.clone()))?;
        if existing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Duplicate(key.clone()).into())
        }
    }

    fn commit(
        &self,
        txn: Transaction,
        effects: Vec<SuccessionEffect>,
        action: Action,
        ctx: &ActorContext,
    ) -> Result<TransitionResult, TransitionError> {
        let keys: Vec<String> = txn.keys().iter().map(ToString::to_string).collect();
        let written = self.store.commit(txn)?;
        tracing::info!(%action, actor = %ctx.actor, records = ?keys, "committed");
        Committed::from_written(written, effects)
            .map(|committed| TransitionResult::Committed(Box::new(committed)))
            .ok_or_else(|| QrlError::Integrity("empty transaction committed".into()).into())
    }
}
