//! # Review Delegate
//!
//! Resolves who performs an inspection decision and whether they may.
//!
//! ## Eligibility
//!
//! An actor can review a record under inspection when:
//!
//! 1. the record has a plan with at least one assignment (under `High`,
//!    a missing plan is a data-integrity refusal, since submission should
//!    have been blocked);
//! 2. the actor is neither a plan participant nor the submitter (enforced
//!    under `High`, logged and allowed under `Low`);
//! 3. the actor matches an open assignment, either by name or by holding
//!    the assignment's privilege.
//!
//! ## Delegation
//!
//! A requester holding `approve-on-behalf` may nominate another actor. The
//! nominee must pass the same eligibility check, and the requester is
//! recorded as the delegate.

use std::sync::Arc;

use qrl_core::{ActorId, PolicyConfig, PrivilegeId, SecurityMode};

use crate::record::{ApprovalState, Assignee, Attribution, Record};

/// Privilege lookups, provided by the surrounding policy surface.
pub trait PrivilegeChecker: Send + Sync {
    /// Whether `actor` holds `privilege`, optionally scoped to a record.
    fn check_privilege(&self, actor: &ActorId, privilege: &PrivilegeId, record: Option<&Record>)
        -> bool;
}

/// Category of a review refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefusalKind {
    /// The record is not under inspection.
    NotUnderInspection,
    /// No plan with assignments exists under high security.
    MissingPlan,
    /// The actor produced or submitted the work under review.
    SegregationOfDuties,
    /// The actor matches no open assignment.
    NotAssigned,
    /// The requester lacks `approve-on-behalf`.
    NotAuthorizedToDelegate,
}

/// A business refusal from the delegate. Never an error; the engine decides
/// how to surface it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRefusal {
    /// Refusal category.
    pub kind: RefusalKind,
    /// Human-readable reason.
    pub reason: String,
}

impl ReviewRefusal {
    fn new(kind: RefusalKind, reason: String) -> Self {
        Self { kind, reason }
    }

    /// Refusals that must be fixed by editing the record's plan.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self.kind,
            RefusalKind::MissingPlan | RefusalKind::SegregationOfDuties | RefusalKind::NotAssigned
        )
    }
}

/// An option offered in the "choose reviewer" dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewerChoice {
    /// Review as the requester.
    AsSelf(ActorId),
    /// Review on behalf of a named assignee.
    OnBehalfOf(ActorId),
    /// Nominate another actor by name; validated on submission.
    NominateOther,
}

/// The resolved reviewer for a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReviewer {
    /// Reviewer of record, plus the delegate if one acted.
    pub identity: Attribution,
    /// Index of the plan assignment this decision completes, if any.
    pub assignment: Option<usize>,
}

/// Resolves reviewers and enforces segregation of duties.
#[derive(Clone)]
pub struct ReviewDelegate {
    policy: PolicyConfig,
    privileges: Arc<dyn PrivilegeChecker>,
}

impl std::fmt::Debug for ReviewDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewDelegate")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ReviewDelegate {
    /// Create a delegate.
    pub fn new(policy: PolicyConfig, privileges: Arc<dyn PrivilegeChecker>) -> Self {
        Self { policy, privileges }
    }

    /// Whether `actor` may decide the inspection of `record`.
    ///
    /// Returns the index of the open assignment the actor would complete.
    pub fn can_review(
        &self,
        record: &Record,
        actor: &ActorId,
    ) -> Result<Option<usize>, ReviewRefusal> {
        if record.state() != ApprovalState::Inspection {
            return Err(ReviewRefusal::new(
                RefusalKind::NotUnderInspection,
                format!("record {} is {}, not under inspection", record.key, record.state()),
            ));
        }

        let plan = match record.inspection_plan.as_ref().filter(|p| p.has_assignments()) {
            Some(plan) => plan,
            None if self.policy.security_mode == SecurityMode::High => {
                return Err(ReviewRefusal::new(
                    RefusalKind::MissingPlan,
                    format!(
                        "record {} has no inspection plan; a plan must be supplied",
                        record.key
                    ),
                ));
            }
            None => {
                tracing::warn!(
                    record = %record.key,
                    %actor,
                    "reviewing without an inspection plan"
                );
                return Ok(None);
            }
        };

        self.check_segregation(record, actor)?;

        plan.assignments
            .iter()
            .position(|a| {
                a.is_open()
                    && match &a.assignee {
                        Assignee::Actor(named) => named == actor,
                        Assignee::AnyWithPrivilege(privilege) => {
                            self.privileges.check_privilege(actor, privilege, Some(record))
                        }
                    }
            })
            .map(Some)
            .ok_or_else(|| {
                ReviewRefusal::new(
                    RefusalKind::NotAssigned,
                    format!("{actor} has no open inspection assignment on record {}", record.key),
                )
            })
    }

    /// Resolve who reviews: the requester, or `nominee` on their behalf.
    pub fn resolve_reviewer(
        &self,
        record: &Record,
        requester: &ActorId,
        nominee: Option<&ActorId>,
    ) -> Result<ResolvedReviewer, ReviewRefusal> {
        let Some(nominee) = nominee.filter(|n| *n != requester) else {
            let assignment = self.can_review(record, requester)?;
            return Ok(ResolvedReviewer {
                identity: Attribution::by(requester.clone()),
                assignment,
            });
        };

        if !self.may_delegate(record, requester) {
            return Err(ReviewRefusal::new(
                RefusalKind::NotAuthorizedToDelegate,
                format!("{requester} may not review on behalf of {nominee}"),
            ));
        }
        self.check_segregation(record, requester)?;
        let assignment = self.can_review(record, nominee)?;
        tracing::info!(record = %record.key, %requester, %nominee, "review delegated");
        Ok(ResolvedReviewer {
            identity: Attribution {
                actor: nominee.clone(),
                delegate: Some(requester.clone()),
            },
            assignment,
        })
    }

    /// The options to present in the "choose reviewer" dialog.
    pub fn resolve_review_options(
        &self,
        record: &Record,
        requester: &ActorId,
    ) -> Vec<ReviewerChoice> {
        let mut choices = Vec::new();
        if self.can_review(record, requester).is_ok() {
            choices.push(ReviewerChoice::AsSelf(requester.clone()));
        }

        if !self.may_delegate(record, requester)
            || self.check_segregation(record, requester).is_err()
        {
            return choices;
        }
        if let Some(plan) = record.inspection_plan.as_ref() {
            for assignment in plan.assignments.iter().filter(|a| a.is_open()) {
                if let Assignee::Actor(named) = &assignment.assignee {
                    let choice = ReviewerChoice::OnBehalfOf(named.clone());
                    if named != requester
                        && !choices.contains(&choice)
                        && self.can_review(record, named).is_ok()
                    {
                        choices.push(choice);
                    }
                }
            }
        }
        choices.push(ReviewerChoice::NominateOther);
        choices
    }

    fn may_delegate(&self, record: &Record, requester: &ActorId) -> bool {
        self.privileges
            .check_privilege(requester, &PrivilegeId::approve_on_behalf(), Some(record))
    }

    fn check_segregation(&self, record: &Record, actor: &ActorId) -> Result<(), ReviewRefusal> {
        let participant = record
            .inspection_plan
            .as_ref()
            .is_some_and(|p| p.is_participant(actor));
        let submitter = record.submitted_by.as_ref() == Some(actor);
        if !participant && !submitter {
            return Ok(());
        }
        match self.policy.security_mode {
            SecurityMode::High => Err(ReviewRefusal::new(
                RefusalKind::SegregationOfDuties,
                format!("{actor} took part in record {} and may not review it", record.key),
            )),
            SecurityMode::Low => {
                tracing::warn!(
                    record = %record.key,
                    %actor,
                    participant,
                    submitter,
                    "segregation of duties not enforced under low security"
                );
                Ok(())
            }
        }
    }
}
