//! # qrl-state: Record Lifecycle State Machine
//!
//! The pure decision layer of the lifecycle:
//!
//! - [`record`]: the versioned record, its approval state, inspection plan
//!   and audit trail.
//! - [`action`]: the closed set of lifecycle actions.
//! - [`evaluator`]: the single legal-action table.
//! - [`review`]: reviewer resolution and segregation of duties.
//! - [`succession`]: which group member is active after an authorisation.
//!
//! Nothing here locks or persists. The engine crate combines these with the
//! store's locks and commit boundary.

pub mod action;
pub mod evaluator;
pub mod record;
pub mod review;
pub mod succession;

pub use action::{Action, ActionSet};
pub use evaluator::{RecordFacts, Refusal, StateEvaluator};
pub use record::{
    ApprovalState, Assignee, Attachment, Attribution, InspectionAssignment, InspectionPlan, Record,
    StateTransitionRecord,
};
pub use review::{
    PrivilegeChecker, RefusalKind, ResolvedReviewer, ReviewDelegate, ReviewRefusal, ReviewerChoice,
};
pub use succession::{SuccessionEffect, SuccessionError, SuccessionPlan, VersionSuccessionManager};
