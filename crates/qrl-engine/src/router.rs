//! Pluggable submission routing.
//!
//! By default the engine routes a submission itself: an assigned plan goes
//! to inspection, low security (or a review-exempt schema) authorises, and
//! anything else fails closed. Deployments with an external decision
//! procedure install a [`SubmissionRouter`] instead. Whatever it returns is
//! checked: only `Inspection` and `Authorised` are accepted.

use qrl_core::PolicyConfig;
use qrl_state::{ApprovalState, Record};

/// External decision procedure for where a submission goes.
pub trait SubmissionRouter: Send + Sync {
    /// The state the submitted record should move to.
    fn route(&self, record: &Record, policy: &PolicyConfig) -> ApprovalState;
}

/// Whether a routed state is one a submission may produce.
pub(crate) fn is_submission_target(state: ApprovalState) -> bool {
    matches!(state, ApprovalState::Inspection | ApprovalState::Authorised)
}
