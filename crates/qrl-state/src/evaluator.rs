//! # State Evaluator
//!
//! Pure mapping from (record, policy, request facts) to the set of legal
//! actions. Every lifecycle rule lives in one `match` in
//! [`StateEvaluator::legal_actions`]; adding a state or action is a change
//! in that one place.
//!
//! | State      | Legal                                                   |
//! |------------|---------------------------------------------------------|
//! | Draft      | Submit, Modify, Remove (if removable)                   |
//! | Inspection | Approve, Reject (eligible reviewer only)                |
//! | Rejected   | Modify, Resubmit, Cancel                                |
//! | Pending    | Modify under the low-security carve-out                 |
//! | Authorised | NewVersion, Display; Modify under the carve-out         |
//! | Cancelled  | NewVersion                                              |
//!
//! The carve-out: security is `Low`, submit-on-add is enabled and no open
//! inspection plan exists. On `Authorised` it additionally requires the
//! record to be the active member of its group when single-active-version
//! is on.
//!
//! A removed record offers only Restore.
//!
//! Cancel on `Rejected` extends the base lifecycle table (Modify, Resubmit).
//! It is the only way into `Cancelled`, which otherwise has no inbound edge.

use qrl_core::{PolicyConfig, SecurityMode};

use crate::action::{Action, ActionSet};
use crate::record::{ApprovalState, Record};

/// Per-request facts the evaluator cannot derive from the record alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFacts {
    /// The requesting actor is an eligible reviewer for this record.
    pub can_review: bool,
    /// The record's schema declares the removal capability.
    pub removable: bool,
}

/// Why an action was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    /// The refused action.
    pub action: Action,
    /// Human-readable reason, shown to the user as-is.
    pub reason: String,
    /// Whether the caller may continue read-only instead.
    pub display_fallback: bool,
}

/// Decides which lifecycle actions are legal for a record.
#[derive(Debug, Clone, Copy)]
pub struct StateEvaluator {
    policy: PolicyConfig,
}

impl StateEvaluator {
    /// Create an evaluator for a policy.
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    /// The policy this evaluator was built with.
    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// The set of state-gated actions legal for `record` right now.
    ///
    /// Add and Copy are not state-gated and never appear here; Display is
    /// listed only where the table lists it (see [`Self::can_display`]).
    pub fn legal_actions(&self, record: &Record, facts: &RecordFacts) -> ActionSet {
        use Action::*;

        if record.removed {
            return if facts.removable {
                ActionSet::from([Restore])
            } else {
                ActionSet::empty()
            };
        }

        let carve_out = self.modify_carve_out(record);
        match record.state() {
            ApprovalState::Draft => {
                let mut set = ActionSet::from([Submit, Modify]);
                if facts.removable {
                    set.insert(Remove);
                }
                set
            }
            ApprovalState::Inspection if facts.can_review => ActionSet::from([Approve, Reject]),
            ApprovalState::Inspection => ActionSet::empty(),
            ApprovalState::Rejected => ActionSet::from([Modify, Resubmit, Cancel]),
            ApprovalState::Pending if carve_out => ActionSet::from([Modify]),
            ApprovalState::Pending => ActionSet::empty(),
            ApprovalState::Authorised => {
                let mut set = ActionSet::from([NewVersion, Display]);
                if carve_out && self.is_group_active_member(record) {
                    set.insert(Modify);
                }
                set
            }
            ApprovalState::Cancelled => ActionSet::from([NewVersion]),
        }
    }

    /// Whether `action` is legal. Ungated actions are always legal.
    pub fn is_legal(&self, action: Action, record: &Record, facts: &RecordFacts) -> bool {
        action.is_ungated() || self.legal_actions(record, facts).contains(action)
    }

    /// Readers are never blocked.
    pub fn can_display(&self, _record: &Record) -> bool {
        true
    }

    /// Check an action, returning the refusal the UI should show when it is
    /// not legal.
    pub fn check(
        &self,
        action: Action,
        record: &Record,
        facts: &RecordFacts,
    ) -> Result<(), Refusal> {
        if self.is_legal(action, record, facts) {
            return Ok(());
        }
        if action == Action::Modify {
            return Err(self.modify_refusal(record));
        }
        Err(Refusal {
            action,
            reason: format!(
                "{action} is not permitted while record {} is {}",
                record.key,
                record.state()
            ),
            display_fallback: false,
        })
    }

    /// Evaluate a Modify request, explaining a refusal and offering Display
    /// where the record can still be read.
    pub fn evaluate_modify(&self, record: &Record, facts: &RecordFacts) -> Result<(), Refusal> {
        self.check(Action::Modify, record, facts)
    }

    fn modify_refusal(&self, record: &Record) -> Refusal {
        let key = &record.key;
        let reason = if record.removed {
            format!("record {key} is removed; restore it before editing")
        } else {
            match record.state() {
                ApprovalState::Inspection => {
                    format!("record {key} is under inspection and cannot be edited")
                }
                ApprovalState::Pending => format!(
                    "record {key} is pending activation; create a new version to change it"
                ),
                ApprovalState::Authorised
                    if self.modify_carve_out(record) && !self.is_group_active_member(record) =>
                {
                    format!("record {key} is not the active version of its group")
                }
                ApprovalState::Authorised => {
                    format!("record {key} is authorised; create a new version to change it")
                }
                ApprovalState::Cancelled => {
                    format!("record {key} is cancelled; create a new version to change it")
                }
                state => format!("record {key} cannot be edited while {state}"),
            }
        };
        Refusal {
            action: Action::Modify,
            reason,
            display_fallback: self.can_display(record),
        }
    }

    fn modify_carve_out(&self, record: &Record) -> bool {
        self.policy.security_mode == SecurityMode::Low
            && self.policy.submit_on_add
            && !record.has_open_plan()
    }

    fn is_group_active_member(&self, record: &Record) -> bool {
        !self.policy.single_active_version || record.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{InspectionAssignment, InspectionPlan};
    use qrl_core::{ActorId, NaturalKey, RecordKey};

    fn key() -> RecordKey {
        RecordKey::first(NaturalKey::new("SOP-001").unwrap())
    }

    fn record(state: ApprovalState, active: bool) -> Record {
        Record::imported(key(), "sop", state, active).unwrap()
    }

    fn policy(mode: SecurityMode, single: bool, submit_on_add: bool) -> PolicyConfig {
        PolicyConfig {
            security_mode: mode,
            single_active_version: single,
            submit_on_add,
        }
    }

    fn open_plan() -> InspectionPlan {
        InspectionPlan {
            assignments: vec![InspectionAssignment::actor(ActorId::new("bob").unwrap())],
            participants: Default::default(),
        }
    }

    fn set(actions: &[Action]) -> ActionSet {
        actions.iter().copied().collect()
    }

    /// Expected table, written independently of the implementation.
    fn expected(
        state: ApprovalState,
        mode: SecurityMode,
        single: bool,
        submit_on_add: bool,
        open: bool,
        active: bool,
        facts: RecordFacts,
    ) -> ActionSet {
        use Action::*;
        let carve = mode == SecurityMode::Low && submit_on_add && !open;
        match state {
            ApprovalState::Draft if facts.removable => set(&[Submit, Modify, Remove]),
            ApprovalState::Draft => set(&[Submit, Modify]),
            ApprovalState::Inspection if facts.can_review => set(&[Approve, Reject]),
            ApprovalState::Inspection => set(&[]),
            // Base table plus the Cancel extension.
            ApprovalState::Rejected => set(&[Modify, Resubmit, Cancel]),
            ApprovalState::Pending if carve => set(&[Modify]),
            ApprovalState::Pending => set(&[]),
            ApprovalState::Authorised if carve && (!single || active) => {
                set(&[NewVersion, Display, Modify])
            }
            ApprovalState::Authorised => set(&[NewVersion, Display]),
            ApprovalState::Cancelled => set(&[NewVersion]),
        }
    }

    #[test]
    fn cancel_is_offered_only_on_rejected() {
        let evaluator = StateEvaluator::new(PolicyConfig::default());
        let facts = RecordFacts {
            can_review: true,
            removable: true,
        };
        for state in ApprovalState::ALL {
            let offered = evaluator
                .legal_actions(&record(state, false), &facts)
                .contains(Action::Cancel);
            assert_eq!(offered, state == ApprovalState::Rejected, "{state}");
        }
    }

    #[test]
    fn legal_actions_exhaustive_table() {
        let mut cases = 0;
        for state in ApprovalState::ALL {
            for mode in SecurityMode::ALL {
                for single in [false, true] {
                    for submit_on_add in [false, true] {
                        for open in [false, true] {
                            for active in [false, true] {
                                if active && !state.may_be_active() {
                                    continue;
                                }
                                for can_review in [false, true] {
                                    for removable in [false, true] {
                                        let facts = RecordFacts {
                                            can_review,
                                            removable,
                                        };
                                        let mut rec = record(state, active);
                                        if open {
                                            rec = rec.with_plan(open_plan());
                                        }
                                        let eval = StateEvaluator::new(policy(
                                            mode,
                                            single,
                                            submit_on_add,
                                        ));
                                        assert_eq!(
                                            eval.legal_actions(&rec, &facts),
                                            expected(
                                                state,
                                                mode,
                                                single,
                                                submit_on_add,
                                                open,
                                                active,
                                                facts
                                            ),
                                            "state={state} mode={mode} single={single} \
                                             submit_on_add={submit_on_add} open={open} \
                                             active={active} facts={facts:?}"
                                        );
                                        cases += 1;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(cases, 2 * 2 * 2 * 2 * 4 * (4 + 2 * 2));
    }

    #[test]
    fn removed_record_offers_only_restore() {
        let eval = StateEvaluator::new(PolicyConfig::default());
        let mut rec = record(ApprovalState::Draft, false);
        rec.removed = true;
        let facts = RecordFacts {
            removable: true,
            ..Default::default()
        };
        assert_eq!(eval.legal_actions(&rec, &facts), set(&[Action::Restore]));
        assert!(eval
            .legal_actions(&rec, &RecordFacts::default())
            .is_empty());
    }

    #[test]
    fn ungated_actions_are_always_legal() {
        let eval = StateEvaluator::new(PolicyConfig::default());
        let rec = record(ApprovalState::Inspection, false);
        for action in [Action::Add, Action::Copy, Action::Display] {
            assert!(eval.is_legal(action, &rec, &RecordFacts::default()));
        }
        assert!(eval.can_display(&rec));
    }

    #[test]
    fn modify_under_inspection_offers_display() {
        let eval = StateEvaluator::new(PolicyConfig::default());
        let refusal = eval
            .evaluate_modify(&record(ApprovalState::Inspection, false), &RecordFacts::default())
            .unwrap_err();
        assert!(refusal.display_fallback);
        assert!(refusal.reason.contains("under inspection"));
    }

    #[test]
    fn modify_on_inactive_authorised_names_the_cause() {
        let eval = StateEvaluator::new(policy(SecurityMode::Low, true, true));
        let refusal = eval
            .evaluate_modify(&record(ApprovalState::Authorised, false), &RecordFacts::default())
            .unwrap_err();
        assert!(refusal.reason.contains("not the active version"));

        assert!(eval
            .evaluate_modify(&record(ApprovalState::Authorised, true), &RecordFacts::default())
            .is_ok());
    }

    #[test]
    fn non_modify_refusal_has_no_fallback() {
        let eval = StateEvaluator::new(PolicyConfig::default());
        let refusal = eval
            .check(
                Action::Submit,
                &record(ApprovalState::Authorised, true),
                &RecordFacts::default(),
            )
            .unwrap_err();
        assert_eq!(refusal.action, Action::Submit);
        assert!(!refusal.display_fallback);
        assert!(refusal.reason.contains("AUTHORISED"));
    }
}
