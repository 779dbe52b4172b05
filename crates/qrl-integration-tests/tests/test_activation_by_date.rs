//! # Activation by Date
//!
//! A record authorised ahead of its effective date is held `Pending` and
//! promoted by the external "date reached" trigger. The deactivation of the
//! current version is confirmed at approval time.

mod common;

use common::*;
use qrl_core::{SecurityMode, Timestamp};
use qrl_engine::{ActionRequest, ConfirmationKind, RecordEdit, TransitionError};
use qrl_state::{ApprovalState, SuccessionEffect};

#[test]
fn future_version_is_held_then_supersedes_on_trigger() {
    let world = World::new(policy(SecurityMode::Low));
    let alice = ctx("alice");
    let v1 = world.add(sop("DATE-1"), &alice);
    world
        .perform(ActionRequest::submit(v1.clone()), &alice, true)
        .unwrap();
    let v2 = world
        .perform(ActionRequest::new_version(v1.clone()), &alice, true)
        .unwrap()
        .committed()
        .unwrap()
        .key
        .clone();

    let now = Timestamp::now();
    let due = now.checked_add_days(30).unwrap();
    world
        .perform(
            ActionRequest::modify(v2.clone(), RecordEdit::default().effective_from(due)),
            &alice,
            true,
        )
        .unwrap();

    let first = world
        .engine
        .request_action(&ActionRequest::submit(v2.clone()), &alice)
        .unwrap();
    assert_eq!(first.prompts().len(), 1);
    assert_eq!(first.prompts()[0].kind, ConfirmationKind::DeactivatePredecessor);

    let held = world
        .engine
        .request_action(
            &ActionRequest::submit(v2.clone())
                .confirm(ConfirmationKind::DeactivatePredecessor, true),
            &alice,
        )
        .unwrap();
    let committed = match held {
        qrl_engine::TransitionResult::Committed(c) => c,
        other => panic!("expected commit, got {other:?}"),
    };
    assert_eq!(
        committed.effects,
        vec![SuccessionEffect::HeldPending {
            key: v2.clone(),
            until: due
        }]
    );
    assert_eq!(world.stored(&v2).state(), ApprovalState::Pending);
    assert!(!world.stored(&v2).is_active());
    assert!(world.stored(&v1).is_active(), "current version stays active until due");

    let scheduler = ctx("scheduler");
    let early = world.engine.activate_due(&v2, &scheduler, now).unwrap_err();
    assert!(matches!(early, TransitionError::IllegalTransition(_)));
    assert_eq!(world.stored(&v2).state(), ApprovalState::Pending);

    let activated = world.engine.activate_due(&v2, &scheduler, due).unwrap();
    assert!(activated.prompts().is_empty());
    assert_eq!(world.stored(&v2).state(), ApprovalState::Authorised);
    assert!(world.stored(&v2).is_active());
    assert!(!world.stored(&v1).is_active());
    assert_eq!(world.stored(&v1).active_end(), Some(due));
    assert_eq!(world.active_count("DATE-1"), 1);
}

#[test]
fn declining_future_supersession_keeps_draft() {
    let world = World::new(policy(SecurityMode::Low));
    let alice = ctx("alice");
    let v1 = world.add(sop("DATE-2"), &alice);
    world
        .perform(ActionRequest::submit(v1.clone()), &alice, true)
        .unwrap();
    let v2 = world
        .perform(ActionRequest::new_version(v1.clone()), &alice, true)
        .unwrap()
        .committed()
        .unwrap()
        .key
        .clone();
    let due = Timestamp::now().checked_add_days(7).unwrap();
    world
        .perform(
            ActionRequest::modify(v2.clone(), RecordEdit::default().effective_from(due)),
            &alice,
            true,
        )
        .unwrap();

    let err = world
        .perform(ActionRequest::submit(v2.clone()), &alice, false)
        .unwrap_err();
    assert!(matches!(err, TransitionError::DeactivationDeclined { .. }));
    assert_eq!(world.stored(&v2).state(), ApprovalState::Draft);
    assert!(world.stored(&v1).is_active());
}

#[test]
fn trigger_on_non_pending_record_is_refused() {
    let world = World::new(policy(SecurityMode::Low));
    let alice = ctx("alice");
    let v1 = world.add(sop("DATE-3"), &alice);

    let err = world
        .engine
        .activate_due(&v1, &ctx("scheduler"), Timestamp::now())
        .unwrap_err();
    assert!(matches!(err, TransitionError::IllegalTransition(_)));
    assert!(world.engine.locks().holder(&v1).is_none());
}
