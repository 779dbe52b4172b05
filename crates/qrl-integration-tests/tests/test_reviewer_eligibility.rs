//! # Reviewer Eligibility
//!
//! Segregation of duties, delegated approval, privilege-based assignments
//! and multi-assignment plans, under both security modes.

mod common;

use common::*;
use qrl_core::{PrivilegeId, SecurityMode};
use qrl_engine::{ActionRequest, ErrorClass, TransitionError};
use qrl_state::{
    Action, ApprovalState, InspectionAssignment, InspectionPlan, RefusalKind, ReviewerChoice,
};

/// A record under inspection whose plan assigns `reviewer`, who is also a
/// participant of the plan.
fn participant_reviewer(world: &World, nk: &str, reviewer: &str) -> qrl_core::RecordKey {
    let mut plan = plan_for(&[reviewer]);
    plan.participants.insert(actor_id(reviewer));
    let alice = ctx("alice");
    let k = world.add(sop(nk).with_plan(plan), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();
    assert_eq!(world.stored(&k).state(), ApprovalState::Inspection);
    k
}

#[test]
fn participant_is_never_self_reviewer_under_high() {
    let world = World::new(policy(SecurityMode::High));
    let k = participant_reviewer(&world, "REV-1", "carol");
    let carol = ctx("carol");

    let options = world.engine.resolve_review_options(&k, &carol.actor).unwrap();
    assert!(!options.contains(&ReviewerChoice::AsSelf(carol.actor.clone())));
    assert!(!world.engine.legal_actions(&k, &carol.actor).unwrap().contains(Action::Approve));

    let err = world
        .perform(ActionRequest::approve(k.clone()), &carol, true)
        .unwrap_err();
    match &err {
        TransitionError::ReviewerIneligible(refusal) => {
            assert_eq!(refusal.kind, RefusalKind::SegregationOfDuties);
        }
        other => panic!("expected ReviewerIneligible, got {other:?}"),
    }
    assert_eq!(err.class(), ErrorClass::DataIntegrity);
    assert_eq!(world.stored(&k).state(), ApprovalState::Inspection);
}

#[test]
fn participant_may_self_review_under_low() {
    let world = World::new(policy(SecurityMode::Low));
    let k = participant_reviewer(&world, "REV-2", "carol");
    let carol = ctx("carol");

    let options = world.engine.resolve_review_options(&k, &carol.actor).unwrap();
    assert!(options.contains(&ReviewerChoice::AsSelf(carol.actor.clone())));

    world
        .perform(ActionRequest::approve(k.clone()), &carol, true)
        .unwrap();
    assert_eq!(world.stored(&k).state(), ApprovalState::Authorised);
}

#[test]
fn submitter_cannot_approve_own_submission_under_high() {
    let world = World::new(policy(SecurityMode::High));
    let alice = ctx("alice");
    let k = world.add(sop("REV-3").with_plan(plan_for(&["alice"])), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();

    let err = world
        .perform(ActionRequest::approve(k.clone()), &alice, true)
        .unwrap_err();
    assert!(matches!(
        err,
        TransitionError::ReviewerIneligible(ref r) if r.kind == RefusalKind::SegregationOfDuties
    ));
}

#[test]
fn unassigned_actor_is_refused() {
    let world = World::new(policy(SecurityMode::High));
    let alice = ctx("alice");
    let k = world.add(sop("REV-4").with_plan(plan_for(&["bob"])), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();

    let err = world
        .perform(ActionRequest::approve(k.clone()), &ctx("mallory"), true)
        .unwrap_err();
    assert!(matches!(
        err,
        TransitionError::ReviewerIneligible(ref r) if r.kind == RefusalKind::NotAssigned
    ));
}

#[test]
fn high_security_without_plan_fails_closed() {
    let world = World::new(policy(SecurityMode::High));
    let alice = ctx("alice");
    let k = world.add(sop("REV-5"), &alice);

    let err = world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap_err();
    assert!(matches!(err, TransitionError::MissingPlan { .. }));
    assert_eq!(err.class(), ErrorClass::DataIntegrity);
    assert_eq!(world.stored(&k).state(), ApprovalState::Draft);
}

#[test]
fn delegated_approval_records_both_identities() {
    let world = World::new(policy(SecurityMode::High));
    world.grant_delegation("dave");
    let alice = ctx("alice");
    let dave = ctx("dave");
    let bob = actor_id("bob");
    let k = world.add(sop("REV-6").with_plan(plan_for(&["bob"])), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();

    let options = world.engine.resolve_review_options(&k, &dave.actor).unwrap();
    assert_eq!(
        options,
        vec![
            ReviewerChoice::OnBehalfOf(bob.clone()),
            ReviewerChoice::NominateOther
        ]
    );

    world
        .perform(ActionRequest::approve_on_behalf(k.clone(), bob.clone()), &dave, true)
        .unwrap();
    let stored = world.stored(&k);
    assert_eq!(stored.state(), ApprovalState::Authorised);
    let reviewed = stored.reviewed_by.unwrap();
    assert_eq!(reviewed.actor, bob);
    assert_eq!(reviewed.delegate, Some(dave.actor));
}

#[test]
fn delegation_without_privilege_is_a_user_error() {
    let world = World::new(policy(SecurityMode::High));
    let alice = ctx("alice");
    let k = world.add(sop("REV-7").with_plan(plan_for(&["bob"])), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();

    let err = world
        .perform(
            ActionRequest::approve_on_behalf(k.clone(), actor_id("bob")),
            &ctx("eve"),
            true,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransitionError::ReviewerIneligible(ref r) if r.kind == RefusalKind::NotAuthorizedToDelegate
    ));
    assert_eq!(err.class(), ErrorClass::UserError);
}

#[test]
fn submitter_cannot_launder_approval_through_delegation() {
    let world = World::new(policy(SecurityMode::High));
    world.grant_delegation("alice");
    let alice = ctx("alice");
    let k = world.add(sop("REV-8").with_plan(plan_for(&["bob"])), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();

    let err = world
        .perform(ActionRequest::approve_on_behalf(k.clone(), actor_id("bob")), &alice, true)
        .unwrap_err();
    assert!(matches!(
        err,
        TransitionError::ReviewerIneligible(ref r) if r.kind == RefusalKind::SegregationOfDuties
    ));
}

#[test]
fn privilege_assignment_accepts_any_holder() {
    let world = World::new(policy(SecurityMode::High));
    let qa = PrivilegeId::new("qa-reviewer").unwrap();
    world.privileges.grant(actor_id("erin"), qa.clone());
    let plan = InspectionPlan {
        assignments: vec![InspectionAssignment::privilege(qa)],
        ..InspectionPlan::default()
    };
    let alice = ctx("alice");
    let k = world.add(sop("REV-9").with_plan(plan), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();

    assert!(world
        .perform(ActionRequest::approve(k.clone()), &ctx("frank"), true)
        .is_err());
    world
        .perform(ActionRequest::approve(k.clone()), &ctx("erin"), true)
        .unwrap();
    assert_eq!(world.stored(&k).state(), ApprovalState::Authorised);
}

#[test]
fn multi_assignment_plan_needs_every_reviewer() {
    let world = World::new(policy(SecurityMode::High));
    let alice = ctx("alice");
    let bob = ctx("bob");
    let carol = ctx("carol");
    let k = world.add(sop("REV-10").with_plan(plan_for(&["bob", "carol"])), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();

    world
        .perform(ActionRequest::approve(k.clone()), &bob, true)
        .unwrap();
    let partial = world.stored(&k);
    assert_eq!(partial.state(), ApprovalState::Inspection);
    assert!(!partial.is_active());
    let plan = partial.inspection_plan.unwrap();
    assert!(!plan.assignments[0].is_open());
    assert!(plan.assignments[1].is_open());

    // Bob's assignment is done; he has nothing left to decide.
    let err = world
        .perform(ActionRequest::approve(k.clone()), &bob, true)
        .unwrap_err();
    assert!(matches!(
        err,
        TransitionError::ReviewerIneligible(ref r) if r.kind == RefusalKind::NotAssigned
    ));

    world
        .perform(ActionRequest::approve(k.clone()), &carol, true)
        .unwrap();
    let done = world.stored(&k);
    assert_eq!(done.state(), ApprovalState::Authorised);
    assert!(done.is_active());
    assert!(done.inspection_plan.unwrap().is_complete());
}

#[test]
fn any_reviewer_rejection_returns_record() {
    let world = World::new(policy(SecurityMode::High));
    let alice = ctx("alice");
    let k = world.add(sop("REV-11").with_plan(plan_for(&["bob", "carol"])), &alice);
    world
        .perform(ActionRequest::submit(k.clone()), &alice, true)
        .unwrap();
    world
        .perform(ActionRequest::approve(k.clone()), &ctx("bob"), true)
        .unwrap();
    world
        .perform(ActionRequest::reject(k.clone(), Some("typo".into())), &ctx("carol"), true)
        .unwrap();
    assert_eq!(world.stored(&k).state(), ApprovalState::Rejected);

    // Resubmission reopens both assignments.
    world
        .perform(ActionRequest::resubmit(k.clone()), &alice, true)
        .unwrap();
    let reopened = world.stored(&k).inspection_plan.unwrap();
    assert!(reopened.assignments.iter().all(|a| a.is_open()));
}
