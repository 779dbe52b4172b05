//! # Demo Subcommand
//!
//! Runs one version group through its lifecycle against the in-memory
//! store, printing every step:
//!
//! ```text
//! add v1 ─▶ submit ─▶ (approve) ─▶ new version v2 ─▶ submit ─▶ (approve)
//!                                                     └─ deactivate v1?
//! ```
//!
//! Under high security the records carry an inspection plan assigning the
//! reviewer, so submissions route to inspection. Under low security they
//! carry none and authorise on submit.

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;

use qrl_core::{ActorId, NaturalKey, PolicyConfig, RecordKey, SecurityMode};
use qrl_engine::{
    ActionRequest, ActorContext, ErrorClass, TransitionEngine, TransitionError, TransitionResult,
};
use qrl_state::{ApprovalState, Attachment, InspectionAssignment, InspectionPlan, Record};
use qrl_store::{
    EntityStore, InMemoryStore, RecordQuery, RecordSchema, StaticPrivileges, StaticSchemaCatalog,
};

use crate::OutputFormat;

/// Confirmation rounds before a request is considered stuck.
const MAX_CONFIRMATION_ROUNDS: usize = 3;

/// Arguments for the `qrl demo` subcommand.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Natural key of the demonstration record.
    #[arg(long, default_value = "SOP-001")]
    pub key: String,

    /// Author of the record.
    #[arg(long, default_value = "alice")]
    pub author: String,

    /// Reviewer assigned by the inspection plan.
    #[arg(long, default_value = "bob")]
    pub reviewer: String,

    /// Answer "no" when asked to deactivate the previous version.
    #[arg(long)]
    pub decline_deactivation: bool,

    /// Format of the final version-group listing.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Run the `demo` subcommand.
pub fn run_demo(args: &DemoArgs, policy: PolicyConfig) -> Result<u8> {
    let store = InMemoryStore::new();
    let engine = TransitionEngine::new(
        policy,
        Arc::new(store.clone()),
        Arc::new(StaticSchemaCatalog::new().with(RecordSchema::new("sop").removable())),
        Arc::new(StaticPrivileges::new()),
    );
    let author = ActorContext::new(ActorId::new(&args.author)?);
    let reviewer = ActorContext::new(ActorId::new(&args.reviewer)?);
    if author.actor == reviewer.actor && policy.security_mode == SecurityMode::High {
        bail!("author and reviewer must differ under high security");
    }
    let answer = !args.decline_deactivation;

    println!(
        "policy: security_mode={} single_active_version={} submit_on_add={}",
        policy.security_mode, policy.single_active_version, policy.submit_on_add
    );

    let v1 = RecordKey::first(NaturalKey::new(&args.key)?);
    let mut draft = Record::draft(v1.clone(), "sop")
        .with_field("title", serde_json::json!("Cleaning procedure"));
    draft.attachments.push(Attachment {
        name: "procedure.pdf".into(),
        reference: "blob://procedure-v1".into(),
    });
    if policy.security_mode == SecurityMode::High {
        draft = draft.with_plan(InspectionPlan {
            assignments: vec![InspectionAssignment::actor(reviewer.actor.clone())],
            ..InspectionPlan::default()
        });
    }

    step(&engine, "add", ActionRequest::add(draft), &author, answer)?;
    let v2 = if authorise(&engine, &store, &v1, &author, &reviewer, answer)? {
        let request = ActionRequest::new_version(v1.clone());
        let result = step(&engine, "new-version", request, &author, answer)?;
        let Some(next) = result.committed().map(|r| r.key.clone()) else {
            bail!("new version of {v1} did not commit");
        };
        authorise(&engine, &store, &next, &author, &reviewer, answer)?;
        Some(next)
    } else {
        None
    };

    let group = store.select(&RecordQuery::group(v1.natural_key.clone()))?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&group)?),
        OutputFormat::Text => {
            println!("version group {}:", v1.natural_key);
            for record in &group {
                println!(
                    "  {:<16} {:<11} active={}",
                    record.key.to_string(),
                    record.state().to_string(),
                    record.is_active()
                );
            }
        }
    }

    let active = group.iter().filter(|r| r.is_active()).count();
    if policy.single_active_version && active > 1 {
        bail!("version group {} ended with {active} active members", v1.natural_key);
    }
    tracing::debug!(latest = ?v2, active, "demo finished");
    Ok(0)
}

/// Submit `key`, then approve it if it went to inspection. Returns whether
/// the record ended up authorised or pending.
fn authorise(
    engine: &TransitionEngine,
    store: &InMemoryStore,
    key: &RecordKey,
    author: &ActorContext,
    reviewer: &ActorContext,
    answer: bool,
) -> Result<bool> {
    if current_state(store, key)? == ApprovalState::Draft {
        let request = ActionRequest::submit(key.clone());
        tolerate_refusal(step(engine, "submit", request, author, answer))?;
    }
    if current_state(store, key)? == ApprovalState::Inspection {
        let request = ActionRequest::approve(key.clone());
        tolerate_refusal(step(engine, "approve", request, reviewer, answer))?;
    }
    Ok(matches!(
        current_state(store, key)?,
        ApprovalState::Authorised | ApprovalState::Pending
    ))
}

/// Print a user-facing refusal and carry on; propagate anything else.
fn tolerate_refusal(result: Result<TransitionResult>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) => match err.downcast_ref::<TransitionError>() {
            Some(refusal) if refusal.class() == ErrorClass::UserError => {
                println!("  refused: {refusal}");
                Ok(())
            }
            _ => Err(err),
        },
    }
}

fn current_state(store: &InMemoryStore, key: &RecordKey) -> Result<ApprovalState> {
    match store.get(key)? {
        Some(record) => Ok(record.state()),
        None => bail!("record {key} disappeared"),
    }
}

/// Perform one request, answering any prompts with `answer`.
fn step(
    engine: &TransitionEngine,
    label: &str,
    mut request: ActionRequest,
    ctx: &ActorContext,
    answer: bool,
) -> Result<TransitionResult> {
    for _ in 0..MAX_CONFIRMATION_ROUNDS {
        match engine.request_action(&request, ctx)? {
            TransitionResult::ConfirmationRequired(prompts) => {
                for prompt in prompts {
                    println!("  ? {} {}", prompt.message, if answer { "yes" } else { "no" });
                    request = request.confirm(prompt.kind, answer);
                }
            }
            result => {
                report(label, ctx, &result);
                return Ok(result);
            }
        }
    }
    bail!("{label} kept asking for confirmation")
}

fn report(label: &str, ctx: &ActorContext, result: &TransitionResult) {
    match result {
        TransitionResult::Committed(committed) => {
            println!(
                "{label:<12} by {:<8} {} -> {}",
                ctx.actor.to_string(),
                committed.record.key,
                committed.record.state()
            );
            for effect in &committed.effects {
                println!("  {effect:?}");
            }
        }
        TransitionResult::ReadOnly(record) => {
            println!("{label:<12} by {:<8} {} (read-only)", ctx.actor.to_string(), record.key);
        }
        TransitionResult::ConfirmationRequired(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> DemoArgs {
        DemoArgs {
            key: "SOP-001".into(),
            author: "alice".into(),
            reviewer: "bob".into(),
            decline_deactivation: false,
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn demo_runs_under_every_policy() {
        for security_mode in SecurityMode::ALL {
            for single_active_version in [false, true] {
                for submit_on_add in [false, true] {
                    let policy = PolicyConfig {
                        security_mode,
                        single_active_version,
                        submit_on_add,
                    };
                    assert_eq!(run_demo(&args(), policy).unwrap(), 0, "{policy:?}");
                }
            }
        }
    }

    #[test]
    fn declined_deactivation_is_reported_not_fatal() {
        let demo = DemoArgs {
            decline_deactivation: true,
            ..args()
        };
        assert_eq!(run_demo(&demo, PolicyConfig::default()).unwrap(), 0);
    }

    #[test]
    fn declined_deactivation_under_low_security() {
        let demo = DemoArgs {
            decline_deactivation: true,
            ..args()
        };
        let policy = PolicyConfig {
            security_mode: SecurityMode::Low,
            ..PolicyConfig::default()
        };
        assert_eq!(run_demo(&demo, policy).unwrap(), 0);
    }

    #[test]
    fn same_author_and_reviewer_rejected_under_high() {
        let demo = DemoArgs {
            reviewer: "alice".into(),
            ..args()
        };
        assert!(run_demo(&demo, PolicyConfig::default()).is_err());
    }
}
