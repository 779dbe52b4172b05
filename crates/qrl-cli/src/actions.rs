//! # Actions Subcommand
//!
//! Prints the legal-action table for the effective policy: one row per
//! approval state and active flag, with the actions open to an author and
//! to an eligible reviewer. Add and Copy are never state-gated and are not
//! listed.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use qrl_core::{NaturalKey, PolicyConfig, RecordKey};
use qrl_state::{
    ActionSet, ApprovalState, InspectionAssignment, InspectionPlan, Record, RecordFacts,
    StateEvaluator,
};

use crate::OutputFormat;

/// Arguments for the `qrl actions` subcommand.
#[derive(Args, Debug)]
pub struct ActionsArgs {
    /// Evaluate records whose schema grants the removal capability.
    #[arg(long)]
    pub removable: bool,

    /// Evaluate records carrying an open inspection plan.
    #[arg(long)]
    pub with_plan: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// One row of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub state: ApprovalState,
    pub active: bool,
    pub removed: bool,
    pub author: ActionSet,
    pub reviewer: ActionSet,
}

/// Build the table for `policy`.
pub fn action_table(
    policy: PolicyConfig,
    removable: bool,
    with_plan: bool,
) -> Result<Vec<TableRow>> {
    let evaluator = StateEvaluator::new(policy);
    let key = RecordKey::first(NaturalKey::new("sample")?);
    let plan = InspectionPlan {
        assignments: vec![InspectionAssignment::actor(qrl_core::ActorId::new("reviewer")?)],
        ..InspectionPlan::default()
    };

    let mut rows = Vec::new();
    let mut push = |mut record: Record, removed: bool| {
        if with_plan {
            record = record.with_plan(plan.clone());
        }
        record.removed = removed;
        let author = RecordFacts {
            can_review: false,
            removable,
        };
        let reviewer = RecordFacts {
            can_review: true,
            removable,
        };
        rows.push(TableRow {
            state: record.state(),
            active: record.is_active(),
            removed,
            author: evaluator.legal_actions(&record, &author),
            reviewer: evaluator.legal_actions(&record, &reviewer),
        });
    };

    for state in ApprovalState::ALL {
        for active in [false, true] {
            if active && !state.may_be_active() {
                continue;
            }
            let record = Record::imported(key.clone(), "sample", state, active)
                .with_context(|| format!("building sample {state} record"))?;
            push(record, false);
        }
    }
    push(Record::draft(key, "sample"), true);
    Ok(rows)
}

/// Run the `actions` subcommand.
pub fn run_actions(args: &ActionsArgs, policy: PolicyConfig) -> Result<u8> {
    let rows = action_table(policy, args.removable, args.with_plan)?;
    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            println!(
                "security_mode={} single_active_version={} submit_on_add={}",
                policy.security_mode, policy.single_active_version, policy.submit_on_add
            );
            println!("{:<12} {:<7} {:<40} REVIEWER", "STATE", "ACTIVE", "AUTHOR");
            for row in &rows {
                let state = if row.removed {
                    "(removed)".to_string()
                } else {
                    row.state.to_string()
                };
                println!(
                    "{:<12} {:<7} {:<40} {}",
                    state,
                    row.active,
                    row.author.to_string(),
                    row.reviewer
                );
            }
        }
    }
    Ok(0)
}
