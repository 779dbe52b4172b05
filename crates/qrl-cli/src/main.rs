//! # qrl CLI entry point
//!
//! Parses command-line arguments, installs the tracing subscriber, resolves
//! the policy, and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use qrl_cli::actions::{run_actions, ActionsArgs};
use qrl_cli::config::{run_config, ConfigArgs};
use qrl_cli::demo::{run_demo, DemoArgs};
use qrl_cli::load_policy;

/// Regulated record lifecycle tooling.
///
/// Inspect the legal-action table a policy produces, validate policy
/// files, and walk a version group through submission, review and
/// succession.
#[derive(Parser, Debug)]
#[command(name = "qrl", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the policy file. Defaults apply when omitted.
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the legal-action table for the effective policy.
    Actions(ActionsArgs),

    /// Validate or show policy configuration.
    Config(ConfigArgs),

    /// Run a demonstration lifecycle against the in-memory store.
    Demo(DemoArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "qrl CLI starting");

    let policy_path = cli.policy.as_deref();
    let result = match &cli.command {
        Commands::Actions(args) => load_policy(policy_path).and_then(|p| run_actions(args, p)),
        Commands::Config(args) => run_config(args, || load_policy(policy_path)),
        Commands::Demo(args) => load_policy(policy_path).and_then(|p| run_demo(args, p)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
