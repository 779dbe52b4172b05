//! # Config Subcommand
//!
//! - `check <file>` validates a policy file and prints it back normalized,
//!   with defaults filled in.
//! - `show` prints the effective policy after environment overrides.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use qrl_core::PolicyConfig;

/// Arguments for the `qrl config` subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate a policy file.
    Check {
        /// Policy YAML file.
        path: PathBuf,
    },
    /// Print the effective policy.
    Show,
}

/// Run the `config` subcommand. `effective` is the policy resolved from the
/// global `--policy` flag and the environment.
pub fn run_config(
    args: &ConfigArgs,
    effective: impl FnOnce() -> Result<PolicyConfig>,
) -> Result<u8> {
    match &args.command {
        ConfigCommand::Check { path } => {
            let policy = PolicyConfig::from_file(path)
                .with_context(|| format!("policy file {} is invalid", path.display()))?;
            tracing::info!(path = %path.display(), "policy file is valid");
            print!("{}", policy.to_yaml()?);
            Ok(0)
        }
        ConfigCommand::Show => {
            print!("{}", effective()?.to_yaml()?);
            Ok(0)
        }
    }
}
