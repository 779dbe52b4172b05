//! # qrl-cli: Command-Line Interface for the Record Lifecycle
//!
//! Provides the `qrl` binary.
//!
//! ## Subcommands
//!
//! - `qrl actions`: print the legal-action table for a policy.
//! - `qrl config`: validate a policy file or show the effective policy.
//! - `qrl demo`: run a complete lifecycle against the in-memory store.
//!
//! Every subcommand resolves its policy the same way: the file given with
//! `--policy` (or the defaults), overlaid with `QRL_*` environment
//! variables.
//!
//! ```bash
//! qrl actions --policy policy.yaml
//! QRL_SECURITY_MODE=low qrl demo -v
//! qrl config check policy.yaml
//! ```

pub mod actions;
pub mod config;
pub mod demo;

use std::path::Path;

use anyhow::{Context, Result};
use qrl_core::PolicyConfig;

/// Resolve the effective policy: file (or defaults) plus environment
/// overrides.
pub fn load_policy(path: Option<&Path>) -> Result<PolicyConfig> {
    let base = match path {
        Some(path) => PolicyConfig::from_file(path)
            .with_context(|| format!("loading policy from {}", path.display()))?,
        None => PolicyConfig::default(),
    };
    base.with_env_overrides()
        .context("applying QRL_* environment overrides")
}

/// Output format shared by the reporting subcommands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON document.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrl_core::SecurityMode;

    #[test]
    fn policy_file_keys_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, "security_mode: low\nsubmit_on_add: true\n").unwrap();

        let policy = PolicyConfig::from_file(&path).unwrap();
        assert_eq!(policy.security_mode, SecurityMode::Low);
        assert!(policy.submit_on_add);
        assert!(policy.single_active_version);
    }

    #[test]
    fn load_policy_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let err = load_policy(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("absent.yaml"));
    }

    #[test]
    fn public_modules_are_accessible() {
        let _ = std::any::type_name::<actions::ActionsArgs>();
        let _ = std::any::type_name::<config::ConfigArgs>();
        let _ = std::any::type_name::<demo::DemoArgs>();
    }
}
