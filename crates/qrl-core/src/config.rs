//! # Policy Configuration
//!
//! Environment-wide switches that parameterize the lifecycle:
//!
//! - **security mode**: `low` auto-authorises on submit; `high` routes every
//!   submission through inspection and enforces segregation of duties.
//! - **single active version**: at most one member of a version group may be
//!   active at a committed instant.
//! - **submit on add**: newly added records are submitted in the same action.
//!
//! `PolicyConfig` is loaded from a YAML policy file and then overlaid with
//! environment variables:
//!
//! - `QRL_SECURITY_MODE` (`low` | `high`)
//! - `QRL_SINGLE_ACTIVE_VERSION` (`true` | `false`)
//! - `QRL_SUBMIT_ON_ADD` (`true` | `false`)
//!
//! The resulting value is passed explicitly to every component.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`PolicyConfig::security_mode`].
pub const ENV_SECURITY_MODE: &str = "QRL_SECURITY_MODE";
/// Environment variable overriding [`PolicyConfig::single_active_version`].
pub const ENV_SINGLE_ACTIVE_VERSION: &str = "QRL_SINGLE_ACTIVE_VERSION";
/// Environment variable overriding [`PolicyConfig::submit_on_add`].
pub const ENV_SUBMIT_ON_ADD: &str = "QRL_SUBMIT_ON_ADD";

/// Environment-wide review strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Submit auto-authorises when no plan exists; segregation is advisory.
    Low,
    /// Submit always routes to inspection; segregation is enforced.
    High,
}

impl SecurityMode {
    /// Both modes, in declaration order.
    pub const ALL: [SecurityMode; 2] = [SecurityMode::Low, SecurityMode::High];
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::High => "high",
        })
    }
}

impl FromStr for SecurityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => Err(ConfigError::InvalidValue {
                key: ENV_SECURITY_MODE.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle policy injected into the evaluator, review delegate, succession
/// manager and transition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Review strictness.
    pub security_mode: SecurityMode,
    /// At most one active member per version group.
    pub single_active_version: bool,
    /// Newly added records are submitted in the same action.
    pub submit_on_add: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            security_mode: SecurityMode::High,
            single_active_version: true,
            submit_on_add: false,
        }
    }
}

impl PolicyConfig {
    /// Parse a policy document. Missing keys take their defaults; unknown
    /// keys are rejected.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a policy file from disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Overlay values from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Tests pass a closure over a map instead of mutating the process
    /// environment.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(ENV_SECURITY_MODE) {
            self.security_mode = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_SINGLE_ACTIVE_VERSION) {
            self.single_active_version = parse_bool(ENV_SINGLE_ACTIVE_VERSION, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SUBMIT_ON_ADD) {
            self.submit_on_add = parse_bool(ENV_SUBMIT_ON_ADD, &raw)?;
        }
        Ok(self)
    }

    /// Render as YAML, the same shape `from_yaml_str` accepts.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read policy file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("invalid policy document: {0}")]
    Parse(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}
