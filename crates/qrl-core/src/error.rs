//! # Error Types: Structured Error Hierarchy
//!
//! Crate-level errors for the core primitives. Domain crates define their
//! own `thiserror` enums (`StoreError`, `SuccessionError`, `TransitionError`)
//! and convert into or wrap these where a primitive fails.

use thiserror::Error;

use crate::config::ConfigError;

/// Top-level error type for core primitives.
#[derive(Error, Debug)]
pub enum QrlError {
    /// An identifier or timestamp failed validation at construction.
    #[error("validation error: {0}")]
    Validation(String),

    /// Policy configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Stored data violates a lifecycle invariant.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
