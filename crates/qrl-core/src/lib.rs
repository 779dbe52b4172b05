//! # qrl-core: Foundational Types for the Record Lifecycle
//!
//! Leaf crate of the workspace. Defines the primitives every other `qrl-*`
//! crate builds on and depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `NaturalKey`, `RecordKey`, `ActorId`,
//!    `SessionId`, `PrivilegeId`. You cannot pass an actor where a session is
//!    expected. `RecordKey` orders by natural key, then version, which is the
//!    deterministic lock acquisition order used by batch locking.
//!
//! 2. **Injected policy.** `PolicyConfig` is a plain value passed into every
//!    component. Nothing reads security mode or single-active-version from a
//!    global registry.
//!
//! 3. **UTC-only timestamps.** `Timestamp` is UTC with seconds precision, so
//!    effective-date comparisons and audit entries are unambiguous.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `qrl-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod config;
pub mod error;
pub mod identity;
pub mod temporal;

pub use config::{ConfigError, PolicyConfig, SecurityMode};
pub use error::QrlError;
pub use identity::{ActorId, NaturalKey, PrivilegeId, RecordKey, SessionId};
pub use temporal::Timestamp;
