//! # qrl-store: Entity Store Boundary and Locks
//!
//! The lifecycle treats persistence as an external collaborator. This crate
//! defines what it needs from one and ships an in-memory implementation:
//!
//! - [`entity`]: the [`EntityStore`] trait, queries and transactions.
//! - [`schema`]: per-type capabilities ([`SchemaCatalog`]).
//! - [`lock`]: the [`LockCoordinator`] issuing exclusive per-record locks.
//! - [`memory`]: [`InMemoryStore`] with optimistic revisions and commit
//!   fault injection.
//! - [`privileges`]: [`StaticPrivileges`], a fixed privilege table.

pub mod entity;
pub mod error;
pub mod lock;
pub mod memory;
pub mod privileges;
pub mod schema;

pub use entity::{EntityStore, LockOutcome, RecordQuery, Transaction};
pub use error::StoreError;
pub use lock::{LockCoordinator, LockDenied, LockGuard, LockMode, LockToken};
pub use memory::InMemoryStore;
pub use privileges::StaticPrivileges;
pub use qrl_state::PrivilegeChecker;
pub use schema::{RecordSchema, SchemaCatalog, StaticSchemaCatalog};
