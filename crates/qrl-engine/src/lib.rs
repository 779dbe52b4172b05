//! # qrl-engine: Transition Engine
//!
//! Orchestrates lifecycle actions: validates them against the legal-action
//! table, secures locks, mutates the record, runs version succession for
//! authorising actions, and commits everything as one transaction.
//!
//! ```text
//! UI ──ActionRequest──▶ TransitionEngine ──▶ StateEvaluator
//!                            │        └────▶ ReviewDelegate (approve/reject)
//!                            ├──▶ LockCoordinator (EditSession, ReviewSession)
//!                            ├──▶ VersionSuccessionManager
//!                            └──▶ EntityStore::commit
//! ```

pub mod edit;
pub mod engine;
pub mod error;
pub mod request;
pub mod review;
pub mod router;

pub use edit::EditSession;
pub use engine::TransitionEngine;
pub use error::{ErrorClass, TransitionError};
pub use request::{
    ActionRequest, ActorContext, Committed, ConfirmationKind, Confirmations, Operation, Prompt,
    RecordEdit, TransitionResult,
};
pub use review::{ReviewDecision, ReviewSession};
pub use router::SubmissionRouter;
