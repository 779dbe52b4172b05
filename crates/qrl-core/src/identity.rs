//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers that flow through the lifecycle.
//! These prevent accidental identifier confusion: an `ActorId` cannot be
//! passed where a `SessionId` is expected, and a bare string can never stand
//! in for a `RecordKey`.
//!
//! ## Ordering
//!
//! `RecordKey` derives `Ord` with the natural key compared first and the
//! version second. Batch locking sorts by this order so two sessions locking
//! overlapping record sets always acquire in the same sequence.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QrlError;

/// Maximum length of a natural key or actor identifier.
const MAX_IDENT_LEN: usize = 128;

fn validate_ident(kind: &str, raw: &str) -> Result<(), QrlError> {
    if raw.trim().is_empty() {
        return Err(QrlError::Validation(format!("{kind} must not be empty")));
    }
    if raw.len() > MAX_IDENT_LEN {
        return Err(QrlError::Validation(format!(
            "{kind} must not exceed {MAX_IDENT_LEN} characters, got {}",
            raw.len()
        )));
    }
    Ok(())
}

/// The version-independent business key shared by every member of a
/// version group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey(String);

impl NaturalKey {
    /// Create a natural key, rejecting empty or oversized values.
    pub fn new(raw: impl Into<String>) -> Result<Self, QrlError> {
        let raw = raw.into();
        validate_ident("natural key", &raw)?;
        Ok(Self(raw))
    }

    /// Access the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one record version: natural key plus version number.
///
/// Versions start at 1.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Version-independent business key.
    pub natural_key: NaturalKey,
    /// Version number within the group.
    pub version: u32,
}

impl RecordKey {
    /// Create a record key. Version 0 is rejected.
    pub fn new(natural_key: NaturalKey, version: u32) -> Result<Self, QrlError> {
        if version == 0 {
            return Err(QrlError::Validation(format!(
                "record {natural_key} version must start at 1"
            )));
        }
        Ok(Self {
            natural_key,
            version,
        })
    }

    /// The first version of a natural key.
    pub fn first(natural_key: NaturalKey) -> Self {
        Self {
            natural_key,
            version: 1,
        }
    }

    /// The key of the next version in the same group.
    pub fn with_version(&self, version: u32) -> Self {
        Self {
            natural_key: self.natural_key.clone(),
            version,
        }
    }

    /// Whether two keys belong to the same version group.
    pub fn same_group(&self, other: &RecordKey) -> bool {
        self.natural_key == other.natural_key
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.natural_key, self.version)
    }
}

/// An authenticated actor (user or service account).
///
/// Authentication happens upstream; this crate only compares identities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, QrlError> {
        let raw = raw.into();
        validate_ident("actor id", &raw)?;
        Ok(Self(raw))
    }

    /// Access the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named privilege checked through the policy surface
/// (e.g. `approve-on-behalf`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrivilegeId(String);

impl PrivilegeId {
    /// Create a privilege identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, QrlError> {
        let raw = raw.into();
        validate_ident("privilege id", &raw)?;
        Ok(Self(raw))
    }

    /// The privilege that lets an actor review on behalf of another.
    pub fn approve_on_behalf() -> Self {
        Self("approve-on-behalf".to_string())
    }

    /// Access the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrivilegeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One editing or reviewing session. Lock ownership is per session, not per
/// actor: the same actor in two windows holds two sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new random session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}
