//! Lifecycle actions a caller can request against a record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A user-initiated lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Create the first version of a new natural key.
    Add,
    /// Edit the record's fields.
    Modify,
    /// Read-only view.
    Display,
    /// Start a new group from this record's content.
    Copy,
    /// Start the next version of this record's group.
    NewVersion,
    /// Flag the record (and its children) as removed.
    Remove,
    /// Clear the removal flag.
    Restore,
    /// Send a draft for review.
    Submit,
    /// Send a rejected record back for review.
    Resubmit,
    /// Accept the record under inspection.
    Approve,
    /// Decline the record under inspection.
    Reject,
    /// Withdraw a rejected record.
    Cancel,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 12] = [
        Action::Add,
        Action::Modify,
        Action::Display,
        Action::Copy,
        Action::NewVersion,
        Action::Remove,
        Action::Restore,
        Action::Submit,
        Action::Resubmit,
        Action::Approve,
        Action::Reject,
        Action::Cancel,
    ];

    /// Actions that are not gated by approval state.
    pub fn is_ungated(&self) -> bool {
        matches!(self, Self::Add | Self::Copy | Self::Display)
    }

    /// Actions that decide an inspection.
    pub fn is_review_decision(&self) -> bool {
        matches!(self, Self::Approve | Self::Reject)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Display => "display",
            Self::Copy => "copy",
            Self::NewVersion => "new-version",
            Self::Remove => "remove",
            Self::Restore => "restore",
            Self::Submit => "submit",
            Self::Resubmit => "resubmit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.to_string() == s)
            .ok_or_else(|| format!("unknown action {s:?}"))
    }
}

/// An ordered set of legal actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the action is in the set.
    pub fn contains(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    /// Add an action.
    pub fn insert(&mut self, action: Action) {
        self.0.insert(action);
    }

    /// Whether no action is legal.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of legal actions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }
}

impl<const N: usize> From<[Action; N]> for ActionSet {
    fn from(actions: [Action; N]) -> Self {
        Self(actions.into_iter().collect())
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for ActionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.iter().map(|a| a.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
