//! A fixed privilege table for tests and the CLI demo.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use qrl_core::{ActorId, PrivilegeId};
use qrl_state::{PrivilegeChecker, Record};

/// Grants held in memory. Record scoping is ignored.
#[derive(Debug, Default)]
pub struct StaticPrivileges {
    grants: RwLock<HashMap<ActorId, HashSet<PrivilegeId>>>,
}

impl StaticPrivileges {
    /// No grants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a privilege.
    pub fn grant(&self, actor: ActorId, privilege: PrivilegeId) {
        self.grants.write().entry(actor).or_default().insert(privilege);
    }

    /// Revoke a privilege. Returns whether it was held.
    pub fn revoke(&self, actor: &ActorId, privilege: &PrivilegeId) -> bool {
        self.grants
            .write()
            .get_mut(actor)
            .is_some_and(|held| held.remove(privilege))
    }
}

impl PrivilegeChecker for StaticPrivileges {
    fn check_privilege(
        &self,
        actor: &ActorId,
        privilege: &PrivilegeId,
        _record: Option<&Record>,
    ) -> bool {
        self.grants
            .read()
            .get(actor)
            .is_some_and(|held| held.contains(privilege))
    }
}
