//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use qrl_core::{ActorId, NaturalKey, PolicyConfig, PrivilegeId, RecordKey, SecurityMode};
use qrl_engine::{ActionRequest, ActorContext, TransitionEngine, TransitionResult};
use qrl_state::{InspectionAssignment, InspectionPlan, Record};
use qrl_store::{
    EntityStore, InMemoryStore, RecordQuery, RecordSchema, StaticPrivileges, StaticSchemaCatalog,
};

/// An engine over a fresh in-memory store.
pub struct World {
    pub engine: TransitionEngine,
    pub store: InMemoryStore,
    pub privileges: Arc<StaticPrivileges>,
}

impl World {
    pub fn new(policy: PolicyConfig) -> Self {
        let store = InMemoryStore::new();
        let privileges = Arc::new(StaticPrivileges::new());
        let schemas = StaticSchemaCatalog::new()
            .with(RecordSchema::new("sop").removable())
            .with(RecordSchema::new("memo"));
        let engine = TransitionEngine::new(
            policy,
            Arc::new(store.clone()),
            Arc::new(schemas),
            privileges.clone(),
        );
        Self {
            engine,
            store,
            privileges,
        }
    }

    /// A second engine sharing this world's store, as another client
    /// process would.
    pub fn peer_engine(&self) -> TransitionEngine {
        TransitionEngine::new(
            *self.engine.policy(),
            Arc::new(self.store.clone()),
            Arc::new(StaticSchemaCatalog::new().with(RecordSchema::new("sop").removable())),
            self.privileges.clone(),
        )
    }

    pub fn grant_delegation(&self, actor: &str) {
        self.privileges
            .grant(actor_id(actor), PrivilegeId::approve_on_behalf());
    }

    /// Perform a request, answering every prompt with `answer`.
    pub fn perform(
        &self,
        request: ActionRequest,
        ctx: &ActorContext,
        answer: bool,
    ) -> Result<TransitionResult, qrl_engine::TransitionError> {
        let mut request = request;
        loop {
            match self.engine.request_action(&request, ctx)? {
                TransitionResult::ConfirmationRequired(prompts) => {
                    for prompt in prompts {
                        request = request.confirm(prompt.kind, answer);
                    }
                }
                other => return Ok(other),
            }
        }
    }

    /// Add a draft, returning its key.
    pub fn add(&self, record: Record, ctx: &ActorContext) -> RecordKey {
        let key = record.key.clone();
        self.engine
            .request_action(&ActionRequest::add(record), ctx)
            .unwrap();
        key
    }

    pub fn stored(&self, key: &RecordKey) -> Record {
        self.store.get(key).unwrap().unwrap()
    }

    pub fn group(&self, nk: &str) -> Vec<Record> {
        self.store
            .select(&RecordQuery::group(NaturalKey::new(nk).unwrap()))
            .unwrap()
    }

    pub fn active_count(&self, nk: &str) -> usize {
        self.group(nk).iter().filter(|r| r.is_active()).count()
    }
}

pub fn policy(security_mode: SecurityMode) -> PolicyConfig {
    PolicyConfig {
        security_mode,
        ..PolicyConfig::default()
    }
}

pub fn actor_id(name: &str) -> ActorId {
    ActorId::new(name).unwrap()
}

pub fn ctx(name: &str) -> ActorContext {
    ActorContext::new(actor_id(name))
}

pub fn key(nk: &str, version: u32) -> RecordKey {
    RecordKey::first(NaturalKey::new(nk).unwrap()).with_version(version)
}

/// A plan assigning each named actor.
pub fn plan_for(reviewers: &[&str]) -> InspectionPlan {
    InspectionPlan {
        assignments: reviewers
            .iter()
            .map(|r| InspectionAssignment::actor(actor_id(r)))
            .collect(),
        ..InspectionPlan::default()
    }
}

pub fn sop(nk: &str) -> Record {
    Record::draft(key(nk, 1), "sop")
}
