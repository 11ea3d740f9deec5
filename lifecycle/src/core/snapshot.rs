//! Thread-safe run progress and the [`AgentState`] snapshots built from it.
//!
//! The current step name is the only value that changes during a run. It is
//! stored as an immutable `Arc<str>` that is swapped wholesale under a lock, so
//! a reader on another thread sees either the previous name or the next one.

use std::sync::{Arc, PoisonError, RwLock};

use crate::core::types::{AgentState, Metadata};

/// Identity fields fixed at run start.
#[derive(Debug, Clone, PartialEq)]
pub struct RunIdentity {
    pub agent_id: String,
    pub session_id: String,
    pub metadata: Metadata,
}

/// Mutable progress of a run, shared with interrupt senders.
#[derive(Debug)]
pub struct RunProgress {
    identity: RunIdentity,
    current_step: RwLock<Arc<str>>,
}

impl RunProgress {
    pub fn new(identity: RunIdentity) -> Self {
        Self {
            identity,
            current_step: RwLock::new(Arc::from("")),
        }
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Name of the step in progress (empty before the first step).
    pub fn current_step(&self) -> Arc<str> {
        // The guarded value is an immutable Arc, so a poisoned lock still holds a whole name.
        let guard = self
            .current_step
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swap in a new current step. Only the step executor calls this.
    pub(crate) fn enter_step(&self, step_name: &str) {
        let next: Arc<str> = Arc::from(step_name);
        let mut guard = self
            .current_step
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = next;
    }

    /// Build a snapshot reflecting progress at the moment of the call.
    pub fn snapshot(&self) -> AgentState {
        let current_step = self.current_step();
        build_state(&self.identity, &current_step)
    }
}

/// Assemble an [`AgentState`] from identity fields and a step name.
///
/// Pure: the returned value owns all of its data.
pub fn build_state(identity: &RunIdentity, current_step: &str) -> AgentState {
    AgentState {
        agent_id: identity.agent_id.clone(),
        session_id: identity.session_id.clone(),
        current_step: current_step.to_string(),
        metadata: identity.metadata.clone(),
    }
}
