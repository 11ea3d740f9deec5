//! Hook registry: at most one callback per lifecycle extension point.
//!
//! A [`Hooks`] value is assembled before a run starts and handed to
//! [`AgentRun`](crate::run::AgentRun), which only ever reads it. Changing hooks
//! means starting a new run.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::core::types::{AgentState, StepContext, StepResult};

pub type StepStartHook = dyn Fn(&AgentState, &StepContext) -> Result<()> + Send + Sync;
pub type StepEndHook = dyn Fn(&AgentState, &StepResult) -> Result<()> + Send + Sync;
/// Receives the task description the run was started with.
pub type ExecuteStartHook = dyn Fn(&AgentState, &str) -> Result<()> + Send + Sync;
/// Receives the run's final output.
pub type ExecuteEndHook = dyn Fn(&AgentState, &Value) -> Result<()> + Send + Sync;
/// Receives `(state, reason, data)` and returns a raw decision value.
pub type InterruptHook = dyn Fn(&AgentState, &str, &Value) -> Result<Value> + Send + Sync;
/// Receives `(state, error, context)`; `context` names where the error surfaced.
pub type ErrorHook = dyn Fn(&AgentState, &anyhow::Error, &str) -> Result<()> + Send + Sync;
/// Receives `(state, checkpoint_name, data)`; returning `Ok` approves.
pub type CheckpointHook = dyn Fn(&AgentState, &str, &Value) -> Result<()> + Send + Sync;

/// The optional callback set a run is configured with.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) on_step_start: Option<Arc<StepStartHook>>,
    pub(crate) on_step_end: Option<Arc<StepEndHook>>,
    pub(crate) before_execute: Option<Arc<ExecuteStartHook>>,
    pub(crate) after_execute: Option<Arc<ExecuteEndHook>>,
    pub(crate) on_interrupt_signal: Option<Arc<InterruptHook>>,
    pub(crate) on_error: Option<Arc<ErrorHook>>,
    pub(crate) on_checkpoint_opportunity: Option<Arc<CheckpointHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_step_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AgentState, &StepContext) -> Result<()> + Send + Sync + 'static,
    {
        self.on_step_start = Some(Arc::new(hook));
        self
    }

    pub fn on_step_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AgentState, &StepResult) -> Result<()> + Send + Sync + 'static,
    {
        self.on_step_end = Some(Arc::new(hook));
        self
    }

    pub fn before_execute<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AgentState, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.before_execute = Some(Arc::new(hook));
        self
    }

    pub fn after_execute<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AgentState, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.after_execute = Some(Arc::new(hook));
        self
    }

    pub fn on_interrupt_signal<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AgentState, &str, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.on_interrupt_signal = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AgentState, &anyhow::Error, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn on_checkpoint_opportunity<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AgentState, &str, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.on_checkpoint_opportunity = Some(Arc::new(hook));
        self
    }

    /// Names of the extension points that have a callback, in declaration order.
    pub fn registered(&self) -> Vec<&'static str> {
        let slots = [
            ("on_step_start", self.on_step_start.is_some()),
            ("on_step_end", self.on_step_end.is_some()),
            ("before_execute", self.before_execute.is_some()),
            ("after_execute", self.after_execute.is_some()),
            ("on_interrupt_signal", self.on_interrupt_signal.is_some()),
            ("on_error", self.on_error.is_some()),
            (
                "on_checkpoint_opportunity",
                self.on_checkpoint_opportunity.is_some(),
            ),
        ];
        slots
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("registered", &self.registered())
            .finish()
    }
}
