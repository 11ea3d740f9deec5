//! Step metrics: structured `tracing` events plus in-memory aggregates.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::core::hooks::Hooks;
use crate::core::types::{AgentState, StepContext, StepResult};

#[derive(Debug, Default)]
struct Totals {
    steps_executed: u64,
    errors: u64,
    total_duration: Duration,
    per_step: BTreeMap<String, (u64, Duration)>,
}

/// Serializable view of the collected metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub steps_executed: u64,
    pub errors: u64,
    pub total_duration_ms: u64,
    pub per_step: BTreeMap<String, StepStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepStats {
    pub count: u64,
    pub total_ms: u64,
    pub avg_ms: u64,
}

/// Hook provider owning the step-start, step-end and error slots.
#[derive(Clone, Default)]
pub struct StepMetrics {
    totals: Arc<Mutex<Totals>>,
}

impl StepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Totals> {
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fill the `on_step_start`, `on_step_end` and `on_error` slots.
    ///
    /// Installing a [`SessionRecorder`](super::session_store::SessionRecorder)
    /// afterwards replaces the step slots. To keep both, call the handler
    /// methods from one composed hook instead.
    pub fn install(&self, hooks: Hooks) -> Hooks {
        let on_end = self.clone();
        let on_error = self.clone();
        hooks
            .on_step_start(|state, context| {
                Self::step_started(state, context);
                Ok(())
            })
            .on_step_end(move |state, result| {
                on_end.step_ended(state, result);
                Ok(())
            })
            .on_error(move |state, err, context| {
                on_error.error_occurred(state, err, context);
                Ok(())
            })
    }

    pub fn step_started(state: &AgentState, context: &StepContext) {
        info!(
            event = "step_start",
            agent_id = %state.agent_id,
            session_id = %state.session_id,
            step = %context.step_name,
            "step started"
        );
    }

    pub fn step_ended(&self, state: &AgentState, result: &StepResult) {
        info!(
            event = "step_end",
            agent_id = %state.agent_id,
            session_id = %state.session_id,
            step = %result.step_name,
            success = result.success,
            duration_ms = result.duration.as_millis() as u64,
            "step ended"
        );
        self.record_step(&result.step_name, result.duration);
    }

    pub fn error_occurred(&self, state: &AgentState, err: &anyhow::Error, context: &str) {
        error!(
            event = "error_occurred",
            agent_id = %state.agent_id,
            session_id = %state.session_id,
            context,
            error = %format!("{err:#}"),
            "error occurred"
        );
        self.lock().errors += 1;
    }

    fn record_step(&self, step_name: &str, duration: Duration) {
        let mut totals = self.lock();
        totals.steps_executed += 1;
        totals.total_duration += duration;
        let entry = totals
            .per_step
            .entry(step_name.to_string())
            .or_insert((0, Duration::ZERO));
        entry.0 += 1;
        entry.1 += duration;
    }

    pub fn summary(&self) -> MetricsSummary {
        let totals = self.lock();
        let per_step = totals
            .per_step
            .iter()
            .map(|(name, (count, total))| {
                let total_ms = total.as_millis() as u64;
                let stats = StepStats {
                    count: *count,
                    total_ms,
                    avg_ms: total_ms / (*count).max(1),
                };
                (name.clone(), stats)
            })
            .collect();
        MetricsSummary {
            steps_executed: totals.steps_executed,
            errors: totals.errors,
            total_duration_ms: totals.total_duration.as_millis() as u64,
            per_step,
        }
    }
}
