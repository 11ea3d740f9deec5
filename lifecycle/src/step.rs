//! Step executor: runs one named unit of work inside start/end/error hooks.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::types::{StepContext, StepError, StepInputs, StepResult};
use crate::run::{AgentRun, ensure_name};

impl AgentRun {
    /// Execute a step with no inputs. See [`AgentRun::execute_step_with`].
    pub fn execute_step<T, F>(&self, step_name: &str, step_fn: F) -> Result<T>
    where
        T: Serialize,
        F: FnOnce(&StepContext) -> Result<T>,
    {
        self.execute_step_with(step_name, StepInputs::new(), step_fn)
    }

    /// Execute one step and return its output.
    ///
    /// Hook order is `on_step_start`, body, `on_step_end`, and on failure
    /// `on_error`. A failing start hook aborts before the body runs and skips the
    /// end hook. After a successful body, an end-hook failure is returned. After
    /// a failed body, end/error hook failures are logged and the body's own error
    /// is returned unchanged.
    ///
    /// The output is converted to JSON only when an end hook is registered; if
    /// that conversion fails the step counts as failed.
    #[instrument(skip_all, fields(step = step_name))]
    pub fn execute_step_with<T, F>(
        &self,
        step_name: &str,
        inputs: StepInputs,
        step_fn: F,
    ) -> Result<T>
    where
        T: Serialize,
        F: FnOnce(&StepContext) -> Result<T>,
    {
        ensure_name(step_name, "step")?;
        let context = StepContext::new(step_name, inputs);

        // The step counts as entered only once the start hook has accepted it.
        if let Some(hook) = &self.hooks.on_step_start {
            debug!("dispatching on_step_start");
            hook(&self.step_state(step_name), &context)?;
        }
        self.progress.enter_step(step_name);

        let started = Instant::now();
        let outcome = step_fn(&context);
        let duration = started.elapsed();

        let output = match outcome {
            Ok(output) => output,
            Err(err) => return Err(self.report_step_failure(step_name, err, duration)),
        };

        if let Some(hook) = &self.hooks.on_step_end {
            let value = match serde_json::to_value(&output)
                .with_context(|| format!("serialize output of step '{step_name}'"))
            {
                Ok(value) => value,
                Err(err) => return Err(self.report_step_failure(step_name, err, duration)),
            };
            debug!(duration_ms = duration.as_millis() as u64, "dispatching on_step_end");
            hook(
                &self.step_state(step_name),
                &StepResult::succeeded(step_name, value, duration),
            )?;
        }
        Ok(output)
    }

    /// Notify end/error hooks about a failed step and hand back the original error.
    fn report_step_failure(
        &self,
        step_name: &str,
        err: anyhow::Error,
        duration: Duration,
    ) -> anyhow::Error {
        debug!(error = %format!("{err:#}"), "step failed");

        if let Some(hook) = &self.hooks.on_step_end {
            let result = StepResult::failed(step_name, StepError::from_anyhow(&err), duration);
            if let Err(hook_err) = hook(&self.step_state(step_name), &result) {
                warn!(
                    error = %format!("{hook_err:#}"),
                    "on_step_end failed after step failure; reporting the step failure"
                );
            }
        }

        if let Some(hook) = &self.hooks.on_error {
            if let Err(hook_err) = hook(&self.step_state(step_name), &err, step_name) {
                warn!(
                    error = %format!("{hook_err:#}"),
                    "on_error failed; reporting the step failure"
                );
            }
        }

        err
    }
}
