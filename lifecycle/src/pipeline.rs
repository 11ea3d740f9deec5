//! Demo agent pipeline behind `lifecycle run`.
//!
//! `plan` → checkpoint `plan_ready` → `execute` → `finalize` → checkpoint
//! `output_ready`. Interrupt decisions are honored at step boundaries, and a
//! resumed session skips the steps it already completed. A checkpoint is
//! offered again on resume unless the step it guards has already run.

use std::thread;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::core::hooks::Hooks;
use crate::core::types::{InterruptDecision, StepContext, StepInputs};
use crate::error::LifecycleError;
use crate::interrupt::reasons;
use crate::io::approval::ApprovalGate;
use crate::io::metrics::StepMetrics;
use crate::io::session_store::{SessionRecorder, SessionStatus};
use crate::run::AgentRun;

pub const PLAN: &str = "plan";
pub const EXECUTE: &str = "execute";
pub const FINALIZE: &str = "finalize";
pub const PLAN_READY: &str = "plan_ready";
pub const OUTPUT_READY: &str = "output_ready";

/// Knobs for exercising interrupts and failures from the CLI.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Send a `user_interrupt` from another thread once this step ends.
    pub pause_after: Option<String>,
    /// Make this step fail.
    pub fail_at: Option<String>,
}

/// Why the pipeline stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineStop {
    Completed { output: Value },
    Paused { after: String },
    Aborted { after: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub session_id: String,
    pub steps_executed: u32,
    pub steps_skipped: u32,
    #[serde(flatten)]
    pub stop: PipelineStop,
}

/// Raised inside the run body to leave it at a step boundary.
#[derive(Debug, thiserror::Error)]
#[error("run stopped after '{after}' ({decision}): {reason}")]
struct StopRequested {
    decision: InterruptDecision,
    after: String,
    reason: String,
}

/// Hooks wiring a recorder, metrics and an approval gate into one run.
///
/// Recorder and metrics both observe steps, so their handlers share the step
/// slots here instead of being installed one after the other.
pub fn demo_hooks(recorder: &SessionRecorder, metrics: &StepMetrics, gate: &ApprovalGate) -> Hooks {
    let (rec_start, rec_end, rec_interrupt) = (recorder.clone(), recorder.clone(), recorder.clone());
    let (metrics_end, metrics_error) = (metrics.clone(), metrics.clone());
    let hooks = Hooks::new()
        .on_step_start(move |state, context| {
            StepMetrics::step_started(state, context);
            rec_start.step_started(&context.step_name)
        })
        .on_step_end(move |state, result| {
            metrics_end.step_ended(state, result);
            rec_end.step_ended(result)
        })
        .on_error(move |state, err, context| {
            metrics_error.error_occurred(state, err, context);
            Ok(())
        })
        .on_interrupt_signal(move |_, reason, _| rec_interrupt.interrupted(reason));
    gate.install(hooks)
}

/// Drive the pipeline for `task` on `run`, persisting progress via `recorder`.
///
/// A paused session is resumed first; a completed one is reported without
/// running anything; an aborted one is refused.
pub fn run_pipeline(
    run: &AgentRun,
    recorder: &SessionRecorder,
    task: &str,
    options: &PipelineOptions,
) -> Result<PipelineOutcome> {
    let record = recorder.record();
    match record.status {
        SessionStatus::Paused => {
            recorder.resume()?;
        }
        SessionStatus::Completed => {
            let total = record.completed_steps.len() as u32;
            return Ok(PipelineOutcome {
                session_id: record.session_id,
                steps_executed: 0,
                steps_skipped: total,
                stop: PipelineStop::Completed {
                    output: recorder.step_output(FINALIZE).unwrap_or(Value::Null),
                },
            });
        }
        SessionStatus::Aborted => {
            bail!(
                "session '{}' was aborted; start a new session",
                record.session_id
            );
        }
        SessionStatus::InProgress => {}
    }

    let mut pipeline = Pipeline {
        run,
        recorder,
        task,
        options,
        executed: 0,
        skipped: 0,
    };
    let result = run.execute(task, |_| pipeline.drive());

    let stop = match result {
        Ok(output) => PipelineStop::Completed { output },
        Err(err) => match err.downcast_ref::<StopRequested>() {
            Some(stop) if stop.decision == InterruptDecision::Pause => PipelineStop::Paused {
                after: stop.after.clone(),
            },
            Some(stop) => PipelineStop::Aborted {
                after: stop.after.clone(),
                reason: stop.reason.clone(),
            },
            None => return Err(err),
        },
    };
    info!(session_id = %run.session_id(), ?stop, "pipeline stopped");
    Ok(PipelineOutcome {
        session_id: run.session_id().to_string(),
        steps_executed: pipeline.executed,
        steps_skipped: pipeline.skipped,
        stop,
    })
}

struct Pipeline<'a> {
    run: &'a AgentRun,
    recorder: &'a SessionRecorder,
    task: &'a str,
    options: &'a PipelineOptions,
    executed: u32,
    skipped: u32,
}

impl Pipeline<'_> {
    fn drive(&mut self) -> Result<Value> {
        let task = self.task.to_string();
        let plan = self.step(PLAN, inputs([("task", json!(task))]), |ctx| {
            let task = ctx.input("task").and_then(Value::as_str).unwrap_or_default();
            Ok(json!({
                "task": task,
                "steps": ["gather context", "draft answer", "review draft"],
            }))
        })?;
        if !self.recorder.record().is_completed(EXECUTE) {
            self.checkpoint(PLAN_READY, &plan)?;
        }

        let results = self.step(EXECUTE, inputs([("plan", plan)]), |ctx| {
            let steps = ctx
                .input("plan")
                .and_then(|plan| plan.get("steps"))
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("plan has no steps"))?;
            let done: Vec<Value> = steps
                .iter()
                .filter_map(Value::as_str)
                .map(|step| json!(format!("done: {step}")))
                .collect();
            Ok(json!({ "results": done }))
        })?;

        let summary = self.step(
            FINALIZE,
            inputs([("task", json!(task)), ("results", results)]),
            |ctx| {
                let count = ctx
                    .input("results")
                    .and_then(|r| r.get("results"))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                let task = ctx.input("task").and_then(Value::as_str).unwrap_or_default();
                Ok(json!({ "summary": format!("{task}: {count} planned steps completed") }))
            },
        )?;
        self.checkpoint(OUTPUT_READY, &summary)?;

        self.recorder.set_status(SessionStatus::Completed)?;
        Ok(summary)
    }

    /// Run one step unless the session already completed it, in which case
    /// its recorded output is returned.
    fn step<F>(&mut self, name: &str, step_inputs: StepInputs, body: F) -> Result<Value>
    where
        F: FnOnce(&StepContext) -> Result<Value>,
    {
        if self.recorder.record().is_completed(name) {
            info!(step = name, "already completed; skipping");
            self.skipped += 1;
            return Ok(self.recorder.step_output(name).unwrap_or(Value::Null));
        }

        let fail = self.options.fail_at.as_deref() == Some(name);
        let outcome = self.run.execute_step_with(name, step_inputs, |ctx| {
            if fail {
                bail!("simulated failure in step '{}'", ctx.step_name);
            }
            body(ctx)
        });
        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                let reason = format!("{err:#}");
                let data = json!({ "step": name, "error": reason });
                let decision = self.run.send_interrupt(reasons::ERROR, &data)?;
                if decision.stops_run() {
                    return Err(StopRequested {
                        decision,
                        after: name.to_string(),
                        reason,
                    }
                    .into());
                }
                return Err(err);
            }
        };
        self.executed += 1;

        if self.options.pause_after.as_deref() == Some(name) {
            let run = self.run;
            let data = json!({ "after": name });
            thread::scope(|scope| {
                scope
                    .spawn(|| run.send_interrupt(reasons::USER_INTERRUPT, &data))
                    .join()
                    .map_err(|_| anyhow!("interrupt sender panicked"))?
            })?;
        }
        self.boundary(name)?;
        Ok(output)
    }

    /// Stop here if an interrupt paused or aborted the session.
    fn boundary(&self, after: &str) -> Result<()> {
        let decision = match self.recorder.record().status {
            SessionStatus::Paused => InterruptDecision::Pause,
            SessionStatus::Aborted => InterruptDecision::Abort,
            _ => return Ok(()),
        };
        Err(StopRequested {
            decision,
            after: after.to_string(),
            reason: "interrupt received".to_string(),
        }
        .into())
    }

    fn checkpoint(&self, name: &str, data: &Value) -> Result<()> {
        match self.run.offer_checkpoint(name, data) {
            Ok(()) => Ok(()),
            Err(err) if LifecycleError::is_checkpoint_rejected(&err) => {
                self.recorder.set_status(SessionStatus::Aborted)?;
                Err(StopRequested {
                    decision: InterruptDecision::Abort,
                    after: name.to_string(),
                    reason: format!("{err:#}"),
                }
                .into())
            }
            Err(err) => Err(err),
        }
    }
}

fn inputs<const N: usize>(pairs: [(&str, Value); N]) -> StepInputs {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
