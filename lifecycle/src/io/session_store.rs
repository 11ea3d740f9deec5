//! Session records persisted as `<state_dir>/<session_id>.json`.
//!
//! [`SessionRecorder`] keeps a record current through lifecycle hooks so a
//! paused run can be resumed later, skipping steps that already completed.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::hooks::Hooks;
use crate::core::types::{InterruptDecision, StepResult};
use crate::interrupt::reasons;
use crate::run::validate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Paused,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step_name: String,
    pub completed_at: String,
    pub duration_ms: u64,
}

/// Persisted progress of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub agent_id: String,
    pub status: SessionStatus,
    pub started_at: String,
    /// Step currently running, if any.
    pub current_step: Option<String>,
    pub completed_steps: Vec<CompletedStep>,
    /// Output of each completed step, keyed by step name (last run wins).
    pub step_outputs: BTreeMap<String, Value>,
    pub paused_at: Option<String>,
    pub resumed_at: Option<String>,
}

impl SessionRecord {
    pub fn new(session_id: &str, agent_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            status: SessionStatus::InProgress,
            started_at: now(),
            current_step: None,
            completed_steps: Vec::new(),
            step_outputs: BTreeMap::new(),
            paused_at: None,
            resumed_at: None,
        }
    }

    pub fn is_completed(&self, step_name: &str) -> bool {
        self.completed_steps
            .iter()
            .any(|step| step.step_name == step_name)
    }
}

/// Path of the record for `session_id` under `state_dir`.
pub fn session_path(state_dir: &Path, session_id: &str) -> Result<PathBuf> {
    validate_id(session_id).context("session id")?;
    Ok(state_dir.join(format!("{session_id}.json")))
}

pub fn load_session(path: &Path) -> Result<SessionRecord> {
    debug!(path = %path.display(), "loading session record");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read session {}", path.display()))?;
    let record: SessionRecord = serde_json::from_str(&contents)
        .with_context(|| format!("parse session {}", path.display()))?;
    Ok(record)
}

pub fn write_session(path: &Path, record: &SessionRecord) -> Result<()> {
    debug!(path = %path.display(), status = ?record.status, "writing session record");
    let mut buf = serde_json::to_string_pretty(record)?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

struct Inner {
    path: PathBuf,
    record: SessionRecord,
}

impl Inner {
    fn save(&self) -> Result<()> {
        write_session(&self.path, &self.record)
    }
}

/// Hook provider that mirrors run progress into a [`SessionRecord`].
#[derive(Clone)]
pub struct SessionRecorder {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("SessionRecorder")
            .field("path", &inner.path)
            .field("session_id", &inner.record.session_id)
            .field("status", &inner.record.status)
            .finish()
    }
}

impl SessionRecorder {
    /// Load the record for `session_id`, or create and persist a fresh one.
    pub fn open(state_dir: &Path, session_id: &str, agent_id: &str) -> Result<Self> {
        let path = session_path(state_dir, session_id)?;
        let record = if path.exists() {
            let record = load_session(&path)?;
            if record.agent_id != agent_id {
                return Err(anyhow!(
                    "session '{session_id}' belongs to agent '{}', not '{agent_id}'",
                    record.agent_id
                ));
            }
            record
        } else {
            let record = SessionRecord::new(session_id, agent_id);
            write_session(&path, &record)?;
            record
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { path, record })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    pub fn record(&self) -> SessionRecord {
        self.lock().record.clone()
    }

    pub fn completed_steps(&self) -> Vec<String> {
        self.lock()
            .record
            .completed_steps
            .iter()
            .map(|step| step.step_name.clone())
            .collect()
    }

    pub fn step_output(&self, step_name: &str) -> Option<Value> {
        self.lock().record.step_outputs.get(step_name).cloned()
    }

    /// Move a paused session back to in-progress.
    pub fn resume(&self) -> Result<SessionRecord> {
        let mut inner = self.lock();
        if inner.record.status != SessionStatus::Paused {
            return Err(anyhow!(
                "cannot resume session '{}': status is {:?}, expected paused",
                inner.record.session_id,
                inner.record.status
            ));
        }
        inner.record.status = SessionStatus::InProgress;
        inner.record.resumed_at = Some(now());
        inner.save()?;
        info!(session_id = %inner.record.session_id, "session resumed");
        Ok(inner.record.clone())
    }

    /// Record a terminal or paused status.
    pub fn set_status(&self, status: SessionStatus) -> Result<()> {
        let mut inner = self.lock();
        inner.record.status = status;
        if status == SessionStatus::Paused && inner.record.paused_at.is_none() {
            inner.record.paused_at = Some(now());
        }
        inner.save()
    }

    /// Fill the step-start, step-end and interrupt slots of `hooks`.
    ///
    /// The handlers are also public so they can share a slot with another
    /// provider inside one composed hook.
    pub fn install(&self, hooks: Hooks) -> Hooks {
        let on_start = self.clone();
        let on_end = self.clone();
        let on_interrupt = self.clone();
        hooks
            .on_step_start(move |_, context| on_start.step_started(&context.step_name))
            .on_step_end(move |_, result| on_end.step_ended(result))
            .on_interrupt_signal(move |_, reason, _| on_interrupt.interrupted(reason))
    }

    pub fn step_started(&self, step_name: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record.current_step = Some(step_name.to_string());
        inner.save()
    }

    /// Failed steps leave the record untouched.
    pub fn step_ended(&self, result: &StepResult) -> Result<()> {
        if !result.success {
            return Ok(());
        }
        let mut inner = self.lock();
        inner.record.completed_steps.push(CompletedStep {
            step_name: result.step_name.clone(),
            completed_at: now(),
            duration_ms: result.duration.as_millis() as u64,
        });
        if let Some(output) = &result.output {
            inner
                .record
                .step_outputs
                .insert(result.step_name.clone(), output.clone());
        }
        inner.record.current_step = None;
        inner.save()
    }

    /// `user_interrupt` pauses, `error` aborts, anything else continues.
    pub fn interrupted(&self, reason: &str) -> Result<Value> {
        let decision = match reason {
            reasons::USER_INTERRUPT => InterruptDecision::Pause,
            reasons::ERROR => InterruptDecision::Abort,
            _ => return Ok(InterruptDecision::Continue.reply()),
        };
        let mut inner = self.lock();
        match decision {
            InterruptDecision::Pause => {
                inner.record.status = SessionStatus::Paused;
                inner.record.paused_at = Some(now());
            }
            _ => inner.record.status = SessionStatus::Aborted,
        }
        inner.save()?;
        info!(
            session_id = %inner.record.session_id,
            completed = inner.record.completed_steps.len(),
            %decision,
            "session state saved after interrupt"
        );
        Ok(decision.reply())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}
