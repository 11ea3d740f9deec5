//! A single agent run: identity, hooks, and the run-level bracket.
//!
//! A run is identified by a `session_id` assigned at start. The step executor
//! ([`crate::step`]), checkpoint coordinator ([`crate::checkpoint`]) and
//! interrupt channel ([`crate::interrupt`]) are methods on [`AgentRun`]; all of
//! them take `&self`, so a run can be shared with interrupt senders through an
//! `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::hooks::Hooks;
use crate::core::snapshot::{RunIdentity, RunProgress, build_state};
use crate::core::types::{AgentState, Metadata};
use crate::error::LifecycleError;

/// One execution of an agent's step sequence.
#[derive(Debug)]
pub struct AgentRun {
    pub(crate) hooks: Hooks,
    pub(crate) progress: RunProgress,
    executed: AtomicBool,
}

/// Builder for [`AgentRun`].
#[derive(Debug, Default)]
pub struct RunBuilder {
    agent_id: String,
    session_id: Option<String>,
    metadata: Metadata,
    hooks: Hooks,
}

impl RunBuilder {
    /// Reuse an existing session id (resuming a paused run).
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> Result<AgentRun> {
        validate_id(&self.agent_id).map_err(|err| anyhow!("invalid agent id: {err}"))?;
        let session_id = match self.session_id {
            Some(id) => {
                validate_id(&id).map_err(|err| anyhow!("invalid session id: {err}"))?;
                id
            }
            None => new_session_id(),
        };
        debug!(agent_id = %self.agent_id, %session_id, hooks = ?self.hooks, "building run");
        Ok(AgentRun {
            executed: AtomicBool::new(false),
            hooks: self.hooks,
            progress: RunProgress::new(RunIdentity {
                agent_id: self.agent_id,
                session_id,
                metadata: self.metadata,
            }),
        })
    }
}

impl AgentRun {
    pub fn builder(agent_id: impl Into<String>) -> RunBuilder {
        RunBuilder {
            agent_id: agent_id.into(),
            ..RunBuilder::default()
        }
    }

    /// Start a fresh run with a generated session id.
    pub fn start(agent_id: impl Into<String>, hooks: Hooks) -> Result<Self> {
        Self::builder(agent_id).hooks(hooks).build()
    }

    pub fn agent_id(&self) -> &str {
        &self.progress.identity().agent_id
    }

    pub fn session_id(&self) -> &str {
        &self.progress.identity().session_id
    }

    /// Name of the step in progress, or empty before the first step.
    pub fn current_step(&self) -> Arc<str> {
        self.progress.current_step()
    }

    /// Consistent view of the run at the moment of the call.
    pub fn snapshot(&self) -> AgentState {
        self.progress.snapshot()
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Snapshot pinned to `step_name`, used for every hook of one step invocation.
    pub(crate) fn step_state(&self, step_name: &str) -> AgentState {
        build_state(self.progress.identity(), step_name)
    }

    /// Run `body` bracketed by the `before_execute` / `after_execute` hooks.
    ///
    /// A failing `before_execute` hook prevents the body from running. The
    /// `after_execute` hook sees the body's output and only fires on success;
    /// its failure aborts the run like any other hook failure.
    ///
    /// A run is executed at most once. Later calls fail with
    /// [`LifecycleError::AlreadyExecuted`] without invoking any hook.
    #[instrument(skip_all, fields(session_id = %self.session_id()))]
    pub fn execute<F>(&self, task: &str, body: F) -> Result<Value>
    where
        F: FnOnce(&AgentRun) -> Result<Value>,
    {
        if self.executed.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::AlreadyExecuted {
                session_id: self.session_id().to_string(),
            }
            .into());
        }
        info!(agent_id = %self.agent_id(), task, "run started");
        if let Some(hook) = &self.hooks.before_execute {
            debug!("dispatching before_execute");
            hook(&self.snapshot(), task)?;
        }

        let output = body(self)?;

        if let Some(hook) = &self.hooks.after_execute {
            debug!("dispatching after_execute");
            hook(&self.snapshot(), &output)?;
        }
        info!("run finished");
        Ok(output)
    }
}

pub(crate) fn ensure_name(name: &str, kind: &'static str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LifecycleError::InvalidName { kind }.into());
    }
    Ok(())
}

/// Validate that an id is safe to use as a file name.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("id must not be empty"));
    }
    if id.contains('/') {
        return Err(anyhow!("id must not contain '/'"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}

/// Fresh session id: `session-<UTC timestamp>-<6 lowercase alphanumerics>`.
pub fn new_session_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let mut rng = rand::thread_rng();
    let suffix = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("session-{timestamp}-{suffix}")
}
