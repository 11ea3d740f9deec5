//! Conditions raised by the run controller itself.
//!
//! Hook and step-body failures are propagated unchanged as `anyhow::Error`.
//! The variants here travel inside `anyhow::Error` too; callers recover them
//! with `err.downcast_ref::<LifecycleError>()`.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The checkpoint hook failed, which includes explicit rejection and timeouts.
    #[error("checkpoint '{name}' rejected")]
    CheckpointRejected {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no interrupt handler registered (reason '{reason}')")]
    NoInterruptHandler { reason: String },

    /// The interrupt hook answered with something other than pause/continue/abort.
    #[error("interrupt hook returned invalid decision {value}")]
    InvalidInterruptDecision { value: Value },

    #[error("{kind} name must not be empty")]
    InvalidName { kind: &'static str },

    /// `AgentRun::execute` brackets a run once; a second call is refused.
    #[error("session '{session_id}' has already been executed")]
    AlreadyExecuted { session_id: String },
}

impl LifecycleError {
    /// Whether `err` is a rejected checkpoint.
    pub fn is_checkpoint_rejected(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<LifecycleError>(),
            Some(LifecycleError::CheckpointRejected { .. })
        )
    }
}
