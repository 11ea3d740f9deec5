//! Interrupt channel: delivers an external signal to the interrupt hook.
//!
//! May be called from any thread while a step or checkpoint is in flight. The
//! call is not serialized against the step sequence; hooks that need
//! exclusivity must provide it themselves.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::types::InterruptDecision;
use crate::error::LifecycleError;
use crate::run::AgentRun;

/// Well-known interrupt reasons. Any other string is accepted as well.
pub mod reasons {
    pub const USER_INTERRUPT: &str = "user_interrupt";
    pub const ERROR: &str = "error";
    pub const TIMEOUT: &str = "timeout";
}

impl AgentRun {
    /// Deliver an interrupt and return the hook's decision.
    ///
    /// The decision is relayed, not enforced: the step in flight keeps running
    /// and the agent decides what to do at its next step boundary.
    #[instrument(skip_all, fields(reason = reason, session_id = %self.session_id()))]
    pub fn send_interrupt(&self, reason: &str, data: &Value) -> Result<InterruptDecision> {
        let Some(hook) = &self.hooks.on_interrupt_signal else {
            warn!("interrupt received but no handler is registered");
            return Err(LifecycleError::NoInterruptHandler {
                reason: reason.to_string(),
            }
            .into());
        };

        let state = self.snapshot();
        debug!(current_step = %state.current_step, "dispatching on_interrupt_signal");
        let reply = hook(&state, reason, data)?;
        match InterruptDecision::from_reply(&reply) {
            Some(decision) => {
                info!(%decision, current_step = %state.current_step, "interrupt resolved");
                Ok(decision)
            }
            None => Err(LifecycleError::InvalidInterruptDecision { value: reply }.into()),
        }
    }
}
