//! Test-only helpers for observing hook dispatch.

use std::sync::{Arc, Mutex, PoisonError};

use crate::core::hooks::Hooks;
use crate::core::types::InterruptDecision;

/// Shared, ordered log of hook calls such as `start(plan)` or `end(plan)`.
#[derive(Clone, Default)]
pub struct HookLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl HookLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hooks filling every slot; each call appends one entry and succeeds.
    ///
    /// The interrupt hook answers `decision` for every reason.
    pub fn hooks(&self, decision: InterruptDecision) -> Hooks {
        let (start, end, before, after) = (self.clone(), self.clone(), self.clone(), self.clone());
        let (interrupt, error, checkpoint) = (self.clone(), self.clone(), self.clone());
        Hooks::new()
            .on_step_start(move |_, ctx| {
                start.push(format!("start({})", ctx.step_name));
                Ok(())
            })
            .on_step_end(move |_, result| {
                let tag = if result.success { "end" } else { "end_failed" };
                end.push(format!("{tag}({})", result.step_name));
                Ok(())
            })
            .before_execute(move |_, task| {
                before.push(format!("before({task})"));
                Ok(())
            })
            .after_execute(move |_, _| {
                after.push("after");
                Ok(())
            })
            .on_interrupt_signal(move |state, reason, _| {
                interrupt.push(format!("interrupt({reason},{})", state.current_step));
                Ok(decision.reply())
            })
            .on_error(move |_, _, context| {
                error.push(format!("error({context})"));
                Ok(())
            })
            .on_checkpoint_opportunity(move |_, name, _| {
                checkpoint.push(format!("checkpoint({name})"));
                Ok(())
            })
    }
}
