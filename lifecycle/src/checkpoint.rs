//! Checkpoint coordinator: offers a named pause point to an external reviewer.
//!
//! The call blocks the run's thread until the checkpoint hook returns. Storage,
//! notification and timeout policy all live inside the hook.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::LifecycleError;
use crate::run::{AgentRun, ensure_name};

impl AgentRun {
    /// Offer a checkpoint and wait for the reviewer.
    ///
    /// Without a checkpoint hook this returns immediately. A hook that returns
    /// `Ok` approves; any hook failure becomes [`LifecycleError::CheckpointRejected`].
    #[instrument(skip_all, fields(checkpoint = name, session_id = %self.session_id()))]
    pub fn offer_checkpoint(&self, name: &str, data: &Value) -> Result<()> {
        ensure_name(name, "checkpoint")?;
        let Some(hook) = &self.hooks.on_checkpoint_opportunity else {
            debug!("no checkpoint hook registered; continuing");
            return Ok(());
        };

        info!("checkpoint offered; waiting for review");
        match hook(&self.snapshot(), name, data) {
            Ok(()) => {
                info!("checkpoint approved");
                Ok(())
            }
            Err(source) => {
                warn!(error = %format!("{source:#}"), "checkpoint rejected");
                Err(LifecycleError::CheckpointRejected {
                    name: name.to_string(),
                    source,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hooks::Hooks;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn without_hook_checkpoint_is_a_no_op() {
        let run = AgentRun::start("agent", Hooks::new()).expect("run");
        run.offer_checkpoint("plan_ready", &json!({"plan": [1, 2]}))
            .expect("no-op");
        assert_eq!(run.current_step().as_ref(), "");
    }

    #[test]
    fn hook_receives_state_name_and_payload() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let hooks = Hooks::new().on_checkpoint_opportunity(move |state, name, data| {
            *sink.lock().unwrap() = Some((state.current_step.clone(), name.to_string(), data.clone()));
            Ok(())
        });
        let run = AgentRun::start("agent", hooks).expect("run");
        run.execute_step("plan", |_| Ok(())).expect("step");

        run.offer_checkpoint("plan_ready", &json!({"plan": "x"}))
            .expect("approved");
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some((
                "plan".to_string(),
                "plan_ready".to_string(),
                json!({"plan": "x"})
            ))
        );
    }

    #[test]
    fn hook_failure_is_reported_as_rejection() {
        let hooks =
            Hooks::new().on_checkpoint_opportunity(|_, _, _| Err(anyhow!("reviewer rejected")));
        let run = AgentRun::start("agent", hooks).expect("run");

        let err = run
            .offer_checkpoint("output_ready", &Value::Null)
            .unwrap_err();
        assert!(LifecycleError::is_checkpoint_rejected(&err));
        assert_eq!(
            format!("{err:#}"),
            "checkpoint 'output_ready' rejected: reviewer rejected"
        );
    }

    #[test]
    fn checkpoint_blocks_until_hook_resolves() {
        let (approve_tx, approve_rx) = mpsc::channel::<()>();
        let approve_rx = Mutex::new(approve_rx);
        let hooks = Hooks::new().on_checkpoint_opportunity(move |_, _, _| {
            approve_rx
                .lock()
                .unwrap()
                .recv()
                .map_err(|_| anyhow!("reviewer went away"))
        });
        let run = AgentRun::start("agent", hooks).expect("run");

        let (done_tx, done_rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let outcome = run.offer_checkpoint("plan_ready", &Value::Null);
            done_tx.send(outcome.is_ok()).expect("send outcome");
        });

        assert!(
            done_rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "checkpoint returned before approval"
        );
        approve_tx.send(()).expect("approve");
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).expect("outcome"));
        waiter.join().expect("waiter");
    }
}
