//! Approval gate: a checkpoint hook that waits for a human decision.
//!
//! Checkpoints offered through the gate are recorded as pending and the run's
//! thread blocks until another thread calls [`ApprovalGate::approve`] or
//! [`ApprovalGate::reject`], or the review timeout elapses.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::hooks::Hooks;
use crate::core::types::AgentState;
use crate::io::config::CheckpointConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// `checkpoint_NNN`, assigned in offer order.
    pub id: String,
    pub name: String,
    pub data: Value,
    pub session_id: String,
    pub agent_id: String,
    pub status: CheckpointStatus,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub feedback: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("checkpoint {id} rejected by reviewer: {reason}")]
    Rejected { id: String, reason: String },
    #[error("checkpoint {id} not reviewed within {:.1}s", .waited.as_secs_f64())]
    TimedOut { id: String, waited: Duration },
    #[error("checkpoint {id} is not awaiting review")]
    NotPending { id: String },
}

struct GateState {
    next_id: u32,
    records: Vec<CheckpointRecord>,
}

impl GateState {
    fn pending_mut(&mut self, id: &str) -> Option<&mut CheckpointRecord> {
        self.records
            .iter_mut()
            .find(|record| record.id == id && record.status == CheckpointStatus::Pending)
    }

    fn status_of(&self, id: &str) -> Option<(CheckpointStatus, Option<String>)> {
        self.records
            .iter()
            .find(|record| record.id == id)
            .map(|record| (record.status, record.feedback.clone()))
    }
}

struct Shared {
    state: Mutex<GateState>,
    decided: Condvar,
    timeout: Duration,
    poll_interval: Duration,
    auto_approve: Vec<String>,
}

/// Thread-safe registry of checkpoints awaiting review.
///
/// Cloning shares the registry; hand one clone to [`ApprovalGate::install`] and
/// keep another for the reviewer.
///
/// Decided records are kept for [`ApprovalGate::records`] and never pruned, so
/// one gate should serve one run rather than a long-lived process.
#[derive(Clone)]
pub struct ApprovalGate {
    shared: Arc<Shared>,
}

impl fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ApprovalGate")
            .field("timeout", &self.shared.timeout)
            .field("records", &state.records.len())
            .finish()
    }
}

impl ApprovalGate {
    pub fn new(timeout: Duration) -> Self {
        Self::build(timeout, Duration::from_millis(200), Vec::new())
    }

    pub fn from_config(cfg: &CheckpointConfig) -> Self {
        Self::build(cfg.timeout(), cfg.poll_interval(), cfg.auto_approve.clone())
    }

    fn build(timeout: Duration, poll_interval: Duration, auto_approve: Vec<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(GateState {
                    next_id: 1,
                    records: Vec::new(),
                }),
                decided: Condvar::new(),
                timeout,
                poll_interval,
                auto_approve,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fill the checkpoint slot of `hooks` with this gate.
    pub fn install(&self, hooks: Hooks) -> Hooks {
        let gate = self.clone();
        hooks.on_checkpoint_opportunity(move |state, name, data| gate.review(state, name, data))
    }

    pub fn approve(&self, id: &str, feedback: Option<String>) -> Result<()> {
        self.decide(id, CheckpointStatus::Approved, feedback)
    }

    pub fn reject(&self, id: &str, reason: impl Into<String>) -> Result<()> {
        self.decide(id, CheckpointStatus::Rejected, Some(reason.into()))
    }

    /// Records still waiting for a decision, oldest first.
    pub fn pending(&self) -> Vec<CheckpointRecord> {
        self.lock()
            .records
            .iter()
            .filter(|record| record.status == CheckpointStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn records(&self) -> Vec<CheckpointRecord> {
        self.lock().records.clone()
    }

    fn decide(&self, id: &str, status: CheckpointStatus, feedback: Option<String>) -> Result<()> {
        let mut state = self.lock();
        let Some(record) = state.pending_mut(id) else {
            return Err(ReviewError::NotPending { id: id.to_string() }.into());
        };
        record.status = status;
        record.resolved_at = Some(now());
        record.feedback = feedback;
        info!(checkpoint_id = id, name = %record.name, ?status, "checkpoint decided");
        drop(state);
        self.shared.decided.notify_all();
        Ok(())
    }

    fn review(&self, agent: &AgentState, name: &str, data: &Value) -> Result<()> {
        let mut state = self.lock();
        let id = format!("checkpoint_{:03}", state.next_id);
        state.next_id += 1;

        let auto = self.shared.auto_approve.iter().any(|n| n == name);
        let created_at = now();
        state.records.push(CheckpointRecord {
            id: id.clone(),
            name: name.to_string(),
            data: data.clone(),
            session_id: agent.session_id.clone(),
            agent_id: agent.agent_id.clone(),
            status: if auto {
                CheckpointStatus::Approved
            } else {
                CheckpointStatus::Pending
            },
            resolved_at: auto.then(|| created_at.clone()),
            created_at,
            feedback: auto.then(|| "auto-approved".to_string()),
        });
        if auto {
            debug!(checkpoint_id = %id, name, "checkpoint auto-approved");
            return Ok(());
        }

        info!(checkpoint_id = %id, name, "checkpoint awaiting review");
        let started = Instant::now();
        let deadline = started + self.shared.timeout;
        loop {
            match state.status_of(&id) {
                Some((CheckpointStatus::Approved, _)) => return Ok(()),
                Some((CheckpointStatus::Rejected, feedback)) => {
                    return Err(ReviewError::Rejected {
                        id,
                        reason: feedback.unwrap_or_default(),
                    }
                    .into());
                }
                _ => {}
            }

            let now_instant = Instant::now();
            if now_instant >= deadline {
                if let Some(record) = state.pending_mut(&id) {
                    record.status = CheckpointStatus::TimedOut;
                    record.resolved_at = Some(now());
                }
                warn!(checkpoint_id = %id, name, "checkpoint review timed out");
                return Err(ReviewError::TimedOut {
                    id,
                    waited: started.elapsed(),
                }
                .into());
            }

            let wait = self.shared.poll_interval.min(deadline - now_instant);
            let (guard, _) = self
                .shared
                .decided
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LifecycleError;
    use crate::run::AgentRun;
    use serde_json::json;
    use std::thread;

    fn wait_for_pending(gate: &ApprovalGate) -> CheckpointRecord {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(record) = gate.pending().into_iter().next() {
                return record;
            }
            assert!(Instant::now() < deadline, "no checkpoint became pending");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn approval_from_another_thread_unblocks_the_run() {
        let gate = ApprovalGate::new(Duration::from_secs(10));
        let run = AgentRun::start("agent", gate.install(Hooks::new())).expect("run");

        let reviewer = {
            let gate = gate.clone();
            thread::spawn(move || {
                let record = wait_for_pending(&gate);
                assert_eq!(record.id, "checkpoint_001");
                assert_eq!(record.name, "plan_ready");
                assert_eq!(record.data, json!({"plan": ["a"]}));
                gate.approve(&record.id, Some("looks good".to_string()))
                    .expect("approve");
            })
        };

        run.offer_checkpoint("plan_ready", &json!({"plan": ["a"]}))
            .expect("approved");
        reviewer.join().expect("reviewer");

        let records = gate.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, CheckpointStatus::Approved);
        assert_eq!(records[0].feedback.as_deref(), Some("looks good"));
        assert_eq!(records[0].session_id, run.session_id());
        assert!(records[0].resolved_at.is_some());
        assert!(gate.pending().is_empty());
    }

    #[test]
    fn rejection_surfaces_as_checkpoint_rejected() {
        let gate = ApprovalGate::new(Duration::from_secs(10));
        let run = AgentRun::start("agent", gate.install(Hooks::new())).expect("run");

        let reviewer = {
            let gate = gate.clone();
            thread::spawn(move || {
                let record = wait_for_pending(&gate);
                gate.reject(&record.id, "missing sources").expect("reject");
            })
        };

        let err = run
            .offer_checkpoint("output_ready", &Value::Null)
            .unwrap_err();
        reviewer.join().expect("reviewer");

        assert!(LifecycleError::is_checkpoint_rejected(&err));
        assert!(format!("{err:#}").contains("rejected by reviewer: missing sources"));
        assert_eq!(gate.records()[0].status, CheckpointStatus::Rejected);
    }

    #[test]
    fn unanswered_checkpoint_times_out() {
        let gate = ApprovalGate::build(
            Duration::from_millis(50),
            Duration::from_millis(10),
            Vec::new(),
        );
        let run = AgentRun::start("agent", gate.install(Hooks::new())).expect("run");

        let err = run.offer_checkpoint("plan_ready", &Value::Null).unwrap_err();
        assert!(LifecycleError::is_checkpoint_rejected(&err));
        assert!(format!("{err:#}").contains("not reviewed within"));

        let record = &gate.records()[0];
        assert_eq!(record.status, CheckpointStatus::TimedOut);
        assert!(gate.approve(&record.id, None).is_err(), "too late to approve");
    }

    #[test]
    fn configured_names_are_auto_approved() {
        let cfg = CheckpointConfig {
            auto_approve: vec!["metadata_update".to_string()],
            ..CheckpointConfig::default()
        };
        let gate = ApprovalGate::from_config(&cfg);
        let run = AgentRun::start("agent", gate.install(Hooks::new())).expect("run");

        run.offer_checkpoint("metadata_update", &json!({"k": 1}))
            .expect("auto-approved");
        let records = gate.records();
        assert_eq!(records[0].status, CheckpointStatus::Approved);
        assert_eq!(records[0].feedback.as_deref(), Some("auto-approved"));
    }

    #[test]
    fn deciding_unknown_checkpoint_fails() {
        let gate = ApprovalGate::new(Duration::from_secs(1));
        let err = gate.approve("checkpoint_999", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReviewError>(),
            Some(ReviewError::NotPending { id }) if id == "checkpoint_999"
        ));
    }

    #[test]
    fn decided_records_are_retained() {
        let cfg = CheckpointConfig {
            auto_approve: vec!["a".to_string()],
            ..CheckpointConfig::default()
        };
        let gate = ApprovalGate::from_config(&cfg);
        let run = AgentRun::start("agent", gate.install(Hooks::new())).expect("run");
        for _ in 0..3 {
            run.offer_checkpoint("a", &Value::Null).expect("a");
        }
        assert!(gate.pending().is_empty());
        assert_eq!(gate.records().len(), 3);
        assert!(format!("{gate:?}").contains("records: 3"));
    }

    #[test]
    fn ids_are_sequential() {
        let cfg = CheckpointConfig {
            auto_approve: vec!["a".to_string(), "b".to_string()],
            ..CheckpointConfig::default()
        };
        let gate = ApprovalGate::from_config(&cfg);
        let run = AgentRun::start("agent", gate.install(Hooks::new())).expect("run");
        run.offer_checkpoint("a", &Value::Null).expect("a");
        run.offer_checkpoint("b", &Value::Null).expect("b");
        let ids: Vec<String> = gate.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["checkpoint_001", "checkpoint_002"]);
    }
}
