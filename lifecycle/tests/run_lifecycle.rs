//! Run-level tests for hook ordering and cross-thread interrupts.
//!
//! These drive a full `AgentRun` through several steps with every hook slot
//! populated, and verify the observable hook sequence plus the state seen by
//! interrupts sent from other threads.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use lifecycle::core::hooks::Hooks;
use lifecycle::core::types::InterruptDecision;
use lifecycle::error::LifecycleError;
use lifecycle::interrupt::reasons;
use lifecycle::run::AgentRun;
use lifecycle::test_support::HookLog;

/// Three sequential steps produce exactly one start/end pair each, in order.
#[test]
fn sequential_steps_emit_paired_hooks() {
    let log = HookLog::new();
    let run = AgentRun::start("agent", log.hooks(InterruptDecision::Continue)).expect("run");

    run.execute("triage incident", |run| {
        for name in ["plan", "monitor", "analyze"] {
            run.execute_step(name, |_| Ok(json!({ "step": name })))?;
        }
        Ok(Value::Null)
    })
    .expect("execute");

    assert_eq!(
        log.entries(),
        vec![
            "before(triage incident)",
            "start(plan)",
            "end(plan)",
            "start(monitor)",
            "end(monitor)",
            "start(analyze)",
            "end(analyze)",
            "after",
        ]
    );
}

/// A failing step reports end then error, skips `after_execute`, and the
/// caller sees the step's own error.
#[test]
fn failing_step_inside_run_skips_after_execute() {
    let log = HookLog::new();
    let run = AgentRun::start("agent", log.hooks(InterruptDecision::Continue)).expect("run");

    let err = run
        .execute("report", |run| {
            run.execute_step("plan", |_| Ok(()))?;
            run.execute_step("analyze", |_| -> Result<()> { Err(anyhow!("no data")) })?;
            Ok(Value::Null)
        })
        .unwrap_err();

    assert_eq!(err.to_string(), "no data");
    assert_eq!(
        log.entries(),
        vec![
            "before(report)",
            "start(plan)",
            "end(plan)",
            "start(analyze)",
            "end_failed(analyze)",
            "error(analyze)",
        ]
    );
}

/// An interrupt sent while a step blocks sees that step as current and lands
/// between its start and end hooks.
#[test]
fn interrupt_during_step_sees_in_progress_step() {
    let log = HookLog::new();
    let run = Arc::new(
        AgentRun::start("agent", log.hooks(InterruptDecision::Pause)).expect("run"),
    );
    run.execute_step("plan", |_| Ok(())).expect("plan");

    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let worker = {
        let run = Arc::clone(&run);
        thread::spawn(move || {
            run.execute_step("monitor", |_| {
                entered_tx.send(()).map_err(|_| anyhow!("test gone"))?;
                release_rx
                    .recv_timeout(Duration::from_secs(5))
                    .map_err(|_| anyhow!("never released"))?;
                Ok(())
            })
        })
    };

    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("step entered");
    let decision = run
        .send_interrupt(reasons::USER_INTERRUPT, &json!({"message": "hold"}))
        .expect("interrupt");
    assert_eq!(decision, InterruptDecision::Pause);
    release_tx.send(()).expect("release");
    worker.join().expect("worker").expect("monitor step");

    assert_eq!(
        log.entries(),
        vec![
            "start(plan)",
            "end(plan)",
            "start(monitor)",
            "interrupt(user_interrupt,monitor)",
            "end(monitor)",
        ]
    );
}

/// Interrupts racing with step transitions always see a real step name.
#[test]
fn concurrent_interrupts_never_observe_torn_state() {
    let log = HookLog::new();
    let run = Arc::new(
        AgentRun::start("agent", log.hooks(InterruptDecision::Continue)).expect("run"),
    );
    run.execute_step("step-0", |_| Ok(())).expect("first step");

    let sender = {
        let run = Arc::clone(&run);
        thread::spawn(move || {
            for _ in 0..200 {
                run.send_interrupt("poke", &Value::Null).expect("interrupt");
            }
        })
    };
    for i in 1..200 {
        run.execute_step(&format!("step-{i}"), |_| Ok(i)).expect("step");
    }
    sender.join().expect("sender");

    let seen: Vec<String> = log
        .entries()
        .into_iter()
        .filter_map(|entry| {
            entry
                .strip_prefix("interrupt(poke,")
                .and_then(|rest| rest.strip_suffix(')'))
                .map(str::to_string)
        })
        .collect();
    assert_eq!(seen.len(), 200);
    for step in seen {
        let index: u32 = step
            .strip_prefix("step-")
            .and_then(|n| n.parse().ok())
            .unwrap_or_else(|| panic!("unexpected current step '{step}'"));
        assert!(index < 200);
    }
}

/// Checkpoint rejection is surfaced as a typed error the caller can match on.
#[test]
fn checkpoint_rejection_is_typed() {
    let hooks = Hooks::new().on_checkpoint_opportunity(|state, name, data| {
        if name == "output_ready" && data.get("draft").is_none() {
            return Err(anyhow!("no draft attached (session {})", state.session_id));
        }
        Ok(())
    });
    let run = AgentRun::start("agent", hooks).expect("run");

    run.offer_checkpoint("plan_ready", &json!({"plan": []}))
        .expect("plan approved");
    let err = run
        .offer_checkpoint("output_ready", &json!({}))
        .unwrap_err();
    match err.downcast_ref::<LifecycleError>() {
        Some(LifecycleError::CheckpointRejected { name, .. }) => assert_eq!(name, "output_ready"),
        other => panic!("unexpected error: {other:?}"),
    }
}
