//! Agent lifecycle controller CLI.
//!
//! Drives the demo pipeline with session persistence, step metrics and an
//! approval gate installed. Sessions live under the configured state
//! directory (`.lifecycle/sessions` by default) and can be resumed after a
//! pause.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use lifecycle::exit_codes;
use lifecycle::io::approval::ApprovalGate;
use lifecycle::io::config::{LifecycleConfig, load_config, write_config};
use lifecycle::io::metrics::{MetricsSummary, StepMetrics};
use lifecycle::io::session_store::{SessionRecorder, load_session, session_path};
use lifecycle::logging;
use lifecycle::pipeline::{
    OUTPUT_READY, PLAN_READY, PipelineOptions, PipelineOutcome, PipelineStop, demo_hooks,
    run_pipeline,
};
use lifecycle::run::{AgentRun, new_session_id};

const CONFIG_PATH: &str = ".lifecycle/config.toml";

/// Printed to stdout after `lifecycle run`.
#[derive(Serialize)]
struct RunReport<'a> {
    outcome: &'a PipelineOutcome,
    metrics: MetricsSummary,
    session_file: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "lifecycle",
    version,
    about = "Agent execution lifecycle controller"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.lifecycle/config.toml` with defaults if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the demo pipeline for a task, or resume a paused session.
    Run {
        /// Task description handed to the pipeline.
        task: String,
        /// Resume (or create) this session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
        /// Send a user interrupt from another thread once this step ends.
        #[arg(long, value_name = "STEP")]
        pause_after: Option<String>,
        /// Make this step fail (exercises the error path).
        #[arg(long, value_name = "STEP")]
        fail_at: Option<String>,
        /// Approve every checkpoint without prompting.
        #[arg(short = 'y', long)]
        auto_approve: bool,
    },
    /// Print a session record.
    Status {
        /// Session id.
        session: String,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Run {
            task,
            session,
            pause_after,
            fail_at,
            auto_approve,
        } => cmd_run(
            &task,
            session,
            PipelineOptions {
                pause_after,
                fail_at,
            },
            auto_approve,
        ),
        Command::Status { session } => cmd_status(&session),
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &LifecycleConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    task: &str,
    session: Option<String>,
    options: PipelineOptions,
    auto_approve: bool,
) -> Result<i32> {
    if task.trim().is_empty() {
        bail!("task must not be empty");
    }
    let mut cfg = load_config(Path::new(CONFIG_PATH))?;
    if auto_approve {
        cfg.checkpoint.auto_approve.extend([
            PLAN_READY.to_string(),
            OUTPUT_READY.to_string(),
        ]);
    }
    let state_dir = cfg.state_dir_in(Path::new("."));
    let session_id = session.unwrap_or_else(new_session_id);

    let recorder = SessionRecorder::open(&state_dir, &session_id, &cfg.agent_id)?;
    let metrics = StepMetrics::new();
    let gate = ApprovalGate::from_config(&cfg.checkpoint);
    let agent = AgentRun::builder(&cfg.agent_id)
        .session_id(&session_id)
        .metadata("task", task)
        .hooks(demo_hooks(&recorder, &metrics, &gate))
        .build()?;

    if !auto_approve {
        spawn_console_reviewer(gate.clone(), cfg.checkpoint.poll_interval());
    }

    let outcome = run_pipeline(&agent, &recorder, task, &options)?;
    let report = RunReport {
        outcome: &outcome,
        metrics: metrics.summary(),
        session_file: recorder.path(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(match outcome.stop {
        PipelineStop::Completed { .. } => exit_codes::OK,
        PipelineStop::Paused { .. } => {
            eprintln!("paused; resume with: lifecycle run --session {session_id} <task>");
            exit_codes::PAUSED
        }
        PipelineStop::Aborted { .. } => exit_codes::ABORTED,
    })
}

fn cmd_status(session_id: &str) -> Result<i32> {
    let cfg = load_config(Path::new(CONFIG_PATH))?;
    let path = session_path(&cfg.state_dir_in(Path::new(".")), session_id)?;
    if !path.exists() {
        bail!("no session '{session_id}' under {}", cfg.state_dir.display());
    }
    let record = load_session(&path)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(exit_codes::OK)
}

/// Prompt on stderr for each pending checkpoint and answer from stdin.
///
/// The thread is detached; it dies with the process.
fn spawn_console_reviewer(gate: ApprovalGate, poll: Duration) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        loop {
            for record in gate.pending() {
                eprint!(
                    "checkpoint {} ({}) awaiting review:\n{}\napprove? [y/N] ",
                    record.id,
                    record.name,
                    serde_json::to_string_pretty(&record.data).unwrap_or_default()
                );
                if let Err(err) = std::io::stderr().flush() {
                    debug!(error = %err, "flush review prompt");
                }
                let mut line = String::new();
                let outcome = match stdin.lock().read_line(&mut line) {
                    Ok(0) | Err(_) => gate.reject(&record.id, "no reviewer input"),
                    Ok(_) => match line.trim() {
                        "y" | "Y" | "yes" => gate.approve(&record.id, None),
                        "" => gate.reject(&record.id, "declined"),
                        reason => gate.reject(&record.id, reason),
                    },
                };
                if let Err(err) = outcome {
                    debug!(error = %format!("{err:#}"), "checkpoint decided elsewhere");
                }
            }
            thread::sleep(poll);
        }
    });
}
