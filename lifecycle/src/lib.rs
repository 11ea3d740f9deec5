//! Agent execution lifecycle controller.
//!
//! Wraps an agent's work in a run made of named steps, and exposes extension
//! points where an outer orchestration layer can observe or steer the run:
//!
//! - **[`core`]**: Value types, the hook registry and state snapshots. No I/O.
//! - **[`io`]**: Side-effecting hook providers (session files, approval gate,
//!   metrics) and configuration. The core never depends on them.
//!
//! The run controller ([`run`]) with its step executor ([`step`]), checkpoint
//! coordinator ([`checkpoint`]) and interrupt channel ([`interrupt`]) ties the
//! two together. [`pipeline`] drives the demo agent behind the CLI.

pub mod checkpoint;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod interrupt;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod run;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
