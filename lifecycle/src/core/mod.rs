//! Pure building blocks of the run controller.
//!
//! Core modules hold no I/O. They define the values handed to hooks, the hook
//! registry itself, and the shared progress cell snapshots are built from.

pub mod hooks;
pub mod snapshot;
pub mod types;
