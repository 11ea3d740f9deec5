//! Stable exit codes for lifecycle CLI commands.

/// Command succeeded; for `run`, the session completed.
pub const OK: i32 = 0;
/// Invalid config, session or arguments, or any other error.
pub const INVALID: i32 = 1;
/// `lifecycle run` stopped at a step boundary after a pause decision.
pub const PAUSED: i32 = 2;
/// `lifecycle run` stopped after an abort decision or a rejected checkpoint.
pub const ABORTED: i32 = 3;
