//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded or the demo run completed.
pub const OK: i32 = 0;
/// Command failed due to invalid config, a control error or other errors.
pub const INVALID: i32 = 1;
/// The demo run stopped paused (fatal validation or blocked merge).
pub const PAUSED: i32 = 3;
/// The demo run stopped on a failed step, a failed run, a stall or the advance limit.
pub const FAILED: i32 = 4;
