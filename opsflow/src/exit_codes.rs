//! Stable exit codes for opsflow CLI commands.

/// Command succeeded; for `opsflow run`, the run reached `done`.
pub const OK: i32 = 0;
/// `opsflow run` ended in `failed` (see `run.json` for the recorded failure).
pub const FAILED: i32 = 1;
/// Invalid input, configuration, or an I/O error before a run could start.
pub const INVALID: i32 = 2;
