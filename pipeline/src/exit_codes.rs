//! Stable exit codes for pipeline CLI commands.

/// Job succeeded, or no trigger was detected.
pub const OK: i32 = 0;
/// Prepare or execute phase failed.
pub const EXECUTION_FAILED: i32 = 1;
/// Configuration was invalid before any phase could run.
pub const INVALID: i32 = 2;
