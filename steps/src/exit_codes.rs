//! Stable exit codes for buildsteps CLI commands.

/// Step succeeded.
pub const OK: i32 = 0;
/// Step completed with a failing verdict (test failures, undeletable files).
pub const FAILURE: i32 = 1;
/// Step completed with warnings (e.g. requested cache entries missing).
pub const WARNINGS: i32 = 2;
/// Step was cancelled before it could finish.
pub const CANCELLED: i32 = 3;
/// Step aborted on a fatal error (bad options, ambiguous or malformed results).
pub const ERROR: i32 = 4;
