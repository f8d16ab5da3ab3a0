//! Build-pipeline steps for CMake/CTest projects.
//!
//! Four steps are provided: running CTest and reporting failed and skipped
//! tests, publishing `CMakeCache.txt` entries as properties, pruning old
//! artifacts per group, and uploading an artifact at most once. The crate
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (cache grammar, result parsing,
//!   log rendering, retention planning). No I/O.
//! - **[`io`]**: Side-effecting capabilities (processes, worker files, logs,
//!   properties, transfers). Each sits behind a trait so tests can fake it.
//!
//! Orchestration modules ([`ctest`], [`cache_props`], [`clean_old`],
//! [`upload`]) combine the two to implement the CLI commands.

pub mod cache_props;
pub mod clean_old;
pub mod core;
pub mod ctest;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod upload;
