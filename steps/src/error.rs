//! Typed failure conditions raised by the build steps.
//!
//! Everything else travels as `anyhow::Error` with context attached at the I/O
//! boundary. Callers that need to branch on one of these conditions recover it
//! with `err.downcast_ref::<StepError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepError {
    /// CTest options that cannot compile to a command line.
    #[error("invalid ctest invocation: {0}")]
    InvalidInvocation(String),

    /// A `BOOL` cache entry whose value is not a CMake boolean literal.
    #[error("invalid CMake bool \"{value}\" for cache entry {name}")]
    InvalidBooleanValue { name: String, value: String },

    /// The result glob did not match exactly one file.
    #[error("expected to find a single XML file, got {}: {found:?}", .found.len())]
    AmbiguousResultSet { found: Vec<PathBuf> },

    /// The result document is not well-formed XML.
    #[error("malformed test report {}: {reason}", .path.display())]
    MalformedReport { path: PathBuf, reason: String },

    /// A file requested from the worker does not exist.
    #[error("file not found on worker: {}", .0.display())]
    RemoteFileNotFound(PathBuf),
}

impl StepError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StepError::MalformedReport {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
