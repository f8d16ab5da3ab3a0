//! Orchestration for the `clean-old` step: delete all but the newest
//! artifacts of each group.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::retention::{RetentionEntry, plan_prune};
use crate::core::types::{NamedLog, StepResult};
use crate::io::logs::LogSink;

/// Name of the log listing removed and undeletable files.
pub const STDIO_LOG: &str = "stdio";

/// What happened to one deletion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    /// Deleted, or already gone.
    Removed(PathBuf),
    DeleteFailed { path: PathBuf, cause: String },
}

/// Delete everything past the newest `keep` entries of each group.
///
/// Every candidate is attempted even when earlier deletions fail.
pub fn prune<F>(entries: &[RetentionEntry], group_fn: F, keep: usize) -> Vec<PruneOutcome>
where
    F: Fn(&Path) -> Option<String>,
{
    plan_prune(entries, group_fn, keep)
        .into_iter()
        .map(delete_entry)
        .collect()
}

fn delete_entry(path: PathBuf) -> PruneOutcome {
    match fs::remove_file(&path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            PruneOutcome::Removed(path)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "already absent");
            PruneOutcome::Removed(path)
        }
        Err(err) => {
            warn!(path = %path.display(), err = %err, "could not delete");
            PruneOutcome::DeleteFailed {
                path,
                cause: err.to_string(),
            }
        }
    }
}

/// Entries of `dir` with their modification times, ordered by path.
pub fn list_entries(dir: &Path) -> Result<Vec<RetentionEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        match entry.metadata().and_then(|meta| meta.modified()) {
            Ok(modified) => entries.push(RetentionEntry::new(path, modified)),
            // Vanished between listing and stat; nothing left to retain or delete.
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("stat {}", path.display()));
            }
        }
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Prune the entries directly inside `dir`.
pub fn prune_directory<F>(dir: &Path, group_fn: F, keep: usize) -> Result<Vec<PruneOutcome>>
where
    F: Fn(&Path) -> Option<String>,
{
    let entries = list_entries(dir)?;
    Ok(prune(&entries, group_fn, keep))
}

#[derive(Debug, Clone)]
pub struct CleanOldStep {
    pub dir: PathBuf,
    /// Entries to keep per group.
    pub keep: usize,
}

/// Run the step, logging each removal. Any failed deletion makes the verdict
/// `Failure`, after every group has been processed.
#[instrument(skip_all, fields(dir = %step.dir.display(), keep = step.keep))]
pub fn run_clean_old<F, L>(step: &CleanOldStep, group_fn: F, logs: &mut L) -> Result<StepResult>
where
    F: Fn(&Path) -> Option<String>,
    L: LogSink,
{
    let outcomes = prune_directory(&step.dir, group_fn, step.keep)?;

    let mut log = NamedLog::new(STDIO_LOG);
    let mut result = StepResult::Success;
    for outcome in &outcomes {
        match outcome {
            PruneOutcome::Removed(path) => {
                log.add_stdout(format!("Removed: {}\n", path.display()));
            }
            PruneOutcome::DeleteFailed { path, cause } => {
                log.add_stderr(format!("Could not delete {}: {cause}\n", path.display()));
                result = StepResult::Failure;
            }
        }
    }
    logs.publish(log).context("publish stdio log")?;
    Ok(result)
}
