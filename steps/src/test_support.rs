//! Test-only fakes for the step capabilities.
//!
//! Each fake records what the step asked of it so tests can assert on the
//! exact interaction, and scripted fakes fail loudly when they run dry.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};

use crate::core::types::NamedLog;
use crate::error::StepError;
use crate::io::command::{CommandOutcome, CommandRequest, CommandRunner};
use crate::io::logs::LogSink;
use crate::io::process::CancelToken;
use crate::io::transfer::Uploader;
use crate::io::worker::Worker;

/// Command runner that replays queued outcomes in order.
#[derive(Default)]
pub struct ScriptedRunner {
    outcomes: RefCell<VecDeque<CommandOutcome>>,
    requests: RefCell<Vec<CommandRequest>>,
}

impl ScriptedRunner {
    pub fn new(outcomes: Vec<CommandOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.borrow().clone()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.outcomes.borrow().len();
        if remaining > 0 {
            bail!("{remaining} scripted outcome(s) never consumed");
        }
        Ok(())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &CommandRequest, cancel: &CancelToken) -> Result<CommandOutcome> {
        self.requests.borrow_mut().push(request.clone());
        let mut outcome = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted outcome for {:?}", request.argv))?;
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            outcome.exit_code = None;
        }
        Ok(outcome)
    }
}

/// In-memory worker filesystem.
///
/// `glob` ignores its pattern and returns the scripted matches, so tests can
/// exercise zero, one or several result files directly. `remove_dir` only
/// records the call: scripted files stand in for what the step's command
/// writes after the removal.
#[derive(Default)]
pub struct FakeWorker {
    files: RefCell<BTreeMap<PathBuf, Vec<u8>>>,
    glob_matches: Vec<PathBuf>,
    fetch_errors: BTreeMap<PathBuf, ErrorKind>,
    remove_errors: BTreeMap<PathBuf, ErrorKind>,
    fetched: RefCell<Vec<PathBuf>>,
    removed_dirs: RefCell<Vec<PathBuf>>,
    globs: RefCell<Vec<(PathBuf, String)>>,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.borrow_mut().insert(path.into(), contents.into());
        self
    }

    pub fn with_glob_matches<I, P>(mut self, matches: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.glob_matches = matches.into_iter().map(Into::into).collect();
        self
    }

    /// Make fetching `path` fail with an I/O error of `kind`.
    pub fn with_fetch_error(mut self, path: impl Into<PathBuf>, kind: ErrorKind) -> Self {
        self.fetch_errors.insert(path.into(), kind);
        self
    }

    /// Make removing `path` fail with an I/O error of `kind`.
    pub fn with_remove_error(mut self, path: impl Into<PathBuf>, kind: ErrorKind) -> Self {
        self.remove_errors.insert(path.into(), kind);
        self
    }

    pub fn fetched(&self) -> Vec<PathBuf> {
        self.fetched.borrow().clone()
    }

    pub fn removed_dirs(&self) -> Vec<PathBuf> {
        self.removed_dirs.borrow().clone()
    }

    /// `(root, pattern)` of every glob call.
    pub fn globs(&self) -> Vec<(PathBuf, String)> {
        self.globs.borrow().clone()
    }
}

impl Worker for FakeWorker {
    fn fetch_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.fetched.borrow_mut().push(path.to_path_buf());
        if let Some(kind) = self.fetch_errors.get(path) {
            let err = IoError::new(*kind, format!("transfer of {} failed", path.display()));
            return Err(err.into());
        }
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| StepError::RemoteFileNotFound(path.to_path_buf()).into())
    }

    fn glob(&self, root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        self.globs
            .borrow_mut()
            .push((root.to_path_buf(), pattern.to_string()));
        Ok(self.glob_matches.clone())
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        self.removed_dirs.borrow_mut().push(path.to_path_buf());
        if let Some(kind) = self.remove_errors.get(path) {
            let err = IoError::new(*kind, format!("remove {} failed", path.display()));
            return Err(err.into());
        }
        Ok(())
    }
}

/// Log sink that keeps every published log in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    pub logs: Vec<NamedLog>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// First published log called `name`.
    pub fn get(&self, name: &str) -> Option<&NamedLog> {
        self.logs.iter().find(|log| log.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.logs.iter().map(NamedLog::name).collect()
    }
}

impl LogSink for MemoryLogSink {
    fn publish(&mut self, log: NamedLog) -> Result<()> {
        self.logs.push(log);
        Ok(())
    }
}

/// Uploader that records transfers without touching any file.
#[derive(Default)]
pub struct CountingUploader {
    uploads: RefCell<Vec<(PathBuf, PathBuf)>>,
}

impl CountingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(local, dest)` of every transfer.
    pub fn uploads(&self) -> Vec<(PathBuf, PathBuf)> {
        self.uploads.borrow().clone()
    }
}

impl Uploader for CountingUploader {
    fn upload(&self, local: &Path, dest: &Path) -> Result<()> {
        self.uploads
            .borrow_mut()
            .push((local.to_path_buf(), dest.to_path_buf()));
        Ok(())
    }
}
