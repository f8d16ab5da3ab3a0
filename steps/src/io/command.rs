//! Command execution abstraction.
//!
//! The [`CommandRunner`] trait decouples step orchestration from process
//! spawning. Tests use scripted runners that return predetermined outcomes
//! without spawning anything.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::io::process::{CancelToken, run_command_with_timeout};

/// Parameters for one command invocation.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Working directory for the child process.
    pub workdir: PathBuf,
    /// Maximum time to wait before killing the child.
    pub timeout: Duration,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// What happened to a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, or `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutcome {
    /// An outcome that exited normally with `code`.
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.cancelled
    }
}

/// Abstraction over command execution backends.
pub trait CommandRunner {
    /// Run the command to completion, or until timeout/cancellation kills it.
    ///
    /// A non-zero exit is not an error; only failure to run the command is.
    fn run(&self, request: &CommandRequest, cancel: &CancelToken) -> Result<CommandOutcome>;
}

/// Runner that spawns local child processes.
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    #[instrument(skip_all, fields(program = request.argv.first().map(String::as_str), workdir = %request.workdir.display()))]
    fn run(&self, request: &CommandRequest, cancel: &CancelToken) -> Result<CommandOutcome> {
        let (program, args) = request
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command line"))?;
        info!(command = %request.argv.join(" "), "running command");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);
        let output = run_command_with_timeout(
            cmd,
            request.timeout,
            request.output_limit_bytes,
            cancel,
        )
        .with_context(|| format!("run {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "command timed out");
        }

        Ok(CommandOutcome {
            exit_code: output.status.code(),
            stdout: output.stdout.text("stdout"),
            stderr: output.stderr.text("stderr"),
            timed_out: output.timed_out,
            cancelled: output.cancelled,
        })
    }
}
