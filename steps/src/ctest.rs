//! Orchestration for the `ctest` step.
//!
//! Runs CTest, then turns its XML result document into one log per failed
//! test plus a combined `skipped` log. The step verdict is CTest's own exit
//! status; the rendered logs only explain it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::invocation::CTestOptions;
use crate::core::render::{render_failures, render_skipped};
use crate::core::results::{ResultSummary, parse_results};
use crate::core::types::{NamedLog, StepResult};
use crate::error::StepError;
use crate::io::command::{CommandOutcome, CommandRequest, CommandRunner};
use crate::io::config::CTestConfig;
use crate::io::logs::LogSink;
use crate::io::process::CancelToken;
use crate::io::worker::Worker;

/// Name of the log holding the driver's own stdout/stderr.
pub const STDIO_LOG: &str = "stdio";

/// Everything needed to run the step once.
#[derive(Debug, Clone)]
pub struct CTestStep {
    /// Build directory CTest runs in.
    pub workdir: PathBuf,
    pub options: CTestOptions,
    pub config: CTestConfig,
}

/// Result of a single `ctest` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CTestOutcome {
    pub result: StepResult,
    /// The command line that was executed.
    pub command: Vec<String>,
    pub exit_code: Option<i32>,
    /// The result document, when the run got far enough to locate it.
    pub results_file: Option<PathBuf>,
    pub summary: ResultSummary,
    /// Names of the per-test logs published for failed tests, in document order.
    pub failed_logs: Vec<String>,
    /// Whether a `skipped` log was published.
    pub skipped_log: bool,
}

/// Run CTest and publish its failure/skip reports.
///
/// Fails on an ambiguous result set, a result file that cannot be fetched, or
/// a malformed result document; nothing is rendered in those cases.
#[instrument(skip_all, fields(workdir = %step.workdir.display()))]
pub fn run_ctest<R: CommandRunner, W: Worker, L: LogSink>(
    step: &CTestStep,
    runner: &R,
    worker: &W,
    logs: &mut L,
    cancel: &CancelToken,
) -> Result<CTestOutcome> {
    let results_dir = step.workdir.join(&step.config.results_dir);
    debug!(dir = %results_dir.display(), "removing stale results");
    // A leftover results directory is not fatal; the result-set check below
    // still rejects a run that leaves more than one document behind.
    if let Err(err) = worker.remove_dir(&results_dir) {
        warn!(
            dir = %results_dir.display(),
            err = format!("{err:#}"),
            "could not remove stale results"
        );
    }

    let command = step.options.command(&step.config.program);
    let request = CommandRequest {
        argv: command.clone(),
        workdir: step.workdir.clone(),
        timeout: step.config.timeout(),
        output_limit_bytes: step.config.output_limit_bytes,
    };
    let executed = runner.run(&request, cancel).context("run ctest")?;
    logs.publish(stdio_log(&request, &executed))
        .context("publish stdio log")?;

    let mut outcome = CTestOutcome {
        result: verdict(&executed),
        command,
        exit_code: executed.exit_code,
        results_file: None,
        summary: ResultSummary::default(),
        failed_logs: Vec::new(),
        skipped_log: false,
    };
    if executed.cancelled || executed.timed_out {
        warn!(
            cancelled = executed.cancelled,
            timed_out = executed.timed_out,
            "ctest did not finish, skipping result collection"
        );
        return Ok(outcome);
    }

    let results_file = locate_results(worker, &step.workdir, &step.config.results_glob)?;
    let contents = worker
        .fetch_file(&results_file)
        .with_context(|| format!("fetch {}", results_file.display()))?;
    let results = parse_results(&results_file, &contents)?;
    outcome.summary = results.summary();
    outcome.results_file = Some(results_file);

    for log in render_failures(&results) {
        outcome.failed_logs.push(log.name().to_string());
        logs.publish(log).context("publish failed test log")?;
    }
    if let Some(log) = render_skipped(&results) {
        logs.publish(log).context("publish skipped log")?;
        outcome.skipped_log = true;
    }

    info!(
        exit_code = ?outcome.exit_code,
        passed = outcome.summary.passed,
        failed = outcome.summary.failed,
        not_run = outcome.summary.not_run,
        other = outcome.summary.other,
        "ctest finished"
    );
    Ok(outcome)
}

fn verdict(executed: &CommandOutcome) -> StepResult {
    if executed.cancelled {
        StepResult::Cancelled
    } else if executed.success() {
        StepResult::Success
    } else {
        StepResult::Failure
    }
}

/// The single result document under `workdir`.
fn locate_results<W: Worker>(worker: &W, workdir: &Path, pattern: &str) -> Result<PathBuf> {
    let mut found = worker
        .glob(workdir, pattern)
        .with_context(|| format!("glob {pattern}"))?;
    if found.len() != 1 {
        return Err(StepError::AmbiguousResultSet { found }.into());
    }
    Ok(found.remove(0))
}

fn stdio_log(request: &CommandRequest, executed: &CommandOutcome) -> NamedLog {
    let mut log = NamedLog::new(STDIO_LOG);
    log.add_header(format!("{}\n", request.argv.join(" ")));
    log.add_header(format!(" in dir {}\n", request.workdir.display()));
    log.add_stdout(executed.stdout.clone());
    log.add_stderr(executed.stderr.clone());
    let status = if executed.cancelled {
        "cancelled".to_string()
    } else if executed.timed_out {
        format!("timed out after {}s", request.timeout.as_secs())
    } else {
        match executed.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "killed by signal".to_string(),
        }
    };
    log.add_header(format!("program finished: {status}\n"));
    log
}
