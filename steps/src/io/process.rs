//! Helpers for running child processes with timeouts, cancellation and
//! bounded output.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How often a running child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared flag used to cancel a running step from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bytes captured from one output stream of a child.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes read past the capture limit and discarded.
    pub dropped: usize,
}

impl Captured {
    /// Lossy UTF-8 text, with a marker appended when output was dropped.
    pub fn text(&self, stream: &str) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!(
                "\n[{stream} truncated, {} bytes dropped]\n",
                self.dropped
            ));
        }
        text
    }
}

/// Exit status and captured output of a finished (or killed) child.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    pub timed_out: bool,
    pub cancelled: bool,
}

/// Run `cmd` until it exits, `timeout` expires, or `cancel` fires.
///
/// Both pipes are drained on reader threads while the child runs, so a chatty
/// child never blocks on a full pipe. At most `output_limit_bytes` of each
/// stream are kept. On Unix the child leads its own process group; on timeout
/// or cancellation the whole group is killed and the child reaped before
/// returning, so nothing it started outlives the step or holds the pipes.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: &CancelToken,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

    debug!("spawning child process");
    let mut child = cmd
        .spawn()
        .inspect_err(|err| error!(err = %err, "failed to spawn command"))
        .context("spawn command")?;
    let stdout = spawn_reader(child.stdout.take(), "stdout", output_limit_bytes)?;
    let stderr = spawn_reader(child.stderr.take(), "stderr", output_limit_bytes)?;

    let (status, timed_out, cancelled) = wait_or_kill(&mut child, timeout, cancel)?;
    let stdout = join_reader(stdout, "stdout")?;
    let stderr = join_reader(stderr, "stderr")?;

    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output truncated"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
        cancelled,
    })
}

/// Wait for the child, killing it on timeout or cancellation.
///
/// Returns `(status, timed_out, cancelled)`.
fn wait_or_kill(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<(ExitStatus, bool, bool)> {
    // A timeout too large to represent never expires.
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if cancel.is_cancelled() {
            warn!("command cancelled, killing");
            return Ok((kill_and_reap(child)?, false, true));
        }
        let now = Instant::now();
        let slice = match deadline {
            Some(deadline) if now >= deadline => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "command timed out, killing"
                );
                return Ok((kill_and_reap(child)?, true, false));
            }
            Some(deadline) => (deadline - now).min(POLL_INTERVAL),
            None => POLL_INTERVAL,
        };
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            return Ok((status, false, false));
        }
    }
}

fn kill_and_reap(child: &mut Child) -> Result<ExitStatus> {
    kill_group(child)?;
    child.wait().context("wait command after kill")
}

/// SIGKILL the child's process group.
#[cfg(unix)]
fn kill_group(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        // The group is already gone; reaping below collects the status.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err).context("kill command process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

type Reader = thread::JoinHandle<Result<Captured>>;

fn spawn_reader<R>(stream: Option<R>, name: &str, limit: usize) -> Result<Reader>
where
    R: Read + Send + 'static,
{
    let stream = stream.ok_or_else(|| anyhow!("{name} was not piped"))?;
    Ok(thread::spawn(move || drain(stream, limit)))
}

fn join_reader(handle: Reader, name: &str) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} reader thread panicked"))?
        .with_context(|| format!("capture {name}"))
}

/// Read `reader` to the end, keeping the first `limit` bytes.
fn drain<R: Read>(mut reader: R, limit: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(captured);
        }
        let kept = limit.saturating_sub(captured.bytes.len()).min(n);
        captured.bytes.extend_from_slice(&chunk[..kept]);
        captured.dropped += n - kept;
    }
}
