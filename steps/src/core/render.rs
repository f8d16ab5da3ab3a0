//! Rendering of failed and skipped tests into named logs.

use crate::core::results::{TestOutcome, TestResults};
use crate::core::types::{LogChannel, NamedLog};

/// Name of the combined log listing every test that did not run.
pub const SKIPPED_LOG: &str = "skipped";
/// Name used for a failed test whose `Name` element is missing or empty.
pub const UNNAMED_TEST: &str = "unnamed-test";

const SKIP_INDENT: usize = 2;

/// Clean one raw measurement for display.
///
/// CTest echoes regex matchers as `Regex=[...\n]`; the stray line break before
/// the closing bracket is moved after it. The text is trimmed, every line is
/// prefixed with `indent` spaces, and exactly one trailing newline is added.
pub fn clean_text(text: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let text = if text.contains("Regex=[") {
        text.replace("\n]", "]\n")
    } else {
        text.to_string()
    };
    let text = text.trim().replace('\n', &format!("\n{pad}"));
    format!("{pad}{text}\n")
}

/// One log per failed test, in document order.
///
/// Environment and command line go to the header channel, captured output to
/// stdout, and the fail reason to stderr.
pub fn render_failures(results: &TestResults) -> Vec<NamedLog> {
    results.failed().map(render_failure).collect()
}

fn render_failure(test: &TestOutcome) -> NamedLog {
    let name = if test.name.trim().is_empty() {
        UNNAMED_TEST
    } else {
        test.name.as_str()
    };
    let mut log = NamedLog::new(name);
    log.add_header(clean_text(&test.environment, 0));
    log.add_header(clean_text(&test.command_line, 0));
    log.add_stdout(clean_text(&test.output, 0));
    log.add_stderr(clean_text(test.fail_reason.as_deref().unwrap_or_default(), 0));
    log
}

/// The combined `skipped` log, or `None` when every test ran.
pub fn render_skipped(results: &TestResults) -> Option<NamedLog> {
    let mut log = NamedLog::new(SKIPPED_LOG);
    for test in results.not_run() {
        log.add_stdout(format!("{}\n", test.name));
        for (channel, text) in [
            (LogChannel::Header, &test.environment),
            (LogChannel::Header, &test.command_line),
            (LogChannel::Stdout, &test.output),
        ] {
            log.add(channel, clean_text(text, SKIP_INDENT));
        }
        log.add_stdout("\n");
    }
    (!log.is_empty()).then_some(log)
}
