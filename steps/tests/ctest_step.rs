//! Step-level tests for `run_ctest`, driven through scripted fakes.
//!
//! The runner, worker and log sink are all in memory, so each test states
//! exactly which result files exist and what CTest "printed".

use std::io::ErrorKind;
use std::path::PathBuf;

use buildsteps::core::invocation::CTestOptions;
use buildsteps::core::results::ResultSummary;
use buildsteps::core::types::{LogChannel, StepResult};
use buildsteps::ctest::{CTestStep, STDIO_LOG, run_ctest};
use buildsteps::error::StepError;
use buildsteps::io::command::CommandOutcome;
use buildsteps::io::config::CTestConfig;
use buildsteps::io::process::CancelToken;
use buildsteps::test_support::{FakeWorker, MemoryLogSink, ScriptedRunner};

const FIXTURE: &str = include_str!("fixtures/Test.xml");
const RESULTS_FILE: &str = "/build/Testing/20240102-0304/Test.xml";

fn step() -> CTestStep {
    let options = CTestOptions::from_parts(Some("Release".to_string()), None)
        .expect("options")
        .jobs(4);
    CTestStep {
        workdir: PathBuf::from("/build"),
        options,
        config: CTestConfig::default(),
    }
}

fn fixture_worker() -> FakeWorker {
    FakeWorker::new()
        .with_file(RESULTS_FILE, FIXTURE)
        .with_glob_matches([RESULTS_FILE])
}

fn failing_run() -> CommandOutcome {
    CommandOutcome {
        exit_code: Some(8),
        stdout: "67% tests passed, 2 tests failed out of 6\n".to_string(),
        ..CommandOutcome::default()
    }
}

#[test]
fn failing_run_renders_failed_and_skipped_logs() {
    let runner = ScriptedRunner::new(vec![failing_run()]);
    let worker = fixture_worker();
    let mut logs = MemoryLogSink::new();

    let outcome = run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new())
        .expect("run ctest");

    assert_eq!(outcome.result, StepResult::Failure);
    assert_eq!(outcome.exit_code, Some(8));
    assert_eq!(outcome.results_file, Some(PathBuf::from(RESULTS_FILE)));
    assert_eq!(
        outcome.summary,
        ResultSummary {
            passed: 1,
            failed: 2,
            not_run: 2,
            other: 1,
        }
    );
    assert_eq!(
        outcome.failed_logs,
        vec!["correctness_bounds", "generator_aot_cuda"]
    );
    assert!(outcome.skipped_log);
    assert_eq!(
        logs.names(),
        vec![
            STDIO_LOG,
            "correctness_bounds",
            "generator_aot_cuda",
            "skipped"
        ]
    );
    runner.assert_drained().expect("runner drained");
}

#[test]
fn failed_log_separates_channels() {
    let runner = ScriptedRunner::new(vec![failing_run()]);
    let worker = fixture_worker();
    let mut logs = MemoryLogSink::new();
    run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new()).expect("run ctest");

    let bounds = logs.get("correctness_bounds").expect("bounds log");
    assert_eq!(
        bounds.channel_text(LogChannel::Header),
        "#CTEST_RESOURCE_GROUP_COUNT=\nHL_TARGET=host\n/build/test/correctness_bounds\n"
    );
    assert_eq!(
        bounds.channel_text(LogChannel::Stdout),
        "Error: bounds of f were < 0 & unchecked\n"
    );
    assert_eq!(
        bounds.channel_text(LogChannel::Stderr),
        "Required regular expression not found. Regex=[Success!]\n"
    );

    let cuda = logs.get("generator_aot_cuda").expect("cuda log");
    assert_eq!(
        cuda.channel_text(LogChannel::Stdout),
        "CUDA error: no device <0>\n"
    );
}

#[test]
fn skipped_log_lists_not_run_tests_in_document_order() {
    let runner = ScriptedRunner::new(vec![failing_run()]);
    let worker = fixture_worker();
    let mut logs = MemoryLogSink::new();
    run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new()).expect("run ctest");

    let skipped = logs.get("skipped").expect("skipped log");
    assert_eq!(
        skipped.text(),
        concat!(
            "performance_fast_pow\n",
            "  \n",
            "  \n",
            "  Disabled\n",
            "\n",
            "generator_aot_opencl\n",
            "  HL_TARGET=host-opencl\n",
            "  /build/test/generator_aot_opencl\n",
            "  Unable to find required resources\n",
            "  for this test\n",
            "\n",
        )
    );
}

#[test]
fn runs_compiled_command_in_workdir_after_clearing_stale_results() {
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0)]);
    let worker = fixture_worker();
    let mut logs = MemoryLogSink::new();

    let outcome = run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new())
        .expect("run ctest");

    assert_eq!(outcome.result, StepResult::Success);
    assert_eq!(worker.removed_dirs(), vec![PathBuf::from("/build/Testing")]);
    assert_eq!(
        worker.globs(),
        vec![(PathBuf::from("/build"), "Testing/*/*.xml".to_string())]
    );

    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].workdir, PathBuf::from("/build"));
    assert_eq!(
        requests[0].argv,
        vec![
            "ctest",
            "--parallel",
            "4",
            "--output-on-failure",
            "--test-action",
            "Test",
            "--no-compress-output",
            "--build-config",
            "Release",
        ]
    );
    assert_eq!(outcome.command, requests[0].argv);
}

#[test]
fn stale_results_cleanup_failure_is_not_fatal() {
    let runner = ScriptedRunner::new(vec![failing_run()]);
    let worker =
        fixture_worker().with_remove_error("/build/Testing", ErrorKind::PermissionDenied);
    let mut logs = MemoryLogSink::new();

    let outcome = run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new())
        .expect("run ctest");

    assert_eq!(outcome.result, StepResult::Failure);
    assert_eq!(worker.removed_dirs(), vec![PathBuf::from("/build/Testing")]);
    assert_eq!(runner.requests().len(), 1);
    assert_eq!(
        outcome.failed_logs,
        vec!["correctness_bounds", "generator_aot_cuda"]
    );
}

#[test]
fn stdio_log_records_command_and_exit() {
    let runner = ScriptedRunner::new(vec![failing_run()]);
    let worker = fixture_worker();
    let mut logs = MemoryLogSink::new();
    run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new()).expect("run ctest");

    let stdio = logs.get(STDIO_LOG).expect("stdio log");
    assert!(stdio.text().starts_with("ctest --parallel 4 "));
    assert_eq!(
        stdio.channel_text(LogChannel::Stdout),
        "67% tests passed, 2 tests failed out of 6\n"
    );
    assert!(stdio.text().ends_with("program finished: exit code 8\n"));
}

#[test]
fn no_result_file_is_ambiguous() {
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0)]);
    let worker = FakeWorker::new();
    let mut logs = MemoryLogSink::new();

    let err = run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new())
        .expect_err("no results");
    let Some(StepError::AmbiguousResultSet { found }) = err.downcast_ref::<StepError>() else {
        panic!("expected ambiguous result set, got {err:#}");
    };
    assert!(found.is_empty());
    assert!(worker.fetched().is_empty());
    assert_eq!(logs.names(), vec![STDIO_LOG]);
}

#[test]
fn two_result_files_are_ambiguous() {
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0)]);
    let worker = FakeWorker::new().with_glob_matches([
        "/build/Testing/a/Test.xml",
        "/build/Testing/b/Test.xml",
    ]);
    let mut logs = MemoryLogSink::new();

    let err = run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new())
        .expect_err("two results");
    let Some(StepError::AmbiguousResultSet { found }) = err.downcast_ref::<StepError>() else {
        panic!("expected ambiguous result set, got {err:#}");
    };
    assert_eq!(found.len(), 2);
    assert!(err.to_string().contains("expected to find a single XML file, got 2"));
}

#[test]
fn malformed_report_renders_nothing() {
    let runner = ScriptedRunner::new(vec![failing_run()]);
    let worker = FakeWorker::new()
        .with_file(RESULTS_FILE, r#"<Site><Test Status="failed"><Name>x</Name></Site>"#)
        .with_glob_matches([RESULTS_FILE]);
    let mut logs = MemoryLogSink::new();

    let err = run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new())
        .expect_err("malformed");
    assert!(matches!(
        err.downcast_ref::<StepError>(),
        Some(StepError::MalformedReport { .. })
    ));
    assert_eq!(logs.names(), vec![STDIO_LOG]);
}

#[test]
fn fetch_failure_surfaces_transport_error() {
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0)]);
    let worker = FakeWorker::new()
        .with_glob_matches([RESULTS_FILE])
        .with_fetch_error(RESULTS_FILE, ErrorKind::ConnectionReset);
    let mut logs = MemoryLogSink::new();

    let err = run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new())
        .expect_err("fetch failed");
    let io_err = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>())
        .expect("io error in chain");
    assert_eq!(io_err.kind(), ErrorKind::ConnectionReset);
}

#[test]
fn cancelled_run_skips_result_collection() {
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0)]);
    let worker = fixture_worker();
    let mut logs = MemoryLogSink::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = run_ctest(&step(), &runner, &worker, &mut logs, &cancel).expect("run ctest");
    assert_eq!(outcome.result, StepResult::Cancelled);
    assert!(outcome.results_file.is_none());
    assert!(worker.globs().is_empty());
    assert_eq!(logs.names(), vec![STDIO_LOG]);
    assert!(
        logs.get(STDIO_LOG)
            .expect("stdio")
            .text()
            .ends_with("program finished: cancelled\n")
    );
}

#[test]
fn timed_out_run_fails_without_collecting_results() {
    let runner = ScriptedRunner::new(vec![CommandOutcome {
        timed_out: true,
        ..CommandOutcome::default()
    }]);
    let worker = fixture_worker();
    let mut logs = MemoryLogSink::new();

    let outcome = run_ctest(&step(), &runner, &worker, &mut logs, &CancelToken::new())
        .expect("run ctest");
    assert_eq!(outcome.result, StepResult::Failure);
    assert!(worker.fetched().is_empty());
    assert!(outcome.failed_logs.is_empty());
}

#[test]
fn conflicting_targets_fail_before_any_io() {
    let err = CTestOptions::from_parts(Some("Release".to_string()), Some("ci".to_string()))
        .expect_err("both targets");
    assert!(matches!(err, StepError::InvalidInvocation(_)));
    let err = CTestOptions::from_parts(None, None).expect_err("no target");
    assert!(matches!(err, StepError::InvalidInvocation(_)));
}
