//! Build-pipeline steps for CMake/CTest projects.
//!
//! Each subcommand runs one step and exits with the step's verdict (see
//! [`buildsteps::exit_codes`]). Named step logs are written as `<name>.log`
//! files into the log directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use buildsteps::cache_props::{CachePropsStep, run_cache_props};
use buildsteps::clean_old::{CleanOldStep, run_clean_old};
use buildsteps::core::cache::CacheParseOptions;
use buildsteps::core::invocation::CTestOptions;
use buildsteps::core::retention::GroupPattern;
use buildsteps::ctest::{CTestStep, run_ctest};
use buildsteps::exit_codes;
use buildsteps::io::command::ProcessRunner;
use buildsteps::io::config::{DEFAULT_CONFIG_PATH, StepsConfig, load_config};
use buildsteps::io::logs::DirLogSink;
use buildsteps::io::process::CancelToken;
use buildsteps::io::properties::{PropertyMap, render_properties, write_properties};
use buildsteps::io::transfer::CopyUploader;
use buildsteps::io::worker::LocalWorker;
use buildsteps::logging;
use buildsteps::upload::{UploadStep, run_upload};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "buildsteps",
    version,
    about = "Build-pipeline steps for CMake/CTest projects"
)]
struct Cli {
    /// Step configuration file (defaults apply when it does not exist).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run CTest and write one log per failed test plus a `skipped` log.
    Ctest(CTestArgs),
    /// Publish selected CMakeCache.txt entries as properties.
    CacheProps(CachePropsArgs),
    /// Delete all but the newest files of each group in a directory.
    CleanOld(CleanOldArgs),
    /// Upload a file unless a non-empty copy already exists at the destination.
    Upload(UploadArgs),
}

#[derive(Args)]
struct CTestArgs {
    /// Build directory to run CTest in.
    #[arg(long)]
    workdir: PathBuf,

    /// Multi-config build configuration to test (e.g. Release).
    #[arg(long)]
    build_config: Option<String>,

    /// CTest preset to test.
    #[arg(long)]
    preset: Option<String>,

    /// Tests to run in parallel (0 lets CTest decide).
    #[arg(long, default_value_t = 0)]
    jobs: u32,

    /// Only run tests matching this regex (repeatable).
    #[arg(long)]
    tests: Vec<String>,

    /// Skip tests matching this regex (repeatable).
    #[arg(long)]
    exclude_tests: Vec<String>,

    /// Only run tests with a label matching this regex (repeatable).
    #[arg(long)]
    labels: Vec<String>,

    /// Skip tests with a label matching this regex (repeatable).
    #[arg(long)]
    exclude_labels: Vec<String>,

    /// Test directory passed through to CTest.
    #[arg(long)]
    test_dir: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    /// Directory for step logs (default from config).
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Extra flags passed to CTest verbatim.
    #[arg(last = true)]
    extra_flags: Vec<String>,
}

#[derive(Args)]
struct CachePropsArgs {
    /// Build directory containing the cache file.
    #[arg(long)]
    workdir: PathBuf,

    /// Cache entry to publish (repeatable).
    #[arg(long = "prop")]
    props: Vec<String>,

    /// Map BOOL entries to "1" / "0".
    #[arg(long)]
    normalize_bools: bool,

    /// Split `;`-separated values into lists.
    #[arg(long)]
    expand_lists: bool,

    /// Write properties as JSON to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory for step logs (default from config).
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Args)]
struct CleanOldArgs {
    /// Directory whose entries are pruned.
    #[arg(long)]
    dir: PathBuf,

    /// Regex over file names; the first capture group is the group key.
    #[arg(long)]
    group_pattern: String,

    /// Newest entries to keep per group.
    #[arg(long, default_value_t = 1)]
    keep: usize,

    /// Directory for step logs (default from config).
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Args)]
struct UploadArgs {
    /// File to upload.
    local: PathBuf,

    /// Destination path; a leading `~` expands to the home directory.
    dest: PathBuf,

    /// Directory for step logs (default from config).
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Ctest(args) => cmd_ctest(&config, args),
        Command::CacheProps(args) => cmd_cache_props(&config, args),
        Command::CleanOld(args) => cmd_clean_old(&config, args),
        Command::Upload(args) => cmd_upload(&config, args),
    }
}

fn log_sink(config: &StepsConfig, log_dir: Option<PathBuf>) -> DirLogSink {
    DirLogSink::new(log_dir.unwrap_or_else(|| config.logs.dir.clone()))
}

fn cmd_ctest(config: &StepsConfig, args: CTestArgs) -> Result<i32> {
    let options = CTestOptions::from_parts(args.build_config, args.preset)?
        .jobs(args.jobs)
        .tests(args.tests)
        .exclude_tests(args.exclude_tests)
        .labels(args.labels)
        .exclude_labels(args.exclude_labels)
        .test_dir(args.test_dir.unwrap_or_default())
        .verbose(args.verbose)
        .extra_flags(args.extra_flags);
    let step = CTestStep {
        workdir: args.workdir,
        options,
        config: config.ctest.clone(),
    };
    let mut logs = log_sink(config, args.log_dir);
    let outcome = run_ctest(
        &step,
        &ProcessRunner,
        &LocalWorker,
        &mut logs,
        &CancelToken::new(),
    )?;

    let summary = outcome.summary;
    println!(
        "{} passed, {} failed, {} not run, {} other",
        summary.passed, summary.failed, summary.not_run, summary.other
    );
    Ok(outcome.result.exit_code())
}

fn cmd_cache_props(config: &StepsConfig, args: CachePropsArgs) -> Result<i32> {
    let step = CachePropsStep {
        cache_file: args.workdir.join(&config.cache.file_name),
        props: args.props.into_iter().collect::<BTreeSet<_>>(),
        parse: CacheParseOptions {
            normalize_bools: args.normalize_bools,
            expand_lists: args.expand_lists,
        },
    };
    let mut properties = PropertyMap::new();
    let mut logs = log_sink(config, args.log_dir);
    let result = run_cache_props(&step, &LocalWorker, &mut properties, &mut logs)?;

    match args.output {
        Some(path) => write_properties(&path, &properties)?,
        None => print!("{}", render_properties(&properties)?),
    }
    Ok(result.exit_code())
}

fn cmd_clean_old(config: &StepsConfig, args: CleanOldArgs) -> Result<i32> {
    let pattern = GroupPattern::new(&args.group_pattern)
        .with_context(|| format!("invalid group pattern {}", args.group_pattern))?;
    let step = CleanOldStep {
        dir: args.dir,
        keep: args.keep,
    };
    let mut logs = log_sink(config, args.log_dir);
    let result = run_clean_old(&step, |path: &Path| pattern.key(path), &mut logs)?;
    Ok(result.exit_code())
}

fn cmd_upload(config: &StepsConfig, args: UploadArgs) -> Result<i32> {
    let step = UploadStep {
        local: args.local,
        dest: args.dest,
    };
    let mut logs = log_sink(config, args.log_dir);
    let result = run_upload(&step, &CopyUploader, &mut logs)?;
    Ok(result.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ctest_with_filters_and_extra_flags() {
        let cli = Cli::parse_from([
            "buildsteps",
            "ctest",
            "--workdir",
            "build",
            "--build-config",
            "Release",
            "--jobs",
            "8",
            "--tests",
            "correctness_.*",
            "--tests",
            "performance_.*",
            "--",
            "--repeat",
            "until-pass:2",
        ]);
        let Command::Ctest(args) = cli.command else {
            panic!("expected ctest");
        };
        assert_eq!(args.workdir, PathBuf::from("build"));
        assert_eq!(args.build_config.as_deref(), Some("Release"));
        assert_eq!(args.jobs, 8);
        assert_eq!(args.tests, vec!["correctness_.*", "performance_.*"]);
        assert_eq!(args.extra_flags, vec!["--repeat", "until-pass:2"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn parse_cache_props_repeated_prop() {
        let cli = Cli::parse_from([
            "buildsteps",
            "cache-props",
            "--workdir",
            "build",
            "--prop",
            "FOO",
            "--prop",
            "BAR",
            "--normalize-bools",
        ]);
        let Command::CacheProps(args) = cli.command else {
            panic!("expected cache-props");
        };
        assert_eq!(args.props, vec!["FOO", "BAR"]);
        assert!(args.normalize_bools);
        assert!(!args.expand_lists);
    }

    #[test]
    fn parse_clean_old_defaults_keep_to_one() {
        let cli = Cli::parse_from([
            "buildsteps",
            "--config",
            "ci.toml",
            "clean-old",
            "--dir",
            "/dist",
            "--group-pattern",
            "^(.*)-[0-9a-f]+\\.tgz$",
        ]);
        let Command::CleanOld(args) = cli.command else {
            panic!("expected clean-old");
        };
        assert_eq!(args.keep, 1);
        assert_eq!(cli.config, PathBuf::from("ci.toml"));
    }

    #[test]
    fn parse_upload_positionals() {
        let cli = Cli::parse_from(["buildsteps", "upload", "halide.tgz", "~/dist/halide.tgz"]);
        let Command::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.local, PathBuf::from("halide.tgz"));
        assert_eq!(args.dest, PathBuf::from("~/dist/halide.tgz"));
    }

    #[test]
    fn ctest_requires_workdir() {
        let result = Cli::try_parse_from(["buildsteps", "ctest", "--preset", "ci"]);
        assert!(result.is_err());
    }
}
