//! CTest command-line construction.
//!
//! Flag order is fixed so that the rendered invocation can be diffed between
//! runs.

use crate::error::StepError;

/// What CTest should test against: a multi-config build configuration or a preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    Config(String),
    Preset(String),
}

/// Validated, immutable CTest options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CTestOptions {
    target: BuildTarget,
    jobs: Option<u32>,
    tests: Vec<String>,
    exclude_tests: Vec<String>,
    labels: Vec<String>,
    exclude_labels: Vec<String>,
    test_dir: Option<String>,
    verbose: bool,
    extra_flags: Vec<String>,
}

impl CTestOptions {
    pub fn new(target: BuildTarget) -> Self {
        Self {
            target,
            jobs: None,
            tests: Vec::new(),
            exclude_tests: Vec::new(),
            labels: Vec::new(),
            exclude_labels: Vec::new(),
            test_dir: None,
            verbose: false,
            extra_flags: Vec::new(),
        }
    }

    /// Build options from an optional build config and optional preset.
    ///
    /// Exactly one of the two must be given.
    pub fn from_parts(
        build_config: Option<String>,
        preset: Option<String>,
    ) -> Result<Self, StepError> {
        let target = match (build_config, preset) {
            (Some(config), None) => BuildTarget::Config(config),
            (None, Some(preset)) => BuildTarget::Preset(preset),
            (Some(_), Some(_)) => {
                return Err(StepError::InvalidInvocation(
                    "pass either a build config or a preset, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(StepError::InvalidInvocation(
                    "a build config or a preset is required".to_string(),
                ));
            }
        };
        if let BuildTarget::Config(name) | BuildTarget::Preset(name) = &target
            && name.trim().is_empty()
        {
            return Err(StepError::InvalidInvocation(
                "build config / preset name must not be empty".to_string(),
            ));
        }
        Ok(Self::new(target))
    }

    /// Number of tests to run in parallel. `0` leaves the flag out.
    pub fn jobs(mut self, jobs: u32) -> Self {
        self.jobs = Some(jobs).filter(|jobs| *jobs > 0);
        self
    }

    pub fn tests<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tests = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_tests<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_tests = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn labels<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_labels<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_labels = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn test_dir(mut self, dir: impl Into<String>) -> Self {
        self.test_dir = Some(dir.into()).filter(|dir| !dir.is_empty());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn extra_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// Compile the options to an argument vector starting with `program`.
    pub fn command(&self, program: &str) -> Vec<String> {
        let mut argv = vec![program.to_string()];
        if let Some(jobs) = self.jobs {
            push_flag(&mut argv, "--parallel", jobs.to_string());
        }
        push_alternation(&mut argv, "--tests-regex", &self.tests);
        push_alternation(&mut argv, "--exclude-regex", &self.exclude_tests);
        push_alternation(&mut argv, "--label-regex", &self.labels);
        push_alternation(&mut argv, "--label-exclude", &self.exclude_labels);
        if let Some(dir) = &self.test_dir {
            push_flag(&mut argv, "--test-dir", dir.clone());
        }
        if self.verbose {
            argv.push("--verbose".to_string());
        }
        argv.extend(self.extra_flags.iter().cloned());
        argv.push("--output-on-failure".to_string());
        push_flag(&mut argv, "--test-action", "Test".to_string());
        argv.push("--no-compress-output".to_string());
        match &self.target {
            BuildTarget::Config(config) => push_flag(&mut argv, "--build-config", config.clone()),
            BuildTarget::Preset(preset) => push_flag(&mut argv, "--preset", preset.clone()),
        }
        argv
    }
}

fn push_flag(argv: &mut Vec<String>, flag: &str, value: String) {
    argv.push(flag.to_string());
    argv.push(value);
}

/// CTest selects tests by regex, so several patterns become one alternation.
fn push_alternation(argv: &mut Vec<String>, flag: &str, patterns: &[String]) {
    if patterns.is_empty() {
        return;
    }
    push_flag(argv, flag, patterns.join("|"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_invocation() {
        let options = CTestOptions::new(BuildTarget::Config("Release".to_string()));
        assert_eq!(
            options.command("ctest"),
            vec![
                "ctest",
                "--output-on-failure",
                "--test-action",
                "Test",
                "--no-compress-output",
                "--build-config",
                "Release",
            ]
        );
    }

    #[test]
    fn full_invocation_keeps_fixed_flag_order() {
        let options = CTestOptions::new(BuildTarget::Preset("ci".to_string()))
            .jobs(8)
            .tests(["correctness_.*", "performance_.*"])
            .exclude_tests(["flaky"])
            .labels(["python"])
            .exclude_labels(["slow", "gpu"])
            .test_dir("build/test")
            .verbose(true)
            .extra_flags(["--timeout", "600"]);

        assert_eq!(
            options.command("ctest"),
            vec![
                "ctest",
                "--parallel",
                "8",
                "--tests-regex",
                "correctness_.*|performance_.*",
                "--exclude-regex",
                "flaky",
                "--label-regex",
                "python",
                "--label-exclude",
                "slow|gpu",
                "--test-dir",
                "build/test",
                "--verbose",
                "--timeout",
                "600",
                "--output-on-failure",
                "--test-action",
                "Test",
                "--no-compress-output",
                "--preset",
                "ci",
            ]
        );
    }

    #[test]
    fn absent_options_emit_no_flags() {
        let options = CTestOptions::new(BuildTarget::Config("Debug".to_string()))
            .jobs(0)
            .tests(Vec::<String>::new())
            .test_dir("");
        let argv = options.command("ctest");
        assert!(!argv.iter().any(|arg| arg == "--parallel"));
        assert!(!argv.iter().any(|arg| arg == "--tests-regex"));
        assert!(!argv.iter().any(|arg| arg == "--test-dir"));
    }

    #[test]
    fn from_parts_requires_exactly_one_target() {
        let both = CTestOptions::from_parts(Some("Release".into()), Some("ci".into()));
        assert!(matches!(both, Err(StepError::InvalidInvocation(_))));

        let neither = CTestOptions::from_parts(None, None);
        assert!(matches!(neither, Err(StepError::InvalidInvocation(_))));

        let empty = CTestOptions::from_parts(Some(" ".into()), None);
        assert!(matches!(empty, Err(StepError::InvalidInvocation(_))));

        let preset = CTestOptions::from_parts(None, Some("ci".into())).expect("preset");
        assert_eq!(preset.target(), &BuildTarget::Preset("ci".to_string()));
    }
}
