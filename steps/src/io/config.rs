//! Step configuration stored in a TOML file (default `buildsteps.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "buildsteps.toml";

/// Build step configuration (TOML).
///
/// Missing fields default to the values CTest and CMake use out of the box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct StepsConfig {
    pub ctest: CTestConfig,
    pub cache: CacheConfig,
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CTestConfig {
    /// Test driver executable.
    pub program: String,

    /// Kill the test driver after this many seconds.
    pub timeout_secs: u64,

    /// Truncate captured driver stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Directory (relative to the working directory) the driver writes results into.
    /// Removed before each run.
    pub results_dir: PathBuf,

    /// Glob (relative to the working directory) that must match exactly one result file.
    pub results_glob: String,
}

impl Default for CTestConfig {
    fn default() -> Self {
        Self {
            program: "ctest".to_string(),
            timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
            results_dir: PathBuf::from("Testing"),
            results_glob: "Testing/*/*.xml".to_string(),
        }
    }
}

impl CTestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file name inside the working directory.
    pub file_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file_name: "CMakeCache.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogsConfig {
    /// Directory named step logs are written to.
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("build-logs"),
        }
    }
}

impl StepsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ctest.program.trim().is_empty() {
            return Err(anyhow!("ctest.program must be non-empty"));
        }
        if self.ctest.timeout_secs == 0 {
            return Err(anyhow!("ctest.timeout_secs must be > 0"));
        }
        if self.ctest.output_limit_bytes == 0 {
            return Err(anyhow!("ctest.output_limit_bytes must be > 0"));
        }
        if self.ctest.results_glob.trim().is_empty() {
            return Err(anyhow!("ctest.results_glob must be non-empty"));
        }
        if self.cache.file_name.trim().is_empty() {
            return Err(anyhow!("cache.file_name must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StepsConfig::default()`.
pub fn load_config(path: &Path) -> Result<StepsConfig> {
    if !path.exists() {
        let cfg = StepsConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StepsConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
