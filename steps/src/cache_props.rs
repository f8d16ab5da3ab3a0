//! Orchestration for the `cache-props` step: publish selected
//! `CMakeCache.txt` entries as step properties.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::cache::{CacheParseOptions, CacheValue, lookup_keys, parse_cache};
use crate::core::types::{NamedLog, StepResult};
use crate::io::logs::LogSink;
use crate::io::properties::PropertySink;
use crate::io::worker::Worker;

/// Name of the log listing published and missing entries.
pub const PROPS_LOG: &str = "props";
/// Source recorded on every published property.
pub const PROPERTY_SOURCE: &str = "CMakeCache";

#[derive(Debug, Clone)]
pub struct CachePropsStep {
    /// Path of the cache file on the worker.
    pub cache_file: PathBuf,
    /// Entries to publish.
    pub props: BTreeSet<String>,
    pub parse: CacheParseOptions,
}

/// Publish each requested entry, or `""` for entries the cache lacks.
///
/// Missing entries degrade the verdict to `Warnings`; an unreadable cache or
/// an invalid boolean is an error.
#[instrument(skip_all, fields(cache_file = %step.cache_file.display(), props = step.props.len()))]
pub fn run_cache_props<W: Worker, P: PropertySink, L: LogSink>(
    step: &CachePropsStep,
    worker: &W,
    properties: &mut P,
    logs: &mut L,
) -> Result<StepResult> {
    if step.props.is_empty() {
        debug!("no properties requested");
        return Ok(StepResult::Success);
    }

    let contents = worker
        .fetch_file(&step.cache_file)
        .with_context(|| format!("fetch {}", step.cache_file.display()))?;
    let text = String::from_utf8(contents)
        .with_context(|| format!("{} is not UTF-8", step.cache_file.display()))?;
    let cache = parse_cache(&text, step.parse)?;
    let lookup = lookup_keys(&cache, &step.props);

    let mut log = NamedLog::new(PROPS_LOG);
    for (key, value) in lookup.found {
        log.add_stdout(format!("{key}={value}\n"));
        properties.set_property(&key, value, PROPERTY_SOURCE)?;
    }
    for key in &lookup.missing {
        warn!(key = key.as_str(), "cache entry not found");
        log.add_stderr(format!("Cache entry not found: {key}\n"));
        properties.set_property(key, CacheValue::scalar(""), PROPERTY_SOURCE)?;
    }
    logs.publish(log).context("publish props log")?;

    if lookup.missing.is_empty() {
        Ok(StepResult::Success)
    } else {
        Ok(StepResult::Warnings)
    }
}
