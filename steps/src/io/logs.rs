//! Publishing of named step logs.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::NamedLog;

/// Destination for finished step logs.
pub trait LogSink {
    fn publish(&mut self, log: NamedLog) -> Result<()>;
}

/// Writes each log to `<dir>/<name>.log`.
///
/// Names are reduced to filesystem-safe characters; a name already written by
/// this sink gets a numeric suffix instead of overwriting the earlier log.
pub struct DirLogSink {
    dir: PathBuf,
    written: BTreeSet<String>,
}

impl DirLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: BTreeSet::new(),
        }
    }

    fn unique_stem(&mut self, name: &str) -> String {
        let base = file_stem(name);
        let mut stem = base.clone();
        let mut n = 2;
        while self.written.contains(&stem) {
            stem = format!("{base}-{n}");
            n += 1;
        }
        self.written.insert(stem.clone());
        stem
    }
}

impl LogSink for DirLogSink {
    fn publish(&mut self, log: NamedLog) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create log dir {}", self.dir.display()))?;
        let stem = self.unique_stem(log.name());
        let path = self.dir.join(format!("{stem}.log"));
        fs::write(&path, log.text()).with_context(|| format!("write log {}", path.display()))?;
        debug!(name = log.name(), path = %path.display(), "published log");
        Ok(())
    }
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "log".to_string()
    } else {
        stem.to_string()
    }
}
