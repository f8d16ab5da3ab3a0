//! Filesystem access to the execution context a step runs against.
//!
//! Steps never touch the worker's files directly; they go through [`Worker`]
//! so that a remote transport (or a fake in tests) can stand in for the
//! local filesystem.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::GlobBuilder;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::error::StepError;

pub trait Worker {
    /// Full contents of `path`. A missing file fails with
    /// [`StepError::RemoteFileNotFound`].
    fn fetch_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Paths under `root` whose root-relative path matches `pattern`, sorted.
    ///
    /// `*` and `?` do not cross directory separators. A missing `root` yields
    /// no matches.
    fn glob(&self, root: &Path, pattern: &str) -> Result<Vec<PathBuf>>;

    /// Remove a directory tree. An already-absent directory is not an error.
    fn remove_dir(&self, path: &Path) -> Result<()>;
}

/// Worker backed by the local filesystem.
pub struct LocalWorker;

impl Worker for LocalWorker {
    fn fetch_file(&self, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StepError::RemoteFileNotFound(path.to_path_buf()).into())
            }
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    #[instrument(skip(self, root), fields(root = %root.display()))]
    fn glob(&self, root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob {pattern}"))?
            .compile_matcher();
        let (prefix, max_depth) = walk_bounds(pattern);
        let base = root.join(&prefix);
        if !base.exists() {
            debug!(base = %base.display(), "glob base missing, no matches");
            return Ok(Vec::new());
        }

        let mut walk = WalkDir::new(&base).min_depth(1);
        if let Some(depth) = max_depth {
            walk = walk.max_depth(depth);
        }
        let mut matches = Vec::new();
        for entry in walk {
            let entry = entry.with_context(|| format!("walk {}", base.display()))?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .with_context(|| format!("strip prefix {}", root.display()))?;
            if matcher.is_match(relative) {
                matches.push(entry.path().to_path_buf());
            }
        }
        matches.sort();
        debug!(count = matches.len(), "glob finished");
        Ok(matches)
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed directory");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }
}

/// Split `pattern` into its literal leading directories and the walk depth
/// below them. The depth is unbounded when a `**` component appears.
fn walk_bounds(pattern: &str) -> (PathBuf, Option<usize>) {
    let components: Vec<&str> = pattern.split('/').filter(|part| !part.is_empty()).collect();
    let literal = components
        .iter()
        .take(components.len().saturating_sub(1))
        .take_while(|part| !part.contains(['*', '?', '[', '{', '\\']))
        .count();
    let rest = &components[literal..];
    let depth = (!rest.contains(&"**")).then_some(rest.len());
    (components[..literal].iter().collect(), depth)
}
