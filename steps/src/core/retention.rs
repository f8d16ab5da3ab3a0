//! Retention planning: which artifacts to delete so that each group keeps
//! only its newest entries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;

/// A filesystem entry considered for retention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl RetentionEntry {
    pub fn new(path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }
}

/// Group entries by key, each group ordered newest first.
///
/// Entries for which `group_fn` returns `None` are left out entirely. Entries
/// with equal modification times keep their input order.
pub fn group_entries<F>(
    entries: &[RetentionEntry],
    group_fn: F,
) -> BTreeMap<String, Vec<RetentionEntry>>
where
    F: Fn(&Path) -> Option<String>,
{
    let mut groups: BTreeMap<String, Vec<RetentionEntry>> = BTreeMap::new();
    for entry in entries {
        if let Some(key) = group_fn(&entry.path) {
            groups.entry(key).or_default().push(entry.clone());
        }
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| b.modified.cmp(&a.modified));
    }
    groups
}

/// Paths to delete: everything past the newest `keep` entries of each group.
pub fn plan_prune<F>(entries: &[RetentionEntry], group_fn: F, keep: usize) -> Vec<PathBuf>
where
    F: Fn(&Path) -> Option<String>,
{
    group_entries(entries, group_fn)
        .into_values()
        .flat_map(|group| group.into_iter().skip(keep).map(|entry| entry.path))
        .collect()
}

/// Grouping by a regular expression over file names.
///
/// The key is the first capture group, or the whole match when the pattern
/// has no groups. Names that do not match (or whose first group did not
/// participate) are left ungrouped.
#[derive(Debug, Clone)]
pub struct GroupPattern {
    regex: Regex,
}

impl GroupPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    pub fn key(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        let captures = self.regex.captures(name)?;
        let key = if self.regex.captures_len() > 1 {
            captures.get(1)?
        } else {
            captures.get(0)?
        };
        Some(key.as_str().to_string())
    }
}
