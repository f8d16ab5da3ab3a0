//! Parsing for `CMakeCache.txt`.
//!
//! Each non-comment line has the shape `NAME[-ADVANCED]:TYPE=VALUE`. The
//! format has been stable for a long time, so a single regex covers the
//! tool-authored subset. Quoted names and untyped entries, which CMake also
//! accepts, are not recognized; lines that do not match are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StepError;

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:=]+?)(-ADVANCED)?:([^=]*)=(.*)$").unwrap());

/// One parsed cache line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub name: String,
    pub is_advanced: bool,
    pub ty: String,
    pub raw_value: String,
}

/// A cache value after optional list expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheValue {
    Scalar(String),
    List(Vec<String>),
}

impl CacheValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        CacheValue::Scalar(value.into())
    }
}

/// Renders the value back in cache syntax (lists joined with `;`).
impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Scalar(value) => f.write_str(value),
            CacheValue::List(items) => f.write_str(&items.join(";")),
        }
    }
}

pub type CacheMap = BTreeMap<String, CacheValue>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheParseOptions {
    /// Map `BOOL` entries onto `"1"` / `"0"`.
    pub normalize_bools: bool,
    /// Split values containing `;` into lists.
    pub expand_lists: bool,
}

/// Parse every entry line, skipping comments and lines outside the grammar.
pub fn parse_entries(text: &str) -> Vec<CacheEntry> {
    text.lines().filter_map(parse_entry).collect()
}

fn parse_entry(line: &str) -> Option<CacheEntry> {
    if line.starts_with("//") || line.starts_with('#') {
        return None;
    }
    let caps = ENTRY_RE.captures(line)?;
    Some(CacheEntry {
        name: caps[1].to_string(),
        is_advanced: caps.get(2).is_some(),
        ty: caps[3].to_string(),
        raw_value: caps[4].to_string(),
    })
}

/// Parse cache text into a name → value mapping.
///
/// A later entry with the same name replaces an earlier one. Fails only when
/// `normalize_bools` is set and a `BOOL` entry holds something that is not a
/// CMake boolean.
pub fn parse_cache(text: &str, options: CacheParseOptions) -> Result<CacheMap, StepError> {
    let mut cache = CacheMap::new();
    for entry in parse_entries(text) {
        let value = if entry.ty == "BOOL" && options.normalize_bools {
            normalize_bool(&entry.raw_value)
                .ok_or_else(|| StepError::InvalidBooleanValue {
                    name: entry.name.clone(),
                    value: entry.raw_value.clone(),
                })?
                .to_string()
        } else {
            entry.raw_value
        };
        let value = if options.expand_lists {
            expand_list(value)
        } else {
            CacheValue::Scalar(value)
        };
        cache.insert(entry.name, value);
    }
    Ok(cache)
}

/// Normalize a CMake boolean literal to `"1"` or `"0"`.
///
/// Returns `None` for anything CMake would not accept as a boolean.
pub fn normalize_bool(value: &str) -> Option<&'static str> {
    let value = value.to_uppercase();
    let value = value.trim();
    if value.ends_with("-NOTFOUND") {
        return Some("0");
    }
    match value {
        "1" | "ON" | "YES" | "TRUE" | "Y" => Some("1"),
        "0" | "OFF" | "NO" | "FALSE" | "N" | "IGNORE" | "NOTFOUND" => Some("0"),
        _ => None,
    }
}

/// Split `a;b;c` into a list; CMake lists may hold empty elements, so those are kept.
pub fn expand_list(value: String) -> CacheValue {
    if value.contains(';') {
        CacheValue::List(value.split(';').map(str::to_string).collect())
    } else {
        CacheValue::Scalar(value)
    }
}

/// Requested keys partitioned by presence in the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheLookup {
    pub found: BTreeMap<String, CacheValue>,
    pub missing: BTreeSet<String>,
}

/// Look up `requested` keys; absent keys are reported, not treated as errors.
pub fn lookup_keys(cache: &CacheMap, requested: &BTreeSet<String>) -> CacheLookup {
    let mut lookup = CacheLookup::default();
    for key in requested {
        match cache.get(key) {
            Some(value) => {
                lookup.found.insert(key.clone(), value.clone());
            }
            None => {
                lookup.missing.insert(key.clone());
            }
        }
    }
    lookup
}
