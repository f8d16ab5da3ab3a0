//! Named step outputs ("properties").

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::cache::CacheValue;

/// Destination for named step outputs.
pub trait PropertySink {
    fn set_property(&mut self, name: &str, value: CacheValue, source: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub value: CacheValue,
    pub source: String,
}

/// In-memory property set, serializable as a JSON object keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, Property>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.0.iter()
    }
}

impl PropertySink for PropertyMap {
    fn set_property(&mut self, name: &str, value: CacheValue, source: &str) -> Result<()> {
        self.0.insert(
            name.to_string(),
            Property {
                value,
                source: source.to_string(),
            },
        );
        Ok(())
    }
}

/// Serialize properties to pretty-printed JSON with trailing newline.
pub fn render_properties(properties: &PropertyMap) -> Result<String> {
    let mut payload = serde_json::to_string_pretty(properties).context("serialize properties")?;
    payload.push('\n');
    Ok(payload)
}

/// Atomically write properties as JSON (temp file + rename).
pub fn write_properties(path: &Path, properties: &PropertyMap) -> Result<()> {
    let payload = render_properties(properties)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload)
        .with_context(|| format!("write temp properties {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace properties {}", path.display()))?;
    Ok(())
}
