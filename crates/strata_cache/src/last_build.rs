//! What the previous build pass saw and produced.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_common::hash::hex;
use strata_common::{ContentHash, Timestamp};

use crate::error::CacheError;

/// Current `lastBuild.json` format version.
pub const LAST_BUILD_FORMAT_VERSION: u32 = 1;

/// State of one source as of the last pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSource {
    /// Content hash of the source.
    #[serde(with = "hex")]
    pub hash: ContentHash,
    /// Generated files the source produced, relative to the output dir.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Types the source declared.
    #[serde(default)]
    pub types: Vec<String>,
    /// Relative paths of other sources it depends on; a change to any of
    /// them makes this source stale too.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// A higher layer's file at the same path replaced this one; only its
    /// declarations were indexed and it produced no outputs.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub shadowed: bool,
}

/// Record of the last build pass of one build-layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBuildRecord {
    format_version: u32,
    /// When the pass started.
    pub started_at: Timestamp,
    /// Sources keyed by `<layer>:<rel_path>`.
    pub sources: BTreeMap<String, LastSource>,
}

impl LastBuildRecord {
    /// Creates an empty record for a pass starting at `started_at`.
    pub fn new(started_at: Timestamp) -> Self {
        Self {
            format_version: LAST_BUILD_FORMAT_VERSION,
            started_at,
            sources: BTreeMap::new(),
        }
    }

    /// Loads a record; `None` if missing, corrupt, or from another version.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&content) {
            Ok(record) if record.format_version == LAST_BUILD_FORMAT_VERSION => Some(record),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "discarding last-build record from another format version");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt last-build record");
                None
            }
        }
    }

    /// Writes the record as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| CacheError::io(path, e))
    }

    /// Records a processed or carried-over source.
    pub fn record(&mut self, key: impl Into<String>, source: LastSource) {
        self.sources.insert(key.into(), source);
    }

    /// Looks up a source by key.
    pub fn get(&self, key: &str) -> Option<&LastSource> {
        self.sources.get(key)
    }
}
