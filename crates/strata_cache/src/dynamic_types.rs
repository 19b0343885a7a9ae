//! Types that need dynamic handling at runtime.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Current `dynTypeIndex.json` format version.
pub const DYNAMIC_TYPES_FORMAT_VERSION: u32 = 1;

/// Set of type names that must be treated as dynamic, persisted so the
/// next pass does not have to recompute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicTypeIndex {
    format_version: u32,
    types: BTreeSet<String>,
    #[serde(skip)]
    dirty: bool,
}

impl DynamicTypeIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            format_version: DYNAMIC_TYPES_FORMAT_VERSION,
            types: BTreeSet::new(),
            dirty: false,
        }
    }

    /// Loads the index; `None` if missing, corrupt, or from another version.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&content) {
            Ok(index) if index.format_version == DYNAMIC_TYPES_FORMAT_VERSION => Some(index),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt dynamic-type index");
                None
            }
        }
    }

    /// Writes the index if it changed since loading.
    pub fn save(&mut self, path: &Path) -> Result<(), CacheError> {
        if !self.dirty && path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| CacheError::io(path, e))?;
        self.dirty = false;
        Ok(())
    }

    /// Adds a type; returns `true` if it was new.
    pub fn insert(&mut self, type_name: impl Into<String>) -> bool {
        let added = self.types.insert(type_name.into());
        self.dirty |= added;
        added
    }

    /// Removes a type; returns `true` if it was present.
    pub fn remove(&mut self, type_name: &str) -> bool {
        let removed = self.types.remove(type_name);
        self.dirty |= removed;
        removed
    }

    /// Returns `true` if the type is dynamic.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains(type_name)
    }

    /// All dynamic types in name order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(String::as_str)
    }
}

impl Default for DynamicTypeIndex {
    fn default() -> Self {
        Self::new()
    }
}
