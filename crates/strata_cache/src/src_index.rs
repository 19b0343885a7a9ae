//! Index of the generated files a build-layer produced.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_common::hash::hex;
use strata_common::ContentHash;

use crate::error::CacheError;

/// Current `buildSrcIndex.json` format version.
pub const SRC_INDEX_FORMAT_VERSION: u32 = 1;

/// One generated output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcIndexEntry {
    /// Hash of the file as the build wrote it.
    #[serde(with = "hex")]
    pub hash: ContentHash,
    /// File extension without the dot.
    pub extension: String,
    /// Layer whose source produced the file.
    pub layer: String,
    /// For an inner-declaration stub, the generated path of its outer file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_of: Option<String>,
    /// An unused inner stub granted one more pass before removal.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending_verification: bool,
    /// Still produced by a live source in the current pass.
    #[serde(skip)]
    pub in_use: bool,
}

impl SrcIndexEntry {
    /// Creates an in-use entry.
    pub fn new(hash: ContentHash, extension: impl Into<String>, layer: impl Into<String>) -> Self {
        Self {
            hash,
            extension: extension.into(),
            layer: layer.into(),
            inner_of: None,
            pending_verification: false,
            in_use: true,
        }
    }

    /// Marks this entry as an inner stub of `outer`.
    pub fn inner_of(mut self, outer: impl Into<String>) -> Self {
        self.inner_of = Some(outer.into());
        self
    }
}

/// All generated files of one build-layer, keyed by output-relative path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrcIndex {
    format_version: u32,
    entries: BTreeMap<String, SrcIndexEntry>,
}

impl SrcIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            format_version: SRC_INDEX_FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Loads an index; `None` if missing, unparsable, or from another
    /// format version. Loaded entries start out not in use.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        let index: Self = match serde_json::from_str(&content) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt source index");
                return None;
            }
        };
        if index.format_version != SRC_INDEX_FORMAT_VERSION {
            tracing::warn!(
                path = %path.display(),
                found = index.format_version,
                "discarding source index from another format version"
            );
            return None;
        }
        Some(index)
    }

    /// Writes the index as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| CacheError::io(path, e))
    }

    /// Looks up an entry.
    pub fn get(&self, rel: &str) -> Option<&SrcIndexEntry> {
        self.entries.get(rel)
    }

    pub(crate) fn get_mut(&mut self, rel: &str) -> Option<&mut SrcIndexEntry> {
        self.entries.get_mut(rel)
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, rel: impl Into<String>, entry: SrcIndexEntry) {
        self.entries.insert(rel.into(), entry);
    }

    /// Removes an entry.
    pub fn remove(&mut self, rel: &str) -> Option<SrcIndexEntry> {
        self.entries.remove(rel)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SrcIndexEntry)> {
        self.entries.iter()
    }

    /// Paths of entries not marked in use.
    pub fn unused(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.in_use)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Clears every in-use flag.
    pub fn reset_in_use(&mut self) {
        for entry in self.entries.values_mut() {
            entry.in_use = false;
        }
    }
}

impl Default for SrcIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_preserves_entries_but_not_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".strata/buildSrcIndex.json");
        let mut index = SrcIndex::new();
        index.insert(
            "app/Main.java",
            SrcIndexEntry::new(ContentHash::from_bytes(b"main"), "java", "app"),
        );
        index.insert(
            "app/Main$Inner.java",
            SrcIndexEntry::new(ContentHash::from_bytes(b"inner"), "java", "app")
                .inner_of("app/Main.java"),
        );
        index.save(&path).unwrap();

        let loaded = SrcIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        let main = loaded.get("app/Main.java").unwrap();
        assert_eq!(main.layer, "app");
        assert!(!main.in_use);
        assert_eq!(
            loaded.get("app/Main$Inner.java").unwrap().inner_of.as_deref(),
            Some("app/Main.java")
        );
    }

    #[test]
    fn hash_is_stored_as_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.json");
        let mut index = SrcIndex::new();
        let hash = ContentHash::from_bytes(b"x");
        index.insert("X.java", SrcIndexEntry::new(hash, "java", "app"));
        index.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(&hash.to_hex()));
        assert!(!text.contains("pending_verification"));
    }

    #[test]
    fn load_corrupt_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.json");
        std::fs::write(&path, "not valid json {{{").unwrap();
        assert!(SrcIndex::load(&path).is_none());
    }

    #[test]
    fn load_other_version_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.json");
        std::fs::write(&path, r#"{"format_version": 99, "entries": {}}"#).unwrap();
        assert!(SrcIndex::load(&path).is_none());
    }

    #[test]
    fn unused_lists_unmarked_entries() {
        let mut index = SrcIndex::new();
        index.insert("A.java", SrcIndexEntry::new(ContentHash::from_bytes(b"a"), "java", "l"));
        index.insert("B.java", SrcIndexEntry::new(ContentHash::from_bytes(b"b"), "java", "l"));
        assert!(index.unused().is_empty());
        index.reset_in_use();
        assert_eq!(index.unused(), vec!["A.java", "B.java"]);
    }
}
