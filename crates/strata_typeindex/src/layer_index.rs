//! Forward type maps of a single layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entry::TypeIndexEntry;
use crate::error::TypeIndexError;

/// Current `.tidx` payload format version.
pub const TYPE_INDEX_FORMAT_VERSION: u32 = 1;

/// Types declared by one layer, keyed by full name and by declaring file.
///
/// The recorded base-layer names and source roots identify the source
/// layout the index was built from; an index whose layout no longer
/// matches the layer must be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTypeIndex {
    pub(crate) format_version: u32,
    layer_name: String,
    base_layer_names: Vec<String>,
    source_roots: Vec<String>,
    types: BTreeMap<String, TypeIndexEntry>,
    files: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    needs_save: bool,
}

impl LayerTypeIndex {
    /// Creates an empty index for a layer with the given layout.
    pub fn new(layer_name: &str, base_layer_names: Vec<String>, source_roots: Vec<String>) -> Self {
        Self {
            format_version: TYPE_INDEX_FORMAT_VERSION,
            layer_name: layer_name.to_string(),
            base_layer_names,
            source_roots,
            types: BTreeMap::new(),
            files: BTreeMap::new(),
            needs_save: true,
        }
    }

    /// The indexed layer.
    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    /// Base layers recorded when the index was built.
    pub fn base_layer_names(&self) -> &[String] {
        &self.base_layer_names
    }

    /// Source roots recorded when the index was built.
    pub fn source_roots(&self) -> &[String] {
        &self.source_roots
    }

    /// Returns `true` if the index was built from this layout.
    pub fn matches_layout(&self, base_layer_names: &[String], source_roots: &[String]) -> bool {
        self.base_layer_names == base_layer_names && self.source_roots == source_roots
    }

    /// Adds or replaces a type declaration.
    ///
    /// Returns the previous entry for the name, if any.
    pub fn put(&mut self, mut entry: TypeIndexEntry) -> Option<TypeIndexEntry> {
        entry.layer = self.layer_name.clone();
        let previous = self.remove(&entry.type_name);
        self.files
            .entry(entry.file.clone())
            .or_default()
            .push(entry.type_name.clone());
        self.types.insert(entry.type_name.clone(), entry);
        self.needs_save = true;
        previous
    }

    /// Removes a type declaration.
    pub fn remove(&mut self, type_name: &str) -> Option<TypeIndexEntry> {
        let entry = self.types.remove(type_name)?;
        if let Some(names) = self.files.get_mut(&entry.file) {
            names.retain(|n| n != type_name);
            if names.is_empty() {
                self.files.remove(&entry.file);
            }
        }
        self.needs_save = true;
        Some(entry)
    }

    /// Removes every declaration of a file.
    pub fn remove_file(&mut self, file: &str) -> Vec<TypeIndexEntry> {
        let names = self.files.remove(file).unwrap_or_default();
        if !names.is_empty() {
            self.needs_save = true;
        }
        names
            .iter()
            .filter_map(|n| self.types.remove(n))
            .collect()
    }

    /// Renames a declared type, keeping its file and bases.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<TypeIndexEntry, TypeIndexError> {
        if self.types.contains_key(new) {
            return Err(TypeIndexError::DuplicateType {
                layer: self.layer_name.clone(),
                type_name: new.to_string(),
            });
        }
        let mut entry = self.remove(old).ok_or_else(|| TypeIndexError::UnknownType {
            layer: self.layer_name.clone(),
            type_name: old.to_string(),
        })?;
        entry.type_name = new.to_string();
        self.put(entry.clone());
        Ok(entry)
    }

    /// Replaces `old` with `new` in the base types of every entry.
    ///
    /// Returns the number of entries changed.
    pub fn rename_base(&mut self, old: &str, new: &str) -> usize {
        let mut changed = 0;
        for entry in self.types.values_mut() {
            for base in entry.base_types.iter_mut().filter(|b| b.as_str() == old) {
                *base = new.to_string();
                changed += 1;
            }
        }
        if changed > 0 {
            self.needs_save = true;
        }
        changed
    }

    /// Looks up a declared type.
    pub fn get(&self, type_name: &str) -> Option<&TypeIndexEntry> {
        self.types.get(type_name)
    }

    /// Types declared by a file, outer declaration first.
    pub fn types_in_file(&self, file: &str) -> Vec<&TypeIndexEntry> {
        let mut entries: Vec<&TypeIndexEntry> = self
            .files
            .get(file)
            .into_iter()
            .flatten()
            .filter_map(|n| self.types.get(n))
            .collect();
        entries.sort_by_key(|e| (e.is_inner, e.type_name.len()));
        entries
    }

    /// All declared entries, in name order.
    pub fn entries(&self) -> impl Iterator<Item = &TypeIndexEntry> {
        self.types.values()
    }

    /// All declared type names, in order.
    pub fn declared_types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Number of declared types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns `true` if the index changed since it was last saved.
    pub fn needs_save(&self) -> bool {
        self.needs_save
    }

    /// Records that the index was written.
    pub fn mark_saved(&mut self) {
        self.needs_save = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> LayerTypeIndex {
        LayerTypeIndex::new("app", vec!["sys".into()], vec!["src".into()])
    }

    #[test]
    fn put_indexes_by_name_and_file() {
        let mut idx = index();
        idx.put(TypeIndexEntry::new("app.Main", "ignored", "app/Main.sc"));
        idx.put(TypeIndexEntry::new("app.Main.Inner", "ignored", "app/Main.sc").inner());
        assert_eq!(idx.get("app.Main").unwrap().layer, "app");
        let names: Vec<&str> = idx
            .types_in_file("app/Main.sc")
            .iter()
            .map(|e| e.type_name.as_str())
            .collect();
        assert_eq!(names, vec!["app.Main", "app.Main.Inner"]);
    }

    #[test]
    fn moving_a_type_to_another_file_updates_file_map() {
        let mut idx = index();
        idx.put(TypeIndexEntry::new("app.Util", "app", "Old.sc"));
        let previous = idx.put(TypeIndexEntry::new("app.Util", "app", "New.sc"));
        assert_eq!(previous.unwrap().file, "Old.sc");
        assert!(idx.types_in_file("Old.sc").is_empty());
        assert_eq!(idx.types_in_file("New.sc").len(), 1);
    }

    #[test]
    fn remove_file_drops_its_types() {
        let mut idx = index();
        idx.put(TypeIndexEntry::new("app.A", "app", "A.sc"));
        idx.put(TypeIndexEntry::new("app.A.B", "app", "A.sc").inner());
        idx.put(TypeIndexEntry::new("app.C", "app", "C.sc"));
        assert_eq!(idx.remove_file("A.sc").len(), 2);
        assert_eq!(idx.declared_types(), vec!["app.C"]);
    }

    #[test]
    fn rename_keeps_file_and_rejects_clash() {
        let mut idx = index();
        idx.put(TypeIndexEntry::new("app.Old", "app", "Old.sc").with_bases(["sys.Base"]));
        idx.put(TypeIndexEntry::new("app.Taken", "app", "Taken.sc"));
        let renamed = idx.rename("app.Old", "app.New").unwrap();
        assert_eq!(renamed.file, "Old.sc");
        assert_eq!(renamed.base_types, vec!["sys.Base"]);
        assert!(idx.get("app.Old").is_none());
        assert!(matches!(
            idx.rename("app.New", "app.Taken"),
            Err(TypeIndexError::DuplicateType { .. })
        ));
        assert!(matches!(
            idx.rename("app.Missing", "app.X"),
            Err(TypeIndexError::UnknownType { .. })
        ));
    }

    #[test]
    fn save_flag_tracks_mutation() {
        let mut idx = index();
        assert!(idx.needs_save());
        idx.mark_saved();
        assert!(!idx.needs_save());
        assert!(idx.remove("app.Missing").is_none());
        assert!(!idx.needs_save());
        idx.put(TypeIndexEntry::new("app.A", "app", "A.sc"));
        assert!(idx.needs_save());
    }

    #[test]
    fn layout_match() {
        let idx = index();
        assert!(idx.matches_layout(&["sys".to_string()], &["src".to_string()]));
        assert!(!idx.matches_layout(&[], &["src".to_string()]));
    }
}
