//! Type indexes of a layer set and their derived reverse maps.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::entry::TypeIndexEntry;
use crate::error::TypeIndexError;
use crate::layer_index::LayerTypeIndex;

/// Lifecycle of the derived reverse maps.
///
/// `Clean` maps agree with the forward maps and are kept current by
/// single-type edits. Structural changes (a layer added, removed, or
/// reordered; a type renamed) make them `Dirty`, and the next query
/// rebuilds them, passing through `Rebuilding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseIndexState {
    /// Reverse maps match the forward maps.
    Clean,
    /// Reverse maps are stale and will be rebuilt on the next query.
    Dirty,
    /// A rebuild is in progress.
    Rebuilding,
}

/// The type indexes of one layer set, ordered by layer position.
#[derive(Debug)]
pub struct LayerListTypeIndex {
    layers: Vec<LayerTypeIndex>,
    positions: HashMap<String, usize>,
    subtypes: BTreeMap<String, BTreeSet<String>>,
    modifies: BTreeMap<String, Vec<TypeIndexEntry>>,
    state: ReverseIndexState,
}

impl Default for LayerListTypeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerListTypeIndex {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            positions: HashMap::new(),
            subtypes: BTreeMap::new(),
            modifies: BTreeMap::new(),
            state: ReverseIndexState::Clean,
        }
    }

    /// State of the reverse maps.
    pub fn state(&self) -> ReverseIndexState {
        self.state
    }

    /// Marks the reverse maps stale.
    pub fn invalidate(&mut self) {
        debug_assert_ne!(self.state, ReverseIndexState::Rebuilding);
        if self.state == ReverseIndexState::Clean {
            tracing::debug!("reverse type index invalidated");
        }
        self.state = ReverseIndexState::Dirty;
    }

    /// Adds or replaces the index of a layer at `position`.
    pub fn insert_layer(&mut self, index: LayerTypeIndex, position: usize) -> Option<LayerTypeIndex> {
        let previous = self.take_layer(index.layer_name());
        self.positions.insert(index.layer_name().to_string(), position);
        let at = self.layers.partition_point(|l| self.order_key(l) < (position, index.layer_name()));
        self.layers.insert(at, index);
        self.invalidate();
        previous
    }

    /// Removes the index of a layer.
    pub fn remove_layer(&mut self, name: &str) -> Option<LayerTypeIndex> {
        let removed = self.take_layer(name)?;
        self.positions.remove(name);
        self.invalidate();
        Some(removed)
    }

    fn take_layer(&mut self, name: &str) -> Option<LayerTypeIndex> {
        let i = self.layers.iter().position(|l| l.layer_name() == name)?;
        Some(self.layers.remove(i))
    }

    /// Reassigns layer positions from a new order; layers not named keep
    /// their relative order after all named ones.
    pub fn reorder(&mut self, order: &[String]) {
        let named: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let mut unnamed = order.len();
        for layer in &self.layers {
            let position = match named.get(layer.layer_name()) {
                Some(&p) => p,
                None => {
                    unnamed += 1;
                    unnamed
                }
            };
            self.positions.insert(layer.layer_name().to_string(), position);
        }
        let positions = &self.positions;
        self.layers.sort_by_key(|l| {
            let position = positions.get(l.layer_name()).copied().unwrap_or(usize::MAX);
            (position, l.layer_name().to_string())
        });
        self.invalidate();
    }

    fn order_key<'a>(&self, layer: &'a LayerTypeIndex) -> (usize, &'a str) {
        let position = self
            .positions
            .get(layer.layer_name())
            .copied()
            .unwrap_or(usize::MAX);
        (position, layer.layer_name())
    }

    fn position_of(&self, layer: &str) -> usize {
        self.positions.get(layer).copied().unwrap_or(usize::MAX)
    }

    /// The index of one layer.
    pub fn layer(&self, name: &str) -> Option<&LayerTypeIndex> {
        self.layers.iter().find(|l| l.layer_name() == name)
    }

    fn layer_mut(&mut self, name: &str) -> Result<&mut LayerTypeIndex, TypeIndexError> {
        self.layers
            .iter_mut()
            .find(|l| l.layer_name() == name)
            .ok_or_else(|| TypeIndexError::UnknownLayer(name.to_string()))
    }

    pub(crate) fn layers_mut(&mut self) -> impl Iterator<Item = &mut LayerTypeIndex> {
        self.layers.iter_mut()
    }

    /// Layer indexes in position order.
    pub fn layers(&self) -> impl Iterator<Item = &LayerTypeIndex> {
        self.layers.iter()
    }

    /// Layer names in position order.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(LayerTypeIndex::layer_name).collect()
    }

    /// Records a type declared by `layer`.
    pub fn put_type(&mut self, layer: &str, entry: TypeIndexEntry) -> Result<(), TypeIndexError> {
        let type_name = entry.type_name.clone();
        let target = self.layer_mut(layer)?;
        let previous = target.put(entry);
        let stored = target.get(&type_name).cloned();
        if self.state == ReverseIndexState::Clean {
            if let Some(previous) = previous {
                self.unlink(&previous);
            }
            if let Some(stored) = stored {
                self.link(stored);
            }
        }
        Ok(())
    }

    /// Removes a type declared by `layer`.
    pub fn remove_type(&mut self, layer: &str, type_name: &str) -> Result<TypeIndexEntry, TypeIndexError> {
        let removed = self
            .layer_mut(layer)?
            .remove(type_name)
            .ok_or_else(|| TypeIndexError::UnknownType {
                layer: layer.to_string(),
                type_name: type_name.to_string(),
            })?;
        if self.state == ReverseIndexState::Clean {
            self.unlink(&removed);
        }
        Ok(removed)
    }

    /// Removes every type a file of `layer` declares.
    pub fn remove_file(&mut self, layer: &str, file: &str) -> Result<Vec<TypeIndexEntry>, TypeIndexError> {
        let removed = self.layer_mut(layer)?.remove_file(file);
        if self.state == ReverseIndexState::Clean {
            for entry in &removed {
                self.unlink(entry);
            }
        }
        Ok(removed)
    }

    /// Renames a type declared by `layer`, and every reference to it as a
    /// base type in this set.
    ///
    /// Must be called before the declaration is renamed on disk; the
    /// reverse maps are rebuilt on the next query.
    pub fn update_type_name(&mut self, layer: &str, old: &str, new: &str) -> Result<(), TypeIndexError> {
        self.layer_mut(layer)?.rename(old, new)?;
        let retargeted: usize = self
            .layers
            .iter_mut()
            .map(|l| l.rename_base(old, new))
            .sum();
        tracing::debug!(layer, old, new, retargeted, "renamed indexed type");
        self.invalidate();
        Ok(())
    }

    /// Types declared by a layer.
    pub fn declared_types(&self, layer: &str) -> Result<Vec<&str>, TypeIndexError> {
        self.layer(layer)
            .map(LayerTypeIndex::declared_types)
            .ok_or_else(|| TypeIndexError::UnknownLayer(layer.to_string()))
    }

    /// Types declared by one file of a layer.
    pub fn types_in_file(&self, layer: &str, file: &str) -> Vec<&TypeIndexEntry> {
        self.layer(layer)
            .map(|l| l.types_in_file(file))
            .unwrap_or_default()
    }

    /// The effective declaration of a type: the one in the highest layer.
    pub fn find_type(&self, type_name: &str) -> Option<&TypeIndexEntry> {
        self.layers.iter().rev().find_map(|l| l.get(type_name))
    }

    /// Rebuilds both reverse maps from the forward maps, in layer order.
    pub fn build_reverse_type_index(&mut self) {
        self.state = ReverseIndexState::Rebuilding;
        self.subtypes.clear();
        self.modifies.clear();
        let entries: Vec<TypeIndexEntry> = self
            .layers
            .iter()
            .flat_map(|l| l.entries().cloned())
            .collect();
        for entry in entries {
            self.link(entry);
        }
        self.state = ReverseIndexState::Clean;
        tracing::debug!(
            layers = self.layers.len(),
            subtyped = self.subtypes.len(),
            declared = self.modifies.len(),
            "rebuilt reverse type index"
        );
    }

    fn ensure_reverse(&mut self) {
        if self.state != ReverseIndexState::Clean {
            self.build_reverse_type_index();
        }
    }

    fn link(&mut self, entry: TypeIndexEntry) {
        for base in &entry.base_types {
            self.subtypes
                .entry(base.clone())
                .or_default()
                .insert(entry.type_name.clone());
        }
        let position = self.position_of(&entry.layer);
        let positions = &self.positions;
        let chain = self.modifies.entry(entry.type_name.clone()).or_default();
        let at = chain.partition_point(|e| {
            let p = positions.get(&e.layer).copied().unwrap_or(usize::MAX);
            (p, e.layer.as_str()) < (position, entry.layer.as_str())
        });
        chain.insert(at, entry);
    }

    fn unlink(&mut self, entry: &TypeIndexEntry) {
        let mut remaining: Vec<TypeIndexEntry> = Vec::new();
        if let Some(chain) = self.modifies.get_mut(&entry.type_name) {
            chain.retain(|e| e.layer != entry.layer);
            remaining = chain.clone();
            if chain.is_empty() {
                self.modifies.remove(&entry.type_name);
            }
        }
        for base in &entry.base_types {
            if remaining.iter().any(|e| e.base_types.contains(base)) {
                continue;
            }
            if let Some(subs) = self.subtypes.get_mut(base) {
                subs.remove(&entry.type_name);
                if subs.is_empty() {
                    self.subtypes.remove(base);
                }
            }
        }
    }

    /// Types extending `type_name`, directly or (if `transitive`) through
    /// other subtypes. Sorted by name.
    pub fn subtypes_of(&mut self, type_name: &str, transitive: bool) -> Vec<String> {
        self.ensure_reverse();
        if !transitive {
            return self
                .subtypes
                .get(type_name)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
        }
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([type_name.to_string()]);
        while let Some(next) = queue.pop_front() {
            for sub in self.subtypes.get(&next).into_iter().flatten() {
                if sub != type_name && found.insert(sub.clone()) {
                    queue.push_back(sub.clone());
                }
            }
        }
        found.into_iter().collect()
    }

    /// Every declaration of `type_name`, in ascending layer position.
    pub fn modifies(&mut self, type_name: &str) -> &[TypeIndexEntry] {
        self.ensure_reverse();
        self.modifies.get(type_name).map_or(&[], Vec::as_slice)
    }

    /// Both reverse maps, rebuilt first if stale.
    #[allow(clippy::type_complexity)]
    pub fn reverse_maps(
        &mut self,
    ) -> (
        &BTreeMap<String, BTreeSet<String>>,
        &BTreeMap<String, Vec<TypeIndexEntry>>,
    ) {
        self.ensure_reverse();
        (&self.subtypes, &self.modifies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str) -> LayerTypeIndex {
        LayerTypeIndex::new(name, Vec::new(), vec!["src".into()])
    }

    fn entry(type_name: &str, file: &str) -> TypeIndexEntry {
        TypeIndexEntry::new(type_name, "", file)
    }

    #[test]
    fn modifies_chain_follows_layer_position_not_insertion() {
        let mut list = LayerListTypeIndex::new();
        list.insert_layer(layer("override"), 1);
        list.insert_layer(layer("base"), 0);
        list.put_type("override", entry("T", "T.sc")).unwrap();
        list.put_type("base", entry("T", "T.sc")).unwrap();
        let chain: Vec<&str> = list.modifies("T").iter().map(|e| e.layer.as_str()).collect();
        assert_eq!(chain, vec!["base", "override"]);
    }

    #[test]
    fn edits_keep_clean_maps_current() {
        let mut list = LayerListTypeIndex::new();
        list.insert_layer(layer("sys"), 0);
        list.insert_layer(layer("app"), 1);
        list.put_type("sys", entry("sys.Base", "Base.sc")).unwrap();
        assert_eq!(list.modifies("sys.Base").len(), 1);
        assert_eq!(list.state(), ReverseIndexState::Clean);

        list.put_type("app", entry("app.Page", "Page.sc").with_bases(["sys.Base"]))
            .unwrap();
        assert_eq!(list.state(), ReverseIndexState::Clean);
        assert_eq!(list.subtypes_of("sys.Base", false), vec!["app.Page"]);

        list.remove_type("app", "app.Page").unwrap();
        assert!(list.subtypes_of("sys.Base", false).is_empty());
        assert!(list.modifies("app.Page").is_empty());
    }

    #[test]
    fn subtype_survives_while_another_layer_still_declares_it() {
        let mut list = LayerListTypeIndex::new();
        list.insert_layer(layer("a"), 0);
        list.insert_layer(layer("b"), 1);
        list.put_type("a", entry("X", "X.sc").with_bases(["Base"])).unwrap();
        list.put_type("b", entry("X", "X.sc").with_bases(["Base"])).unwrap();
        list.modifies("X");
        list.remove_type("b", "X").unwrap();
        assert_eq!(list.subtypes_of("Base", false), vec!["X"]);
    }

    #[test]
    fn transitive_subtypes() {
        let mut list = LayerListTypeIndex::new();
        list.insert_layer(layer("l"), 0);
        list.put_type("l", entry("A", "A.sc")).unwrap();
        list.put_type("l", entry("B", "B.sc").with_bases(["A"])).unwrap();
        list.put_type("l", entry("C", "C.sc").with_bases(["B"])).unwrap();
        list.put_type("l", entry("D", "D.sc").with_bases(["A"])).unwrap();
        assert_eq!(list.subtypes_of("A", false), vec!["B", "D"]);
        assert_eq!(list.subtypes_of("A", true), vec!["B", "C", "D"]);
    }

    #[test]
    fn structural_changes_defer_rebuild_until_query() {
        let mut list = LayerListTypeIndex::new();
        list.insert_layer(layer("a"), 0);
        assert_eq!(list.state(), ReverseIndexState::Dirty);
        list.put_type("a", entry("A", "A.sc")).unwrap();
        assert_eq!(list.state(), ReverseIndexState::Dirty);
        assert_eq!(list.modifies("A").len(), 1);
        assert_eq!(list.state(), ReverseIndexState::Clean);
    }

    #[test]
    fn reorder_rebuilds_modifies_chains() {
        let mut list = LayerListTypeIndex::new();
        list.insert_layer(layer("a"), 0);
        list.insert_layer(layer("b"), 1);
        list.put_type("a", entry("T", "T.sc")).unwrap();
        list.put_type("b", entry("T", "T.sc")).unwrap();
        list.reorder(&["b".to_string(), "a".to_string()]);
        assert_eq!(list.layer_names(), vec!["b", "a"]);
        let chain: Vec<&str> = list.modifies("T").iter().map(|e| e.layer.as_str()).collect();
        assert_eq!(chain, vec!["b", "a"]);
    }

    #[test]
    fn rename_retargets_base_references() {
        let mut list = LayerListTypeIndex::new();
        list.insert_layer(layer("sys"), 0);
        list.insert_layer(layer("app"), 1);
        list.put_type("sys", entry("sys.Old", "Old.sc")).unwrap();
        list.put_type("app", entry("app.Sub", "Sub.sc").with_bases(["sys.Old"]))
            .unwrap();
        list.update_type_name("sys", "sys.Old", "sys.New").unwrap();
        assert_eq!(list.state(), ReverseIndexState::Dirty);
        assert_eq!(list.subtypes_of("sys.New", false), vec!["app.Sub"]);
        assert!(list.subtypes_of("sys.Old", false).is_empty());
        assert_eq!(list.find_type("sys.New").unwrap().file, "Old.sc");
    }

    #[test]
    fn rebuild_is_independent_of_insertion_order() {
        let build = |order: &[(&str, usize)]| {
            let mut list = LayerListTypeIndex::new();
            for &(name, position) in order {
                let mut idx = layer(name);
                idx.put(entry("T", "T.sc").with_bases(["Base"]));
                idx.put(entry(&format!("{name}.Own"), "Own.sc").with_bases(["T"]));
                list.insert_layer(idx, position);
            }
            list.build_reverse_type_index();
            let (subtypes, modifies) = list.reverse_maps();
            (subtypes.clone(), modifies.clone())
        };
        let forward = build(&[("a", 0), ("b", 1), ("c", 2)]);
        let backward = build(&[("c", 2), ("a", 0), ("b", 1)]);
        assert_eq!(forward, backward);

        let chain: Vec<&str> = forward.1["T"].iter().map(|e| e.layer.as_str()).collect();
        assert_eq!(chain, vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_layer_is_an_error() {
        let mut list = LayerListTypeIndex::new();
        assert!(matches!(
            list.put_type("ghost", entry("A", "A.sc")),
            Err(TypeIndexError::UnknownLayer(_))
        ));
    }
}
