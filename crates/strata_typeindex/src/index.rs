//! The type index of a whole project.

use std::path::Path;

use strata_diagnostics::DiagnosticSink;
use strata_layer::{Layer, LayerGraph};

use crate::entry::TypeIndexEntry;
use crate::error::TypeIndexError;
use crate::layer_index::LayerTypeIndex;
use crate::list::LayerListTypeIndex;
use crate::order::LayerOrderIndex;
use crate::store::TypeIndexStore;

/// Active and inactive layer type indexes bound to their files on disk.
///
/// Active layers are positioned by the [`LayerGraph`]; inactive ones by
/// the persisted [`LayerOrderIndex`], so that tooling sees them in a
/// stable order even when they are not loaded.
#[derive(Debug)]
pub struct TypeIndex {
    store: TypeIndexStore,
    active: LayerListTypeIndex,
    inactive: LayerListTypeIndex,
    order: LayerOrderIndex,
    removed: Vec<String>,
}

fn layout_of(layer: &Layer) -> (Vec<String>, Vec<String>) {
    let roots = layer
        .source_roots
        .iter()
        .map(|r| r.to_string_lossy().replace('\\', "/"))
        .collect();
    (layer.extends.clone(), roots)
}

impl TypeIndex {
    /// Opens the index for every layer of `graph`.
    ///
    /// Each active layer reuses its persisted index when the layout still
    /// matches, otherwise starts empty. Inactive layers are loaded only if
    /// an index exists for them.
    pub fn open(
        index_dir: &Path,
        strata_version: &str,
        graph: &LayerGraph,
        sink: &DiagnosticSink,
    ) -> Self {
        let store = TypeIndexStore::new(index_dir, strata_version);
        let mut order = store.load_order();
        order.record(graph);

        let mut active = LayerListTypeIndex::new();
        for layer in graph.layers() {
            let (bases, roots) = layout_of(layer);
            let index = store
                .load_layer(&layer.name, &bases, &roots, sink)
                .unwrap_or_else(|| LayerTypeIndex::new(&layer.name, bases, roots));
            active.insert_layer(index, layer.position);
        }

        let mut inactive = LayerListTypeIndex::new();
        let ordered = LayerGraph::order_inactive(graph.inactive().to_vec(), order.prior_order());
        for (position, layer) in ordered.iter().enumerate() {
            let (bases, roots) = layout_of(layer);
            if let Some(index) = store.load_layer(&layer.name, &bases, &roots, sink) {
                inactive.insert_layer(index, position);
            }
        }

        tracing::debug!(
            active = active.layer_names().len(),
            inactive = inactive.layer_names().len(),
            "opened type index"
        );
        Self {
            store,
            active,
            inactive,
            order,
            removed: Vec::new(),
        }
    }

    /// Indexes of the active layers.
    pub fn active(&self) -> &LayerListTypeIndex {
        &self.active
    }

    /// Mutable indexes of the active layers.
    pub fn active_mut(&mut self) -> &mut LayerListTypeIndex {
        &mut self.active
    }

    /// Indexes of inactive layers that have been indexed before.
    pub fn inactive(&self) -> &LayerListTypeIndex {
        &self.inactive
    }

    /// The layer-order index.
    pub fn order(&self) -> &LayerOrderIndex {
        &self.order
    }

    /// Records a type declared by an active layer.
    pub fn put_type(&mut self, layer: &str, entry: TypeIndexEntry) -> Result<(), TypeIndexError> {
        self.active.put_type(layer, entry)
    }

    /// Removes a type declared by an active layer.
    pub fn remove_type(&mut self, layer: &str, type_name: &str) -> Result<TypeIndexEntry, TypeIndexError> {
        self.active.remove_type(layer, type_name)
    }

    /// Renames a type declared by an active layer.
    pub fn update_type_name(&mut self, layer: &str, old: &str, new: &str) -> Result<(), TypeIndexError> {
        self.active.update_type_name(layer, old, new)
    }

    /// Forgets every type a file of an active layer declared.
    pub fn remove_file(&mut self, layer: &str, file: &str) -> Result<Vec<TypeIndexEntry>, TypeIndexError> {
        self.active.remove_file(layer, file)
    }

    /// The highest active declaration of a type.
    pub fn find_type(&self, type_name: &str) -> Option<&TypeIndexEntry> {
        self.active.find_type(type_name)
    }

    /// Types a file of an active layer declares.
    pub fn types_in_file(&self, layer: &str, file: &str) -> Vec<&TypeIndexEntry> {
        self.active.types_in_file(layer, file)
    }

    /// Types declared by an active or inactive layer.
    pub fn declared_types(&self, layer: &str) -> Result<Vec<&str>, TypeIndexError> {
        match self.active.layer(layer) {
            Some(_) => self.active.declared_types(layer),
            None => self.inactive.declared_types(layer),
        }
    }

    /// Subtypes of a type among the active layers.
    pub fn subtypes_of(&mut self, type_name: &str, transitive: bool) -> Vec<String> {
        self.active.subtypes_of(type_name, transitive)
    }

    /// Modifies-chain of a type among the active layers.
    pub fn modifies(&mut self, type_name: &str) -> &[TypeIndexEntry] {
        self.active.modifies(type_name)
    }

    /// Adds an index for a layer newly inserted into the graph.
    pub fn add_layer(&mut self, layer: &Layer, sink: &DiagnosticSink) {
        let (bases, roots) = layout_of(layer);
        let index = self
            .store
            .load_layer(&layer.name, &bases, &roots, sink)
            .unwrap_or_else(|| LayerTypeIndex::new(&layer.name, bases, roots));
        self.removed.retain(|n| n != &layer.name);
        self.active.insert_layer(index, layer.position);
    }

    /// Drops a layer removed from the project. Its file is deleted on the
    /// next save.
    pub fn remove_layer(&mut self, name: &str) -> Option<LayerTypeIndex> {
        let removed = self
            .active
            .remove_layer(name)
            .or_else(|| self.inactive.remove_layer(name))?;
        self.removed.push(name.to_string());
        Some(removed)
    }

    /// Re-reads active positions after the graph changed order.
    pub fn sync_positions(&mut self, graph: &LayerGraph) {
        self.active.reorder(&graph.names());
    }

    /// Writes every changed layer index, deletes removed ones, and records
    /// the inactive order of `graph`. Returns the number of layer files
    /// written.
    pub fn save(&mut self, graph: &LayerGraph) -> Result<usize, TypeIndexError> {
        let mut written = 0;
        for index in self.active.layers_mut().chain(self.inactive.layers_mut()) {
            if self.store.save_layer(index)? {
                written += 1;
            }
        }
        for name in self.removed.drain(..) {
            self.store.delete_layer(&name)?;
        }
        if self.order.record(graph) || !self.store.order_path().exists() {
            self.store.save_order(&self.order)?;
        }
        Ok(written)
    }
}
