//! On-disk layout of the type index.

use std::path::{Path, PathBuf};

use strata_cache::ArtifactStore;
use strata_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};

use crate::error::TypeIndexError;
use crate::layer_index::{LayerTypeIndex, TYPE_INDEX_FORMAT_VERSION};
use crate::order::{LayerOrderIndex, LAYER_ORDER_FILE};

const CORRUPT_INDEX: DiagnosticCode = DiagnosticCode::new(Category::Index, 1);
const LAYOUT_MISMATCH: DiagnosticCode = DiagnosticCode::new(Category::Index, 2);

/// Subdirectory of the index directory holding per-layer files.
pub const TYPES_DIR: &str = "types";

/// Extension of per-layer type index files.
pub const TYPE_INDEX_EXT: &str = "tidx";

/// Escapes a layer name into a single file name.
///
/// `%` and `/` are percent-encoded so nested layer names stay flat and
/// distinct.
pub fn layer_file_key(layer: &str) -> String {
    layer.replace('%', "%25").replace('/', "%2F")
}

/// Reads and writes the per-layer `.tidx` artifacts and the layer-order
/// file under one index directory.
#[derive(Debug, Clone)]
pub struct TypeIndexStore {
    artifacts: ArtifactStore,
}

impl TypeIndexStore {
    /// Creates a store rooted at `index_dir`.
    pub fn new(index_dir: &Path, strata_version: &str) -> Self {
        Self {
            artifacts: ArtifactStore::new(index_dir, strata_version),
        }
    }

    /// Path of a layer's index file.
    pub fn layer_path(&self, layer: &str) -> PathBuf {
        self.artifacts
            .artifact_path(TYPES_DIR, &layer_file_key(layer), TYPE_INDEX_EXT)
    }

    /// Path of the layer-order file.
    pub fn order_path(&self) -> PathBuf {
        self.artifacts.root().join(LAYER_ORDER_FILE)
    }

    /// Loads a layer's index if it was built from the given layout.
    ///
    /// An unreadable file is discarded with I001 and one built from another
    /// layout with I002; both read as absent.
    pub fn load_layer(
        &self,
        layer: &str,
        base_layer_names: &[String],
        source_roots: &[String],
        sink: &DiagnosticSink,
    ) -> Option<LayerTypeIndex> {
        let path = self.layer_path(layer);
        if !path.exists() {
            return None;
        }
        let index = match self.artifacts.read_value::<LayerTypeIndex>(&path) {
            Some(index) if index.format_version == TYPE_INDEX_FORMAT_VERSION => index,
            _ => {
                sink.emit(
                    Diagnostic::warning(CORRUPT_INDEX, "discarded unreadable type index")
                        .in_layer(layer.to_string())
                        .at_path(&path),
                );
                return None;
            }
        };
        if index.layer_name() != layer || !index.matches_layout(base_layer_names, source_roots) {
            sink.emit(
                Diagnostic::warning(
                    LAYOUT_MISMATCH,
                    "type index was built for a different source layout",
                )
                .in_layer(layer.to_string())
                .at_path(&path)
                .with_note("the layer's types are re-indexed"),
            );
            return None;
        }
        Some(index)
    }

    /// Writes a layer's index if it changed since it was last saved.
    ///
    /// Returns `true` if the file was written.
    pub fn save_layer(&self, index: &mut LayerTypeIndex) -> Result<bool, TypeIndexError> {
        if !index.needs_save() && self.layer_path(index.layer_name()).exists() {
            return Ok(false);
        }
        self.artifacts
            .write_value(&self.layer_path(index.layer_name()), &*index)?;
        index.mark_saved();
        tracing::debug!(layer = index.layer_name(), types = index.len(), "saved type index");
        Ok(true)
    }

    /// Deletes the index file of a layer.
    pub fn delete_layer(&self, layer: &str) -> Result<(), TypeIndexError> {
        let path = self.layer_path(layer);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TypeIndexError::Io { path, source: e }),
        }
    }

    /// Removes index files of layers not in `live`. Returns how many.
    pub fn gc(&self, live: &[&str]) -> Result<usize, TypeIndexError> {
        let keys: Vec<String> = live.iter().map(|l| layer_file_key(l)).collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let removed = self.artifacts.gc(TYPES_DIR, TYPE_INDEX_EXT, &keys)?;
        if removed > 0 {
            tracing::info!(removed, "removed type indexes of deleted layers");
        }
        Ok(removed)
    }

    /// Loads the layer-order index, or an empty one.
    pub fn load_order(&self) -> LayerOrderIndex {
        LayerOrderIndex::load(&self.order_path()).unwrap_or_default()
    }

    /// Writes the layer-order index.
    pub fn save_order(&self, order: &LayerOrderIndex) -> Result<(), TypeIndexError> {
        order.save(&self.order_path())
    }
}
