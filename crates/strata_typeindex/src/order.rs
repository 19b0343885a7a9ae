//! Last established order of layers that are not active.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_layer::LayerGraph;

use crate::error::TypeIndexError;

/// Current `layerOrder.json` format version.
pub const LAYER_ORDER_FORMAT_VERSION: u32 = 1;

/// File name of the layer-order index inside the index directory.
pub const LAYER_ORDER_FILE: &str = "layerOrder.json";

/// Project-wide record of inactive layers in their last known order.
///
/// Tooling that shows layers which are not loaded in the current session
/// uses it to keep their order stable between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerOrderIndex {
    format_version: u32,
    inactive_layers: Vec<String>,
    #[serde(default)]
    disabled_layers: BTreeSet<String>,
    #[serde(default)]
    excluded_layers: BTreeSet<String>,
}

impl Default for LayerOrderIndex {
    fn default() -> Self {
        Self {
            format_version: LAYER_ORDER_FORMAT_VERSION,
            inactive_layers: Vec::new(),
            disabled_layers: BTreeSet::new(),
            excluded_layers: BTreeSet::new(),
        }
    }
}

impl LayerOrderIndex {
    /// Loads the index; `None` if missing, corrupt, or from another version.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&content) {
            Ok(index) if index.format_version == LAYER_ORDER_FORMAT_VERSION => Some(index),
            Ok(index) => {
                tracing::warn!(
                    path = %path.display(),
                    found = index.format_version,
                    "discarding layer order from another format version"
                );
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt layer order");
                None
            }
        }
    }

    /// Writes the index as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), TypeIndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TypeIndexError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| TypeIndexError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| TypeIndexError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Inactive layer names in their last known order.
    pub fn prior_order(&self) -> &[String] {
        &self.inactive_layers
    }

    /// Returns `true` if the layer was explicitly disabled.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_layers.contains(name)
    }

    /// Returns `true` if the layer was explicitly excluded.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_layers.contains(name)
    }

    /// Records the inactive layers of `graph`.
    ///
    /// Layers that became active are dropped; new inactive layers are
    /// appended in the graph's order after the ones already known.
    /// Returns `true` if anything changed.
    pub fn record(&mut self, graph: &LayerGraph) -> bool {
        let before = self.clone();
        let inactive: Vec<&str> = graph.inactive().iter().map(|l| l.name.as_str()).collect();

        self.inactive_layers.retain(|n| inactive.contains(&n.as_str()));
        for name in &inactive {
            if !self.inactive_layers.iter().any(|n| n == name) {
                self.inactive_layers.push((*name).to_string());
            }
        }
        self.disabled_layers = graph
            .inactive()
            .iter()
            .filter(|l| l.flags.disabled)
            .map(|l| l.name.clone())
            .collect();
        self.excluded_layers = graph
            .inactive()
            .iter()
            .filter(|l| l.flags.excluded)
            .map(|l| l.name.clone())
            .collect();
        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_diagnostics::DiagnosticSink;
    use strata_layer::{Layer, LayerFlags};

    fn disabled(name: &str) -> Layer {
        Layer::new(name).with_flags(LayerFlags {
            disabled: true,
            ..LayerFlags::default()
        })
    }

    fn graph(layers: Vec<Layer>) -> LayerGraph {
        LayerGraph::build(layers, None, &DiagnosticSink::new())
    }

    #[test]
    fn record_keeps_known_order_and_appends_new() {
        let mut order = LayerOrderIndex::default();
        assert!(order.record(&graph(vec![disabled("b"), disabled("a"), Layer::new("app")])));
        let first = order.prior_order().to_vec();
        assert_eq!(first.len(), 2);
        assert!(order.is_disabled("a"));

        let changed = order.record(&graph(vec![disabled("c"), disabled("a"), disabled("b")]));
        assert!(changed);
        assert_eq!(&order.prior_order()[..2], &first[..]);
        assert_eq!(order.prior_order()[2], "c");
        assert!(!order.record(&graph(vec![disabled("c"), disabled("a"), disabled("b")])));
    }

    #[test]
    fn reactivated_layers_drop_out() {
        let mut order = LayerOrderIndex::default();
        order.record(&graph(vec![disabled("a"), disabled("b")]));
        order.record(&graph(vec![Layer::new("a"), disabled("b")]));
        assert_eq!(order.prior_order(), &["b".to_string()]);
        assert!(!order.is_disabled("a"));
    }

    #[test]
    fn saved_order_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LAYER_ORDER_FILE);
        let mut order = LayerOrderIndex::default();
        order.record(&graph(vec![disabled("x")]));
        order.save(&path).unwrap();
        assert_eq!(LayerOrderIndex::load(&path).unwrap(), order);

        std::fs::write(&path, "{\"format_version\": 9, \"inactive_layers\": []}").unwrap();
        assert!(LayerOrderIndex::load(&path).is_none());
    }
}
