//! Finding layer definitions on the layer path.

use std::path::Path;

use strata_config::{load_layer_def, LAYER_FILE};
use strata_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use strata_source::discover::relative_slash_path;

use crate::layer::Layer;

const INVALID_DEFINITION: DiagnosticCode = DiagnosticCode::new(Category::Graph, 6);

/// Walks every layer-path directory for `layer.toml` files.
///
/// A layer's default name is its directory relative to the layer-path root,
/// `/`-separated. Roots are searched in order and directories within a root
/// in name order, so later roots can replace layers of earlier ones.
/// Unreadable or invalid definitions are reported and skipped.
pub fn discover_layers(
    project_root: &Path,
    layer_path: &[String],
    sink: &DiagnosticSink,
) -> Vec<Layer> {
    let mut layers = Vec::new();
    for entry in layer_path {
        let root = project_root.join(entry);
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "layer path entry does not exist");
            continue;
        }
        walk(&root, &root, sink, &mut layers);
    }
    tracing::debug!(count = layers.len(), "layers discovered");
    layers
}

fn walk(root: &Path, dir: &Path, sink: &DiagnosticSink, layers: &mut Vec<Layer>) {
    let def_path = dir.join(LAYER_FILE);
    if def_path.is_file() && dir != root {
        let default_name = relative_slash_path(root, dir);
        match load_layer_def(&def_path) {
            Ok(def) => layers.push(Layer::from_def(&def, &default_name, dir)),
            Err(e) => sink.emit(
                Diagnostic::error(INVALID_DEFINITION, e.to_string())
                    .in_layer(default_name)
                    .at_path(&def_path),
            ),
        }
    }

    let mut subdirs: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                !p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
            })
            .collect(),
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "failed to read layer directory");
            return;
        }
    };
    subdirs.sort();
    for sub in subdirs {
        walk(root, &sub, sink, layers);
    }
}
