//! Build info for every build-layer of one system.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use strata_cache::{ArtifactStore, BuildLayerPaths};
use strata_common::Timestamp;
use strata_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use strata_layer::LayerGraph;

use crate::error::BuildInfoError;
use crate::facts::{AddOutcome, Fact};
use crate::info::BuildInfo;
use crate::side::SideData;
use crate::text;

const CORRUPT_INDEX: DiagnosticCode = DiagnosticCode::new(Category::Index, 1);
const CONFLICT: DiagnosticCode = DiagnosticCode::new(Category::Metadata, 1);
const MISSING_TARGET: DiagnosticCode = DiagnosticCode::new(Category::Metadata, 2);

/// Build info and side data of one build-layer.
#[derive(Debug, Clone)]
pub struct BuildLayerMetadata {
    /// Build-layer name.
    pub name: String,
    /// Where its files live.
    pub paths: BuildLayerPaths,
    /// Accumulated facts.
    pub info: BuildInfo,
    /// Binary side data.
    pub side: SideData,
}

impl BuildLayerMetadata {
    fn empty(name: &str, paths: BuildLayerPaths) -> Self {
        Self {
            name: name.to_string(),
            paths,
            info: BuildInfo::new(),
            side: SideData::new(),
        }
    }
}

/// The build-metadata side-table of one system, one [`BuildLayerMetadata`]
/// per build-layer in stack order.
///
/// Facts added to the root build-layer fan out to the other build-layers
/// that need them, so each build-layer's view stays self-consistent.
#[derive(Debug)]
pub struct BuildMetadataStore {
    build_dir: PathBuf,
    artifacts: ArtifactStore,
    layers: Vec<BuildLayerMetadata>,
}

impl BuildMetadataStore {
    /// Creates a store with no build-layers.
    pub fn new(build_dir: &Path, strata_version: &str) -> Self {
        Self {
            build_dir: build_dir.to_path_buf(),
            artifacts: ArtifactStore::new(build_dir, strata_version),
            layers: Vec::new(),
        }
    }

    /// Loads the persisted metadata of each named build-layer.
    ///
    /// Unreadable or version-mismatched files are discarded with an I001
    /// warning and the build-layer starts empty.
    pub fn open(
        build_dir: &Path,
        build_layers: &[String],
        strata_version: &str,
        sink: &DiagnosticSink,
    ) -> Self {
        let mut store = Self::new(build_dir, strata_version);
        for name in build_layers {
            let meta = store.load_build_layer(name, sink);
            store.layers.push(meta);
        }
        store
    }

    fn load_build_layer(&self, name: &str, sink: &DiagnosticSink) -> BuildLayerMetadata {
        let paths = BuildLayerPaths::new(&self.build_dir, name);
        let info_path = paths.build_info();
        let side_path = paths.side_data();

        let info = text::load(&info_path);
        if info.is_none() && info_path.exists() {
            report_discarded(sink, name, &info_path);
        }
        let side = SideData::load(&self.artifacts, &side_path);
        if side.is_none() && side_path.exists() {
            report_discarded(sink, name, &side_path);
        }

        BuildLayerMetadata {
            name: name.to_string(),
            info: info.unwrap_or_default(),
            side: side.unwrap_or_default(),
            paths,
        }
    }

    /// Returns the metadata of a build-layer, creating it if needed.
    ///
    /// A new build-layer is slotted by its position in `graph` and starts
    /// with the facts of the nearest build-layer below it, so that facts
    /// declared by layers it now aggregates are not lost until they are
    /// regenerated.
    pub fn ensure_build_layer(&mut self, name: &str, graph: &LayerGraph) -> &mut BuildLayerMetadata {
        if let Some(i) = self.index_of(name) {
            return &mut self.layers[i];
        }
        let position = graph.position(name).unwrap_or(usize::MAX);
        let insert_at = self
            .layers
            .iter()
            .position(|m| graph.position(&m.name).unwrap_or(usize::MAX) > position)
            .unwrap_or(self.layers.len());

        let mut meta = BuildLayerMetadata::empty(name, BuildLayerPaths::new(&self.build_dir, name));
        if let Some(previous) = insert_at.checked_sub(1).map(|i| &self.layers[i]) {
            let conflicts = meta.info.merge(&previous.info);
            tracing::debug!(
                build_layer = name,
                from = %previous.name,
                facts = meta.info.len(),
                conflicts,
                "promoted build facts into new build-layer"
            );
        }
        self.layers.insert(insert_at, meta);
        &mut self.layers[insert_at]
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|m| m.name == name)
    }

    fn layer_mut(&mut self, name: &str) -> Result<&mut BuildLayerMetadata, BuildInfoError> {
        self.layers
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| BuildInfoError::UnknownBuildLayer(name.to_string()))
    }

    /// Names of the build-layers, in stack order.
    pub fn build_layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|m| m.name.as_str()).collect()
    }

    /// Metadata of one build-layer.
    pub fn get(&self, build_layer: &str) -> Option<&BuildLayerMetadata> {
        self.layers.iter().find(|m| m.name == build_layer)
    }

    /// Build info of one build-layer.
    pub fn info(&self, build_layer: &str) -> Option<&BuildInfo> {
        self.get(build_layer).map(|m| &m.info)
    }

    /// Mutable build info of one build-layer.
    pub fn info_mut(&mut self, build_layer: &str) -> Option<&mut BuildInfo> {
        self.layers
            .iter_mut()
            .find(|m| m.name == build_layer)
            .map(|m| &mut m.info)
    }

    /// Side data of one build-layer.
    pub fn side(&self, build_layer: &str) -> Option<&SideData> {
        self.get(build_layer).map(|m| &m.side)
    }

    /// Mutable side data of one build-layer.
    pub fn side_mut(&mut self, build_layer: &str) -> Option<&mut SideData> {
        self.layers
            .iter_mut()
            .find(|m| m.name == build_layer)
            .map(|m| &mut m.side)
    }

    /// Adds a fact declared in `declaring_layer` to `build_layer`.
    ///
    /// Conflicting re-adds are reported as M001 warnings. When
    /// `build_layer` is the root build-layer of `graph`, the fact is also
    /// added to every other build-layer holding a layer that extends the
    /// declaring layer; a target without metadata is reported as M002.
    pub fn add(
        &mut self,
        build_layer: &str,
        declaring_layer: &str,
        fact: Fact,
        graph: &LayerGraph,
        sink: &DiagnosticSink,
    ) -> Result<AddOutcome, BuildInfoError> {
        let is_root = graph
            .root_build_layer()
            .is_some_and(|root| root.name == build_layer);
        let fanout = if is_root {
            graph.fanout_targets(declaring_layer)
        } else {
            Vec::new()
        };

        let key = fact.key();
        let meta = self.layer_mut(build_layer)?;
        let outcome = meta.info.add(fact.clone());
        if outcome.is_conflict() {
            report_conflict(sink, build_layer, &key, outcome);
        }

        for target in fanout {
            match self.layers.iter_mut().find(|m| m.name == target) {
                Some(meta) => {
                    let fanned = meta.info.add(fact.clone());
                    if fanned.is_conflict() {
                        report_conflict(sink, &target, &key, fanned);
                    }
                    tracing::debug!(from = build_layer, to = %target, key = %key, "fanned out build fact");
                }
                None => sink.emit(
                    Diagnostic::warning(
                        MISSING_TARGET,
                        format!("build-layer '{target}' has no metadata to receive '{key}'"),
                    )
                    .in_layer(declaring_layer.to_string()),
                ),
            }
        }
        Ok(outcome)
    }

    /// Prunes facts of changed-but-not-reprocessed types from one
    /// build-layer. Returns the number of facts removed.
    pub fn clean_stale_entries(
        &mut self,
        build_layer: &str,
        changed: &HashSet<String>,
        processed: &HashSet<String>,
    ) -> Result<usize, BuildInfoError> {
        Ok(self
            .layer_mut(build_layer)?
            .info
            .clean_stale_entries(changed, processed))
    }

    /// Absorbs the facts of `source` into `target`. Returns the number of
    /// conflicts.
    pub fn merge_into(&mut self, target: &str, source: &str) -> Result<usize, BuildInfoError> {
        let source_info = self
            .info(source)
            .cloned()
            .ok_or_else(|| BuildInfoError::UnknownBuildLayer(source.to_string()))?;
        Ok(self.layer_mut(target)?.info.merge(&source_info))
    }

    /// External stubs of a build-layer whose generated source is out of
    /// date.
    ///
    /// Stub `a.b.C` is generated at `<output>/a/b/C.<source_ext>` and
    /// compiled to `<output>/a/b/C.<compiled_ext>`.
    pub fn external_stubs_to_regenerate(
        &self,
        build_layer: &str,
        source_ext: &str,
        compiled_ext: &str,
    ) -> Vec<String> {
        let Some(meta) = self.get(build_layer) else {
            return Vec::new();
        };
        let output = meta.paths.output_dir();
        meta.info
            .external_dyn_types()
            .filter(|stub| {
                let base = output.join(stub.type_name.replace('.', "/"));
                let stub_modified = Timestamp::modified(&base.with_extension(source_ext)).ok();
                let compiled_modified = Timestamp::modified(&base.with_extension(compiled_ext)).ok();
                stub.needs_regeneration(stub_modified, compiled_modified)
            })
            .map(|stub| stub.type_name.clone())
            .collect()
    }

    /// Records that a stub was regenerated from its current record.
    pub fn mark_stub_generated(&mut self, build_layer: &str, type_name: &str) -> bool {
        match self
            .info_mut(build_layer)
            .and_then(|info| info.external_dyn_type_mut(type_name))
        {
            Some(stub) => {
                stub.mark_generated();
                true
            }
            None => false,
        }
    }

    /// Drops everything recorded for a build-layer.
    pub fn reset(&mut self, build_layer: &str) -> Result<(), BuildInfoError> {
        let meta = self.layer_mut(build_layer)?;
        meta.info = BuildInfo::new();
        meta.side = SideData::new();
        Ok(())
    }

    /// Writes one build-layer's text build info and side data.
    pub fn save(&self, build_layer: &str) -> Result<(), BuildInfoError> {
        let meta = self
            .get(build_layer)
            .ok_or_else(|| BuildInfoError::UnknownBuildLayer(build_layer.to_string()))?;
        text::save(&meta.info, &meta.paths.build_info())?;
        meta.side.save(&self.artifacts, &meta.paths.side_data())?;
        tracing::debug!(build_layer, facts = meta.info.len(), "saved build info");
        Ok(())
    }

    /// Writes every build-layer.
    pub fn save_all(&self) -> Result<(), BuildInfoError> {
        for meta in &self.layers {
            self.save(&meta.name)?;
        }
        Ok(())
    }
}

fn report_discarded(sink: &DiagnosticSink, layer: &str, path: &Path) {
    sink.emit(
        Diagnostic::warning(CORRUPT_INDEX, "discarded unreadable build info")
            .in_layer(layer.to_string())
            .at_path(path)
            .with_note("facts are re-collected as sources are processed"),
    );
}

fn report_conflict(sink: &DiagnosticSink, build_layer: &str, key: &str, outcome: AddOutcome) {
    let kept = match outcome {
        AddOutcome::KeptExisting => "kept the existing value",
        _ => "replaced the existing value",
    };
    sink.emit(
        Diagnostic::warning(CONFLICT, format!("build fact '{key}' re-added with a different value"))
            .in_layer(build_layer.to_string())
            .with_note(kept),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{ExternalDynType, MainInit, TestInstance, TypeGroupMember};
    use strata_layer::{Layer, LayerFlags};

    fn separate(layer: Layer) -> Layer {
        layer.with_flags(LayerFlags {
            build_separate: true,
            ..LayerFlags::default()
        })
    }

    fn graph() -> LayerGraph {
        LayerGraph::build(
            vec![
                Layer::new("sys"),
                separate(Layer::new("lib").extending("sys")),
                Layer::new("app").extending("lib"),
            ],
            None,
            &DiagnosticSink::new(),
        )
    }

    fn main_init(type_name: &str, layer: &str) -> Fact {
        Fact::MainInit(MainInit {
            type_name: type_name.into(),
            launcher_name: "runMain".into(),
            stop_hook: None,
            layer: layer.into(),
        })
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn root_adds_fan_out_to_build_layers_of_extending_layers() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let graph = graph();
        let mut store = BuildMetadataStore::open(dir.path(), &names(&["lib", "app"]), "0.1.0", &sink);

        let outcome = store
            .add("app", "sys", main_init("sys.Boot", "sys"), &graph, &sink)
            .unwrap();
        assert_eq!(outcome, AddOutcome::Added);
        assert!(store.info("lib").unwrap().main_init("sys.Boot").is_some());

        store
            .add("app", "app", main_init("app.Main", "app"), &graph, &sink)
            .unwrap();
        assert!(store.info("lib").unwrap().main_init("app.Main").is_none());
        assert!(store.info("app").unwrap().main_init("app.Main").is_some());
        assert_eq!(sink.warning_count(), 0);
    }

    #[test]
    fn non_root_adds_stay_local() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let graph = graph();
        let mut store = BuildMetadataStore::open(dir.path(), &names(&["lib", "app"]), "0.1.0", &sink);
        store
            .add("lib", "sys", main_init("sys.Boot", "sys"), &graph, &sink)
            .unwrap();
        assert!(store.info("app").unwrap().is_empty());
    }

    #[test]
    fn missing_fanout_target_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let graph = graph();
        let mut store = BuildMetadataStore::open(dir.path(), &names(&["app"]), "0.1.0", &sink);
        store
            .add("app", "sys", main_init("sys.Boot", "sys"), &graph, &sink)
            .unwrap();
        let diags = sink.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, MISSING_TARGET);
    }

    #[test]
    fn conflicting_add_warns() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let graph = graph();
        let mut store = BuildMetadataStore::open(dir.path(), &names(&["app"]), "0.1.0", &sink);
        let member = |layer: &str| {
            Fact::TypeGroup(TypeGroupMember {
                group: "urlTypes".into(),
                type_name: "app.Page".into(),
                layer: layer.into(),
            })
        };
        store.add("app", "app", member("app"), &graph, &sink).unwrap();
        store.add("app", "app", member("other"), &graph, &sink).unwrap();
        assert_eq!(sink.diagnostics()[0].code, CONFLICT);
    }

    #[test]
    fn unknown_build_layer_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let mut store = BuildMetadataStore::new(dir.path(), "0.1.0");
        let err = store
            .add("nope", "app", main_init("app.Main", "app"), &graph(), &sink)
            .unwrap_err();
        assert!(matches!(err, BuildInfoError::UnknownBuildLayer(ref n) if n == "nope"));
    }

    #[test]
    fn saved_metadata_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let graph = graph();
        let mut store = BuildMetadataStore::open(dir.path(), &names(&["app"]), "0.1.0", &sink);
        store
            .add(
                "app",
                "app",
                Fact::Test(TestInstance {
                    type_name: "app.TodoTest".into(),
                    test_kind: "unit".into(),
                }),
                &graph,
                &sink,
            )
            .unwrap();
        store
            .side_mut("app")
            .unwrap()
            .put("syncTypes", &vec!["app.Todo".to_string()])
            .unwrap();
        store.save_all().unwrap();

        let reopened = BuildMetadataStore::open(dir.path(), &names(&["app"]), "0.1.0", &sink);
        assert_eq!(reopened.info("app").unwrap().tests().count(), 1);
        assert_eq!(
            reopened.side("app").unwrap().get::<Vec<String>>("syncTypes").unwrap(),
            vec!["app.Todo"]
        );
        assert_eq!(sink.warning_count(), 0);
    }

    #[test]
    fn corrupt_build_info_is_discarded_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BuildLayerPaths::new(dir.path(), "app");
        std::fs::create_dir_all(paths.state_dir()).unwrap();
        std::fs::write(paths.build_info(), "format_version = [[[").unwrap();

        let sink = DiagnosticSink::new();
        let store = BuildMetadataStore::open(dir.path(), &names(&["app"]), "0.1.0", &sink);
        assert!(store.info("app").unwrap().is_empty());
        assert_eq!(sink.diagnostics()[0].code, CORRUPT_INDEX);
    }

    #[test]
    fn new_build_layer_inherits_facts_from_below() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let graph = LayerGraph::build(
            vec![
                separate(Layer::new("lib")),
                separate(Layer::new("mid").extending("lib")),
                Layer::new("app").extending("mid"),
            ],
            None,
            &sink,
        );
        let mut store = BuildMetadataStore::open(dir.path(), &names(&["lib", "app"]), "0.1.0", &sink);
        store.info_mut("lib").unwrap().add(main_init("lib.Boot", "lib"));

        let mid = store.ensure_build_layer("mid", &graph);
        assert!(mid.info.main_init("lib.Boot").is_some());
        assert_eq!(store.build_layer_names(), vec!["lib", "mid", "app"]);
    }

    #[test]
    fn clean_and_merge_by_build_layer() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let mut store = BuildMetadataStore::open(dir.path(), &names(&["lib", "app"]), "0.1.0", &sink);
        store.info_mut("lib").unwrap().add(main_init("lib.Boot", "lib"));
        assert_eq!(store.merge_into("app", "lib").unwrap(), 0);

        let changed: HashSet<String> = ["lib.Boot".to_string()].into();
        let removed = store
            .clean_stale_entries("app", &changed, &HashSet::new())
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.info("lib").unwrap().main_init("lib.Boot").is_some());
    }

    #[test]
    fn stubs_regenerate_until_compiled_output_is_newer() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let mut store = BuildMetadataStore::open(dir.path(), &names(&["app"]), "0.1.0", &sink);
        store
            .info_mut("app")
            .unwrap()
            .add(Fact::ExternalDyn(ExternalDynType::used_by("ext.Widget", "app.Main")));
        assert_eq!(
            store.external_stubs_to_regenerate("app", "java", "class"),
            vec!["ext.Widget"]
        );

        let out = dir.path().join("app/ext");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("Widget.java"), "stub").unwrap();
        std::fs::write(out.join("Widget.class"), "compiled").unwrap();
        assert!(store.mark_stub_generated("app", "ext.Widget"));
        let stub_time = Timestamp::modified(&out.join("Widget.java")).unwrap();
        let class_time = Timestamp::modified(&out.join("Widget.class")).unwrap();
        let expected_stale = class_time < stub_time;
        assert_eq!(
            store.external_stubs_to_regenerate("app", "java", "class").is_empty(),
            !expected_stale
        );
    }
}
