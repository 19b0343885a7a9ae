//! One layered system: the layer stack and incremental state built for a
//! single runtime or process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use strata_buildinfo::BuildMetadataStore;
use strata_cache::IncrementalBuildTracker;
use strata_config::{BuildTarget, ProjectConfig};
use strata_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use strata_layer::{discover_layers, Layer, LayerGraph};
use strata_typeindex::{TypeIndex, TypeIndexEntry};

use crate::error::BuildError;
use crate::processor::FileProcessor;
use crate::runtime::RuntimeProcessor;
use crate::state::BuildSummary;

const FATAL_THRESHOLD: DiagnosticCode = DiagnosticCode::new(Category::Build, 3);

/// Version written into binary artifact headers.
pub const STRATA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything guarded by a system's writer-lock.
#[derive(Debug)]
pub struct SystemState {
    /// The layer stack.
    pub graph: LayerGraph,
    /// Generated-file and staleness state of every build-layer.
    pub tracker: IncrementalBuildTracker,
    /// Build facts of every build-layer.
    pub metadata: BuildMetadataStore,
    /// The persistent type index.
    pub type_index: TypeIndex,
}

/// Settings a system reads on every pass.
#[derive(Debug, Clone)]
pub struct SystemSettings {
    /// Root of this system's build-layer output directories.
    pub build_dir: PathBuf,
    /// Directory of this system's type index.
    pub index_dir: PathBuf,
    /// Errors after which no further files are scheduled.
    pub error_threshold: usize,
    /// Slack applied to last-modified comparisons.
    pub mtime_slack: Duration,
    /// Extensions of layer source files.
    pub source_extensions: Vec<String>,
}

impl SystemSettings {
    /// Settings for `target` from a project configuration rooted at
    /// `project_root`. Each target builds into its own subdirectories.
    pub fn from_config(project_root: &Path, config: &ProjectConfig, target: &BuildTarget) -> Self {
        Self {
            build_dir: project_root.join(&config.project.build_dir).join(&target.name),
            index_dir: project_root.join(&config.project.index_dir).join(&target.name),
            error_threshold: config.build.error_threshold,
            mtime_slack: Duration::from_millis(config.build.mtime_slack_ms),
            source_extensions: config.build.source_extensions.clone(),
        }
    }
}

/// Answer to a question asked of a peer system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAnswer {
    /// The peer declares the type; its highest declaration.
    Declared(TypeIndexEntry),
    /// The peer does not declare the type.
    NotDeclared,
    /// The peer is busy and could not be asked without waiting.
    Unknown,
}

/// A layer stack built for one target, with its incremental state behind a
/// single writer-lock.
///
/// Every operation receives the system explicitly; nothing is global, so
/// several systems (one per runtime or process) coexist as independent
/// values.
#[derive(Debug)]
pub struct LayeredSystem {
    pub(crate) target: BuildTarget,
    pub(crate) runtime: RuntimeProcessor,
    pub(crate) settings: SystemSettings,
    pub(crate) state: RwLock<SystemState>,
    pub(crate) fatal: AtomicBool,
    pub(crate) errors: AtomicUsize,
}

impl LayeredSystem {
    /// Discovers the project's layers and opens the persisted state of
    /// every build-layer for `target`.
    pub fn open(
        project_root: &Path,
        config: &ProjectConfig,
        target: BuildTarget,
        sink: &DiagnosticSink,
    ) -> Result<Self, BuildError> {
        let layers = discover_layers(project_root, &config.project.layer_path, sink);
        let settings = SystemSettings::from_config(project_root, config, &target);
        Self::from_layers(layers, target, settings, sink)
    }

    /// Builds a system from layers already in memory.
    pub fn from_layers(
        layers: Vec<Layer>,
        target: BuildTarget,
        settings: SystemSettings,
        sink: &DiagnosticSink,
    ) -> Result<Self, BuildError> {
        let runtime = RuntimeProcessor::from_name(&target.runtime)?;
        let graph = LayerGraph::build(layers, Some(&target), sink);
        let build_layers = build_layer_names(&graph);

        let tracker = IncrementalBuildTracker::open(
            &settings.build_dir,
            &build_layers,
            settings.mtime_slack,
            sink,
        )
        .with_compiled_extension(runtime.compiled_extension());
        let metadata =
            BuildMetadataStore::open(&settings.build_dir, &build_layers, STRATA_VERSION, sink);
        let type_index = TypeIndex::open(&settings.index_dir, STRATA_VERSION, &graph, sink);

        tracing::info!(
            target = %target.name,
            runtime = runtime.name(),
            layers = graph.len(),
            build_layers = build_layers.len(),
            "opened layered system"
        );
        Ok(Self {
            target,
            runtime,
            settings,
            state: RwLock::new(SystemState {
                graph,
                tracker,
                metadata,
                type_index,
            }),
            fatal: AtomicBool::new(false),
            errors: AtomicUsize::new(0),
        })
    }

    /// Target name.
    pub fn name(&self) -> &str {
        &self.target.name
    }

    /// The target this system builds for.
    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// The runtime processor selected for the target.
    pub fn runtime(&self) -> RuntimeProcessor {
        self.runtime
    }

    /// The system's settings.
    pub fn settings(&self) -> &SystemSettings {
        &self.settings
    }

    /// Shared access to the guarded state. Blocks while a pass holds the
    /// writer-lock.
    pub fn read_state(&self) -> RwLockReadGuard<'_, SystemState> {
        self.state.read()
    }

    /// Exclusive access to the guarded state.
    pub fn write_state(&self) -> RwLockWriteGuard<'_, SystemState> {
        self.state.write()
    }

    /// Returns `true` once the current build's errors crossed the threshold.
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    /// Stops scheduling new files. Reported once, however many threads
    /// get here.
    pub fn set_fatal(&self, sink: &DiagnosticSink) {
        if !self.fatal.swap(true, Ordering::AcqRel) {
            sink.emit(
                Diagnostic::error(FATAL_THRESHOLD, "too many errors; build stopped")
                    .with_note(format!(
                        "more than {} errors were reported",
                        self.settings.error_threshold
                    ))
                    .with_help("files already being processed are allowed to finish"),
            );
        }
    }

    /// Counts an error reported while processing a file and sets the
    /// fatal flag once the count passes the threshold.
    pub(crate) fn count_error(&self, sink: &DiagnosticSink) {
        let errors = self.errors.fetch_add(1, Ordering::AcqRel) + 1;
        if errors > self.settings.error_threshold {
            self.set_fatal(sink);
        }
    }

    /// Clears the fatal flag and the error count. [`LayeredSystem::build`]
    /// does this itself; a host driving single build-layers calls it
    /// between builds.
    pub fn clear_fatal(&self) {
        self.errors.store(0, Ordering::Release);
        self.fatal.store(false, Ordering::Release);
    }

    /// Builds every build-layer in stack order, then saves the type index.
    ///
    /// The fatal flag and error count start cleared. Every build-layer's
    /// generated files count as unused until some pass of this build marks
    /// them, so files inherited from a lower build-layer stay alive. Stops
    /// before the next build-layer once the fatal flag is set.
    pub fn build(
        &self,
        processor: &dyn FileProcessor,
        sink: &DiagnosticSink,
    ) -> Result<Vec<BuildSummary>, BuildError> {
        self.clear_fatal();
        let build_layers = {
            let mut state = self.state.write();
            let names = build_layer_names(&state.graph);
            for name in &names {
                state.tracker.begin_pass(name);
            }
            names
        };
        let mut summaries = Vec::with_capacity(build_layers.len());
        for build_layer in &build_layers {
            if self.is_fatal() {
                tracing::warn!(build_layer = %build_layer, "skipping build-layer after fatal errors");
                break;
            }
            summaries.push(self.run_pass(build_layer, processor, sink)?);
        }

        let mut state = self.state.write();
        let state = &mut *state;
        let written = state.type_index.save(&state.graph)?;
        tracing::info!(target = %self.target.name, written, "saved type index");
        Ok(summaries)
    }

    /// Adds a layer to the running system.
    ///
    /// The type index gains the layer at its position, and build-layer
    /// state follows the new stack: a build-layer appearing for the first
    /// time starts with the facts of the build-layer below it.
    pub fn add_layer(&self, layer: Layer, sink: &DiagnosticSink) -> Result<usize, BuildError> {
        let mut state = self.state.write();
        let state = &mut *state;
        let position = state.graph.add_layer(layer)?;
        if let Some(added) = state.graph.layers().get(position) {
            state.type_index.add_layer(added, sink);
        }
        state.type_index.sync_positions(&state.graph);
        self.sync_build_layers(state, sink);
        Ok(position)
    }

    /// Removes a layer and every layer extending it. Returns the removed
    /// names; their type index files are deleted on the next save.
    pub fn remove_layer(&self, name: &str, sink: &DiagnosticSink) -> Result<Vec<String>, BuildError> {
        let mut state = self.state.write();
        let state = &mut *state;
        let removed = state.graph.remove_layer(name)?;
        for layer in &removed {
            state.type_index.remove_layer(layer);
        }
        state.type_index.sync_positions(&state.graph);
        self.sync_build_layers(state, sink);
        Ok(removed)
    }

    fn sync_build_layers(&self, state: &mut SystemState, sink: &DiagnosticSink) {
        let build_layers = build_layer_names(&state.graph);
        let loaded = state
            .tracker
            .sync_build_layers(&self.settings.build_dir, &build_layers, sink);
        for name in &build_layers {
            state.metadata.ensure_build_layer(name, &state.graph);
        }
        if !loaded.is_empty() {
            tracing::info!(build_layers = ?loaded, "build-layers added");
        }
    }

    /// Asks whether this system declares a type, without waiting.
    ///
    /// Answers [`PeerAnswer::Unknown`] while a pass holds the writer-lock.
    pub fn try_declares(&self, type_name: &str) -> PeerAnswer {
        match self.state.try_read() {
            Some(state) => match state.type_index.find_type(type_name) {
                Some(entry) => PeerAnswer::Declared(entry.clone()),
                None => PeerAnswer::NotDeclared,
            },
            None => PeerAnswer::Unknown,
        }
    }
}

pub(crate) fn build_layer_names(graph: &LayerGraph) -> Vec<String> {
    graph.build_layers().iter().map(|l| l.name.clone()).collect()
}
