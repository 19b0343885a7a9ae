//! Staleness decisions for sources and orphan cleanup for generated files.
//!
//! The tracker holds the state of every build-layer of one system, in stack
//! order, because keeping a generated file alive may require touching the
//! indexes of several build-layers at once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use strata_common::ContentHash;
use strata_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use strata_source::{SrcHasher, SrcRecord};

use crate::dynamic_types::DynamicTypeIndex;
use crate::error::CacheError;
use crate::last_build::LastBuildRecord;
use crate::layout::BuildLayerPaths;
use crate::src_index::{SrcIndex, SrcIndexEntry};

const CORRUPT_INDEX: DiagnosticCode = DiagnosticCode::new(Category::Index, 1);
const DRIFT: DiagnosticCode = DiagnosticCode::new(Category::Drift, 1);

/// Classification of a candidate source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// No prior record; process and index it.
    New,
    /// Content differs from the last build; reprocess it.
    Changed,
    /// Same as the last build; skip it.
    Unchanged,
}

impl SourceStatus {
    /// Returns `true` if the file must be processed.
    pub fn needs_processing(self) -> bool {
        self != SourceStatus::Unchanged
    }
}

/// Outcome of cleaning one build-layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Generated files removed from disk and index.
    pub deleted: Vec<String>,
    /// Hand-edited files left on disk and dropped from the index.
    pub drifted: Vec<String>,
    /// Inner stubs kept for one more verification pass.
    pub deferred: Vec<String>,
}

/// Persisted state of one build-layer.
#[derive(Debug, Clone)]
pub struct TrackedBuildLayer {
    /// Build-layer name.
    pub name: String,
    /// Where its files live.
    pub paths: BuildLayerPaths,
    /// Generated files.
    pub index: SrcIndex,
    /// The previous pass, if it completed.
    pub last_build: Option<LastBuildRecord>,
    /// Types requiring dynamic handling.
    pub dynamic_types: DynamicTypeIndex,
}

impl TrackedBuildLayer {
    /// Fresh state with nothing recorded.
    pub fn empty(name: &str, paths: BuildLayerPaths) -> Self {
        Self {
            name: name.to_string(),
            paths,
            index: SrcIndex::new(),
            last_build: None,
            dynamic_types: DynamicTypeIndex::new(),
        }
    }

    /// Loads persisted state, discarding any unreadable file.
    pub fn load(name: &str, paths: BuildLayerPaths, sink: &DiagnosticSink) -> Self {
        let index = load_or_report(&paths.src_index(), name, sink, |p| SrcIndex::load(p));
        let last_build = load_or_report(&paths.last_build(), name, sink, |p| {
            LastBuildRecord::load(p)
        });
        let dynamic_types = load_or_report(&paths.dynamic_types(), name, sink, |p| {
            DynamicTypeIndex::load(p)
        });
        Self {
            name: name.to_string(),
            index: index.unwrap_or_default(),
            last_build,
            dynamic_types: dynamic_types.unwrap_or_default(),
            paths,
        }
    }
}

fn load_or_report<T>(
    path: &Path,
    layer: &str,
    sink: &DiagnosticSink,
    load: impl FnOnce(&Path) -> Option<T>,
) -> Option<T> {
    let loaded = load(path);
    if loaded.is_none() && path.exists() {
        sink.emit(
            Diagnostic::warning(CORRUPT_INDEX, "discarded unreadable build state")
                .in_layer(layer)
                .at_path(path)
                .with_note("the build-layer is rebuilt from scratch"),
        );
    }
    loaded
}

/// Tracks generated files and source staleness for every build-layer of
/// one system.
#[derive(Debug)]
pub struct IncrementalBuildTracker {
    layers: Vec<TrackedBuildLayer>,
    slack: Duration,
    compiled_extension: String,
}

impl IncrementalBuildTracker {
    /// Creates a tracker with no build-layers.
    pub fn new(slack: Duration) -> Self {
        Self {
            layers: Vec::new(),
            slack,
            compiled_extension: "class".to_string(),
        }
    }

    /// Loads the state of `build_layers` (in stack order) from `build_dir`.
    pub fn open(
        build_dir: &Path,
        build_layers: &[String],
        slack: Duration,
        sink: &DiagnosticSink,
    ) -> Self {
        let mut tracker = Self::new(slack);
        for name in build_layers {
            let paths = BuildLayerPaths::new(build_dir, name);
            tracker.layers.push(TrackedBuildLayer::load(name, paths, sink));
        }
        tracker
    }

    /// Sets the extension of compiled artifacts deleted alongside their
    /// generated source.
    pub fn with_compiled_extension(mut self, ext: impl Into<String>) -> Self {
        self.compiled_extension = ext.into();
        self
    }

    /// Re-aligns the tracked build-layers with `build_layers` after the
    /// layer stack changed.
    ///
    /// Build-layers not tracked yet are loaded from `build_dir`; layers no
    /// longer listed are dropped. Returns the names newly loaded.
    pub fn sync_build_layers(
        &mut self,
        build_dir: &Path,
        build_layers: &[String],
        sink: &DiagnosticSink,
    ) -> Vec<String> {
        let mut previous = std::mem::take(&mut self.layers);
        let mut loaded = Vec::new();
        for name in build_layers {
            match previous.iter().position(|l| &l.name == name) {
                Some(i) => self.layers.push(previous.swap_remove(i)),
                None => {
                    let paths = BuildLayerPaths::new(build_dir, name);
                    self.layers.push(TrackedBuildLayer::load(name, paths, sink));
                    loaded.push(name.clone());
                }
            }
        }
        for dropped in &previous {
            tracing::debug!(build_layer = %dropped.name, "no longer a build-layer");
        }
        loaded
    }

    /// State of one build-layer.
    pub fn build_layer(&self, name: &str) -> Option<&TrackedBuildLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Mutable state of one build-layer.
    pub fn build_layer_mut(&mut self, name: &str) -> Option<&mut TrackedBuildLayer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }

    /// Build-layer names in stack order.
    pub fn build_layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    /// Decides whether a source needs processing for `build_layer`.
    pub fn classify(&self, build_layer: &str, record: &SrcRecord) -> SourceStatus {
        let last = self
            .build_layer(build_layer)
            .and_then(|l| l.last_build.as_ref());
        classify_source(record, last, self.slack)
    }

    /// Returns `true` if the generated file no longer matches its entry.
    ///
    /// A missing entry, or a file that cannot be read, counts as changed.
    pub fn output_changed(&self, build_layer: &str, rel: &str) -> bool {
        let Some(tracked) = self.build_layer(build_layer) else {
            return true;
        };
        let Some(entry) = tracked.index.get(rel) else {
            return true;
        };
        !matches_on_disk(&tracked.paths.output_dir().join(rel), entry.hash)
    }

    /// Records a file the current pass generated.
    pub fn record_output(&mut self, build_layer: &str, rel: &str, entry: SrcIndexEntry) {
        if let Some(tracked) = self.build_layer_mut(build_layer) {
            tracked.index.insert(rel, entry);
        }
    }

    /// Marks a generated file as still required.
    ///
    /// Every build-layer from `build_layer` to the top gets a live entry.
    /// A build-layer lacking one inherits a copy of the nearest entry below
    /// it. Marking stops at a build-layer whose entry another layer
    /// produced. Returns `false` if no entry was found at all.
    pub fn mark_in_use(&mut self, build_layer: &str, rel: &str) -> bool {
        let Some(start) = self.index_of(build_layer) else {
            return false;
        };
        let mut nearest: Option<SrcIndexEntry> = None;
        for tracked in &mut self.layers[start..] {
            match tracked.index.get_mut(rel) {
                Some(entry) if nearest.as_ref().is_some_and(|n| n.layer != entry.layer) => break,
                Some(entry) => {
                    entry.in_use = true;
                    entry.pending_verification = false;
                    nearest = Some(entry.clone());
                }
                None => {
                    if let Some(entry) = &nearest {
                        tracing::debug!(
                            build_layer = %tracked.name,
                            file = rel,
                            "copying generated-file entry forward"
                        );
                        tracked.index.insert(rel, entry.clone());
                    }
                }
            }
        }
        nearest.is_some()
    }

    /// Starts a pass: nothing is in use until marked again.
    pub fn begin_pass(&mut self, build_layer: &str) {
        if let Some(tracked) = self.build_layer_mut(build_layer) {
            tracked.index.reset_in_use();
        }
    }

    /// Forgets everything recorded for a build-layer.
    pub fn reset(&mut self, build_layer: &str) {
        if let Some(tracked) = self.build_layer_mut(build_layer) {
            tracing::info!(build_layer, "resetting build-layer state");
            tracked.index = SrcIndex::new();
            tracked.last_build = None;
            tracked.dynamic_types = DynamicTypeIndex::new();
        }
    }

    /// Replaces the last-build record after a pass.
    pub fn set_last_build(&mut self, build_layer: &str, record: LastBuildRecord) {
        if let Some(tracked) = self.build_layer_mut(build_layer) {
            tracked.last_build = Some(record);
        }
    }

    /// Removes generated files no live source produced in this pass.
    ///
    /// Files whose content no longer matches the index were edited by hand:
    /// they are reported and left on disk. An unused inner stub whose outer
    /// file is still intact survives one more pass. Deletions are
    /// best-effort.
    pub fn cleanup(&mut self, build_layer: &str, sink: &DiagnosticSink) -> CleanupReport {
        let compiled_extension = self.compiled_extension.clone();
        let mut report = CleanupReport::default();
        let Some(tracked) = self.build_layer_mut(build_layer) else {
            return report;
        };
        let out: PathBuf = tracked.paths.output_dir().to_path_buf();

        for rel in tracked.index.unused() {
            let Some(entry) = tracked.index.get(&rel).cloned() else {
                continue;
            };
            let path = out.join(&rel);
            if !path.exists() {
                tracing::debug!(file = %rel, "forgetting generated file already gone");
                tracked.index.remove(&rel);
                continue;
            }

            if !matches_on_disk(&path, entry.hash) {
                sink.emit(
                    Diagnostic::warning(DRIFT, "generated file was modified after the build wrote it")
                        .in_layer(entry.layer.clone())
                        .at_path(&path)
                        .with_note("the file is left in place"),
                );
                tracked.index.remove(&rel);
                report.drifted.push(rel);
                continue;
            }

            if let Some(outer) = &entry.inner_of {
                let outer_intact = tracked
                    .index
                    .get(outer)
                    .is_some_and(|o| matches_on_disk(&out.join(outer), o.hash));
                if outer_intact && !entry.pending_verification {
                    if let Some(e) = tracked.index.get_mut(&rel) {
                        e.pending_verification = true;
                    }
                    report.deferred.push(rel);
                    continue;
                }
            }

            remove_best_effort(&path);
            let compiled = path.with_extension(&compiled_extension);
            if compiled != path && compiled.exists() {
                remove_best_effort(&compiled);
            }
            tracked.index.remove(&rel);
            report.deleted.push(rel);
        }

        if !report.deleted.is_empty() || !report.drifted.is_empty() {
            tracing::info!(
                build_layer,
                deleted = report.deleted.len(),
                drifted = report.drifted.len(),
                deferred = report.deferred.len(),
                "cleaned orphaned generated files"
            );
        }
        report
    }

    /// Writes the state of one build-layer.
    pub fn save(&mut self, build_layer: &str) -> Result<(), CacheError> {
        let Some(tracked) = self.build_layer_mut(build_layer) else {
            return Ok(());
        };
        tracked.index.save(&tracked.paths.src_index())?;
        if let Some(last) = &tracked.last_build {
            last.save(&tracked.paths.last_build())?;
        }
        tracked.dynamic_types.save(&tracked.paths.dynamic_types())
    }
}

/// Classifies `record` against the last pass.
///
/// A file last modified before the previous pass started (less `slack`, for
/// coarse filesystem clocks) is unchanged without looking further. Newer
/// files are compared by content hash.
pub fn classify_source(
    record: &SrcRecord,
    last: Option<&LastBuildRecord>,
    slack: Duration,
) -> SourceStatus {
    let Some(last) = last else {
        return SourceStatus::New;
    };
    let Some(previous) = last.get(&record.key()) else {
        return SourceStatus::New;
    };
    if record.modified < last.started_at.saturating_sub(slack) {
        return SourceStatus::Unchanged;
    }
    if previous.hash == record.hash {
        SourceStatus::Unchanged
    } else {
        SourceStatus::Changed
    }
}

fn matches_on_disk(path: &Path, expected: ContentHash) -> bool {
    match SrcHasher::hash_file(path) {
        Ok(hash) => hash == expected,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "generated file unreadable");
            false
        }
    }
}

fn remove_best_effort(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to delete orphaned output");
    }
}
