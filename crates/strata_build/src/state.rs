//! Transient state of one build pass over one build-layer.

use std::collections::{BTreeSet, HashSet};

use strata_cache::{CleanupReport, LastBuildRecord, LastSource};
use strata_common::Timestamp;
use strata_source::SrcRecord;

/// Phases of a pass, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildPhase {
    /// Sources discovered and classified, stale facts pruned.
    Prepare,
    /// Stale sources handed to the processor.
    Process,
    /// Results applied and per-pass files generated.
    PostProcess,
    /// Orphaned outputs removed and state saved.
    Cleanup,
    /// The pass is over.
    Done,
}

/// What one pass over a build-layer saw and did.
///
/// Created at the start of the pass; its last-build record is promoted to
/// the tracker when the pass ends.
#[derive(Debug)]
pub struct BuildState {
    build_layer: String,
    phase: BuildPhase,
    started_at: Timestamp,
    /// Sources of the build-layer's member layers, overrides applied.
    pub entries: Vec<SrcRecord>,
    /// Lower-layer sources a higher layer's file at the same path replaced.
    pub overridden: Vec<SrcRecord>,
    /// Keys of sources whose processing failed or reported errors.
    pub errored: BTreeSet<String>,
    /// Relative paths of sources confirmed changed, new or deleted.
    pub changed_files: BTreeSet<String>,
    /// Types declared by changed sources, before reprocessing.
    pub changed_types: HashSet<String>,
    /// Types re-declared so far in this pass.
    pub processed_types: HashSet<String>,
    /// Sources handed to the processor.
    pub processed: usize,
    /// Sources skipped as unchanged.
    pub skipped: usize,
    /// Overridden sources of lower layers indexed for their declarations.
    pub shadowed: usize,
    record: LastBuildRecord,
}

impl BuildState {
    /// State for a pass over `build_layer` starting at `started_at`.
    pub fn new(build_layer: &str, started_at: Timestamp) -> Self {
        Self {
            build_layer: build_layer.to_string(),
            phase: BuildPhase::Prepare,
            started_at,
            entries: Vec::new(),
            overridden: Vec::new(),
            errored: BTreeSet::new(),
            changed_files: BTreeSet::new(),
            changed_types: HashSet::new(),
            processed_types: HashSet::new(),
            processed: 0,
            skipped: 0,
            shadowed: 0,
            record: LastBuildRecord::new(started_at),
        }
    }

    /// The build-layer being built.
    pub fn build_layer(&self) -> &str {
        &self.build_layer
    }

    /// The current phase.
    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// When the pass started.
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Moves to a later phase.
    pub fn advance(&mut self, phase: BuildPhase) {
        debug_assert!(phase > self.phase, "build phases only move forward");
        tracing::debug!(build_layer = %self.build_layer, ?phase, "build phase");
        self.phase = phase;
    }

    /// Records what a source looked like and produced in this pass.
    pub fn record_source(&mut self, record: &SrcRecord, source: LastSource) {
        self.record.record(record.key(), source);
    }

    /// Ends the pass, yielding the record to keep for the next one.
    pub fn finish(mut self, cleanup: &CleanupReport, stopped_early: bool) -> (LastBuildRecord, BuildSummary) {
        self.phase = BuildPhase::Done;
        let summary = BuildSummary {
            build_layer: self.build_layer,
            processed: self.processed,
            skipped: self.skipped,
            shadowed: self.shadowed,
            errored: self.errored.len(),
            deleted: cleanup.deleted.len(),
            drifted: cleanup.drifted.len(),
            deferred: cleanup.deferred.len(),
            stopped_early,
            to_compile: Vec::new(),
        };
        (self.record, summary)
    }
}

/// Counts reported at the end of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// The build-layer built.
    pub build_layer: String,
    /// Sources processed.
    pub processed: usize,
    /// Sources skipped as unchanged.
    pub skipped: usize,
    /// Overridden sources of lower layers re-indexed.
    pub shadowed: usize,
    /// Sources that failed or had errors.
    pub errored: usize,
    /// Orphaned outputs deleted.
    pub deleted: usize,
    /// Hand-edited outputs left in place.
    pub drifted: usize,
    /// Inner stubs kept for another pass.
    pub deferred: usize,
    /// The fatal flag stopped the pass before every source was processed.
    pub stopped_early: bool,
    /// Generated files that still need a native compile step.
    pub to_compile: Vec<String>,
}
