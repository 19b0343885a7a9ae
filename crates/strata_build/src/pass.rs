//! The build pass over one build-layer.
//!
//! A pass runs in three steps. Preparing and applying results happen under
//! the system's writer-lock; processing stale sources happens outside it,
//! in parallel, with results applied one file at a time afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::Ordering;

use rayon::prelude::*;
use strata_buildinfo::ExternalDynType;
use strata_cache::{BuildLayerPaths, BuildMarker, LastBuildRecord, LastSource, MarkerStatus, SrcIndexEntry};
use strata_common::{ContentHash, InternalError, Timestamp};
use strata_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use strata_layer::{Layer, LayerGraph, LayerState};
use strata_source::{discover_sources, SrcHasher, SrcRecord};
use strata_typeindex::{TypeIndexEntry, TypeIndexError};

use crate::error::BuildError;
use crate::processor::{FileProcessor, OutputFile, ProcessContext, ProcessError, ProcessedFile};
use crate::state::{BuildPhase, BuildState, BuildSummary};
use crate::system::{LayeredSystem, SystemState};

const INTERRUPTED: DiagnosticCode = DiagnosticCode::new(Category::Index, 3);
const PROCESSOR_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Build, 1);
const FILE_HAS_ERRORS: DiagnosticCode = DiagnosticCode::new(Category::Build, 2);

/// Sources chosen for processing, with what the pass needs to process them
/// outside the lock.
struct Prepared {
    state: BuildState,
    paths: BuildLayerPaths,
    marker: BuildMarker,
    last: Option<LastBuildRecord>,
    stale: Vec<Job>,
    layers: HashMap<String, Layer>,
}

/// A source handed to the processor.
#[derive(Debug, Clone, Copy)]
enum Job {
    /// Index into the pass's effective sources.
    Source(usize),
    /// Index into the overridden sources; only its declarations are kept.
    Overridden(usize),
}

impl BuildState {
    fn job_record(&self, job: Job) -> &SrcRecord {
        match job {
            Job::Source(i) => &self.entries[i],
            Job::Overridden(i) => &self.overridden[i],
        }
    }
}

type FileResult = Option<Result<ProcessedFile, ProcessError>>;

impl LayeredSystem {
    /// Runs one pass over a build-layer.
    ///
    /// Sources of every layer the build-layer holds are discovered, with
    /// higher layers overriding lower ones path by path. Stale sources are
    /// processed; unchanged ones keep their outputs alive. Outputs no
    /// source produced any more are cleaned up at the end.
    ///
    /// Generated files the build-layer inherited from lower build-layers
    /// count as unused until a lower pass marks them again.
    pub fn build_layer(
        &self,
        build_layer: &str,
        processor: &dyn FileProcessor,
        sink: &DiagnosticSink,
    ) -> Result<BuildSummary, BuildError> {
        self.state.write().tracker.begin_pass(build_layer);
        self.run_pass(build_layer, processor, sink)
    }

    pub(crate) fn run_pass(
        &self,
        build_layer: &str,
        processor: &dyn FileProcessor,
        sink: &DiagnosticSink,
    ) -> Result<BuildSummary, BuildError> {
        let prepared = {
            let mut state = self.state.write();
            self.prepare(&mut state, build_layer, sink)?
        };
        let results = self.process_stale(&prepared, processor, sink);

        let mut state = self.state.write();
        self.apply(&mut state, prepared, results, sink)
    }

    fn prepare(
        &self,
        st: &mut SystemState,
        build_layer: &str,
        sink: &DiagnosticSink,
    ) -> Result<Prepared, BuildError> {
        let started_at = Timestamp::now();
        let paths = st
            .tracker
            .build_layer(build_layer)
            .map(|t| t.paths.clone())
            .ok_or_else(|| BuildError::UnknownBuildLayer(build_layer.to_string()))?;
        self.runtime.start(&paths)?;

        st.metadata.ensure_build_layer(build_layer, &st.graph);
        let marker = BuildMarker::new(&paths.marker());
        if marker.begin(started_at)? == MarkerStatus::Interrupted {
            sink.emit(
                Diagnostic::warning(INTERRUPTED, "previous build of this build-layer did not complete")
                    .in_layer(build_layer)
                    .at_path(paths.marker())
                    .with_note("the build-layer is rebuilt from scratch"),
            );
            st.tracker.reset(build_layer);
            st.metadata.reset(build_layer)?;
        }

        let mut state = BuildState::new(build_layer, started_at);
        let members = member_layers(&st.graph, build_layer);
        (state.entries, state.overridden) = self.collect_sources(&members)?;
        for layer in &members {
            st.graph.set_state(&layer.name, LayerState::Started)?;
        }
        let layers: HashMap<String, Layer> =
            members.into_iter().map(|l| (l.name.clone(), l)).collect();

        let last = st
            .tracker
            .build_layer(build_layer)
            .and_then(|t| t.last_build.clone());
        let mut stale: BTreeSet<usize> = BTreeSet::new();
        for (i, record) in state.entries.iter().enumerate() {
            let was_overridden = last
                .as_ref()
                .and_then(|l| l.get(&record.key()))
                .is_some_and(|s| s.shadowed);
            if was_overridden || st.tracker.classify(build_layer, record).needs_processing() {
                stale.insert(i);
                state.changed_files.insert(record.rel_path.clone());
            }
        }

        let current: BTreeSet<String> = state
            .entries
            .iter()
            .chain(&state.overridden)
            .map(SrcRecord::key)
            .collect();
        let deleted: Vec<(String, LastSource)> = last
            .iter()
            .flat_map(|l| l.sources.iter())
            .filter(|(key, _)| !current.contains(*key))
            .map(|(key, source)| (key.clone(), source.clone()))
            .collect();
        for (key, source) in &deleted {
            let Some((layer, rel)) = key.split_once(':') else {
                continue;
            };
            if !source.shadowed {
                state.changed_files.insert(rel.to_string());
                state.changed_types.extend(source.types.iter().cloned());
            }
            match st.type_index.remove_file(layer, rel) {
                Ok(_) | Err(TypeIndexError::UnknownLayer(_)) => {}
                Err(e) => return Err(e.into()),
            }
            tracing::debug!(build_layer, source = %key, "source deleted");
        }

        propagate_dependencies(&state, last.as_ref(), &mut stale);

        let output_dir = paths.output_dir().to_path_buf();
        for (i, record) in state.entries.iter().enumerate() {
            let previous = last.as_ref().and_then(|l| l.get(&record.key()));
            if stale.contains(&i) {
                let layer_package = layers.get(&record.layer).map(|l| l.package.as_str()).unwrap_or("");
                state.changed_types.insert(record.type_name(layer_package));
                if let Some(previous) = previous {
                    state.changed_types.extend(previous.types.iter().cloned());
                }
                continue;
            }
            let Some(previous) = previous else {
                stale.insert(i);
                continue;
            };
            let outputs_present = previous.outputs.iter().all(|out| {
                output_dir.join(out).exists() && st.tracker.mark_in_use(build_layer, out)
            });
            if !outputs_present {
                tracing::debug!(build_layer, source = %record.key(), "outputs missing, reprocessing");
                stale.insert(i);
                state.changed_types.extend(previous.types.iter().cloned());
                continue;
            }
            state.processed_types.extend(previous.types.iter().cloned());
        }
        let kept: Vec<(SrcRecord, LastSource)> = state
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| !stale.contains(i))
            .filter_map(|(_, record)| {
                let previous = last.as_ref()?.get(&record.key())?;
                Some((record.clone(), previous.clone()))
            })
            .collect();
        for (record, previous) in kept {
            state.skipped += 1;
            state.record_source(&record, previous);
        }

        let mut overridden_stale = Vec::new();
        let mut overridden_kept = Vec::new();
        for (i, record) in state.overridden.iter().enumerate() {
            let previous = last.as_ref().and_then(|l| l.get(&record.key()));
            match previous {
                Some(previous) if !st.tracker.classify(build_layer, record).needs_processing() => {
                    overridden_kept.push((record.clone(), previous.clone()));
                }
                _ => overridden_stale.push(Job::Overridden(i)),
            }
        }
        for (record, previous) in overridden_kept {
            state.record_source(
                &record,
                LastSource {
                    outputs: Vec::new(),
                    shadowed: true,
                    ..previous
                },
            );
        }

        let pruned = st
            .metadata
            .clean_stale_entries(build_layer, &state.changed_types, &state.processed_types)?;
        tracing::info!(
            build_layer,
            sources = state.entries.len(),
            stale = stale.len(),
            overridden = state.overridden.len(),
            deleted = deleted.len(),
            pruned,
            "prepared build-layer"
        );
        state.advance(BuildPhase::Process);

        Ok(Prepared {
            state,
            paths,
            marker,
            last,
            stale: stale
                .into_iter()
                .map(Job::Source)
                .chain(overridden_stale)
                .collect(),
            layers,
        })
    }

    /// Finds the sources of every member layer, lowest first, so that a
    /// higher layer's file replaces a lower layer's file at the same path.
    ///
    /// Returns the effective sources and the lower-layer sources replaced.
    fn collect_sources(&self, members: &[Layer]) -> Result<(Vec<SrcRecord>, Vec<SrcRecord>), BuildError> {
        let extensions: Vec<&str> = self
            .settings
            .source_extensions
            .iter()
            .map(String::as_str)
            .collect();
        let mut by_path: BTreeMap<String, SrcRecord> = BTreeMap::new();
        let mut overridden = Vec::new();
        for layer in members.iter().filter(|l| !l.flags.compiled_only) {
            for root in &layer.source_roots {
                let files = discover_sources(root, &extensions).map_err(|e| BuildError::io(root, e))?;
                for record in SrcHasher::records(&layer.name, &files) {
                    let Some(replaced) = by_path.insert(record.rel_path.clone(), record) else {
                        continue;
                    };
                    if replaced.layer != layer.name {
                        tracing::debug!(file = %replaced.rel_path, from = %replaced.layer, "source overridden");
                        overridden.push(replaced);
                    }
                }
            }
        }
        Ok((by_path.into_values().collect(), overridden))
    }

    fn process_stale(
        &self,
        prepared: &Prepared,
        processor: &dyn FileProcessor,
        sink: &DiagnosticSink,
    ) -> Vec<(Job, FileResult)> {
        let build_layer = prepared.state.build_layer();
        prepared
            .stale
            .par_iter()
            .map(|&job| {
                if self.fatal.load(Ordering::Acquire) {
                    return (job, None);
                }
                let record = prepared.state.job_record(job);
                let Some(layer) = prepared.layers.get(&record.layer) else {
                    let err = ProcessError::new(format!("no layer '{}' in this build-layer", record.layer));
                    return (job, Some(Err(err)));
                };
                let ctx = ProcessContext {
                    runtime: self.runtime,
                    target: &self.target,
                    build_layer,
                    layer,
                };
                let result = self.runtime.process(processor, record, &ctx);
                match &result {
                    Err(e) => {
                        sink.emit(
                            Diagnostic::error(PROCESSOR_FAILED, format!("failed to process source: {e}"))
                                .in_layer(record.layer.as_str())
                                .at_path(&record.abs_path),
                        );
                        self.count_error(sink);
                    }
                    Ok(processed) if processed.has_errors => {
                        sink.emit(
                            Diagnostic::error(FILE_HAS_ERRORS, "source has errors")
                                .in_layer(record.layer.as_str())
                                .at_path(&record.abs_path)
                                .with_note("its previous outputs are kept"),
                        );
                        self.count_error(sink);
                    }
                    Ok(_) => {}
                }
                (job, Some(result))
            })
            .collect()
    }

    fn apply(
        &self,
        st: &mut SystemState,
        prepared: Prepared,
        results: Vec<(Job, FileResult)>,
        sink: &DiagnosticSink,
    ) -> Result<BuildSummary, BuildError> {
        let Prepared {
            mut state,
            paths,
            marker,
            last,
            ..
        } = prepared;
        let build_layer = state.build_layer().to_string();
        state.advance(BuildPhase::PostProcess);

        let mut stopped_early = false;
        let mut to_compile = Vec::new();
        for (job, result) in results {
            let record = state.job_record(job).clone();
            let processed = match result {
                Some(Ok(processed)) if !processed.has_errors => processed,
                other => {
                    if other.is_none() {
                        stopped_early = true;
                    } else {
                        state.errored.insert(record.key());
                    }
                    if let Some(previous) = last.as_ref().and_then(|l| l.get(&record.key())) {
                        for out in &previous.outputs {
                            st.tracker.mark_in_use(&build_layer, out);
                        }
                    }
                    continue;
                }
            };

            if let Job::Overridden(_) = job {
                let types = index_declarations(st, &record, processed.declared_types)?;
                state.shadowed += 1;
                state.record_source(
                    &record,
                    LastSource {
                        hash: record.hash,
                        outputs: Vec::new(),
                        types,
                        depends_on: processed.dependent_files,
                        shadowed: true,
                    },
                );
                continue;
            }

            let mut outputs = Vec::with_capacity(processed.output_files.len());
            for output in &processed.output_files {
                write_output(st, &paths, &build_layer, &record.layer, output)?;
                if processed.needs_compile {
                    to_compile.push(output.rel_path.clone());
                }
                outputs.push(output.rel_path.clone());
            }

            let types = index_declarations(st, &record, processed.declared_types)?;
            state.processed_types.extend(types.iter().cloned());

            for fact in processed.facts {
                st.metadata
                    .add(&build_layer, &record.layer, fact, &st.graph, sink)?;
            }
            if let Some(tracked) = st.tracker.build_layer_mut(&build_layer) {
                for dynamic in processed.dynamic_types {
                    tracked.dynamic_types.insert(dynamic);
                }
            }

            state.processed += 1;
            state.record_source(
                &record,
                LastSource {
                    hash: record.hash,
                    outputs,
                    types,
                    depends_on: processed.dependent_files,
                    shadowed: false,
                },
            );
        }

        self.post_process(st, &paths, &build_layer)?;

        state.advance(BuildPhase::Cleanup);
        let report = st.tracker.cleanup(&build_layer, sink);
        let (record, mut summary) = state.finish(&report, stopped_early);
        summary.to_compile = to_compile;
        st.tracker.set_last_build(&build_layer, record);
        st.tracker.save(&build_layer)?;
        st.metadata.save(&build_layer)?;
        if !stopped_early {
            marker.complete(Timestamp::now())?;
        }

        tracing::info!(
            build_layer = %build_layer,
            processed = summary.processed,
            skipped = summary.skipped,
            shadowed = summary.shadowed,
            errored = summary.errored,
            deleted = summary.deleted,
            drifted = summary.drifted,
            stopped_early,
            "build-layer built"
        );
        Ok(summary)
    }

    /// Writes files generated from the accumulated build info: launchers
    /// for entry points and stubs of external dynamic types.
    fn post_process(
        &self,
        st: &mut SystemState,
        paths: &BuildLayerPaths,
        build_layer: &str,
    ) -> Result<(), BuildError> {
        let info = st
            .metadata
            .info(build_layer)
            .cloned()
            .ok_or_else(|| InternalError::new(format!("build-layer '{build_layer}' has no build info")))?;

        for launcher in self.runtime.post_process(&info) {
            write_output(st, paths, build_layer, build_layer, &launcher)?;
        }

        let source_ext = self.runtime.source_extension();
        let regenerate: BTreeSet<String> = st
            .metadata
            .external_stubs_to_regenerate(build_layer, source_ext, self.runtime.compiled_extension())
            .into_iter()
            .collect();
        for stub in info.external_dyn_types() {
            let rel = format!("{}.{source_ext}", stub.type_name.replace('.', "/"));
            if !regenerate.contains(&stub.type_name) && st.tracker.mark_in_use(build_layer, &rel) {
                continue;
            }
            let output = OutputFile::new(rel, stub_source(self.runtime.source_extension(), stub));
            write_output(st, paths, build_layer, build_layer, &output)?;
            st.metadata.mark_stub_generated(build_layer, &stub.type_name);
            tracing::debug!(build_layer, type_name = %stub.type_name, "regenerated external stub");
        }
        Ok(())
    }
}

/// Replaces the type-index declarations of a source's file with the ones
/// it just reported. Returns the declared type names.
fn index_declarations(
    st: &mut SystemState,
    record: &SrcRecord,
    declared: Vec<TypeIndexEntry>,
) -> Result<Vec<String>, BuildError> {
    st.type_index.remove_file(&record.layer, &record.rel_path)?;
    let mut types = Vec::with_capacity(declared.len());
    for mut entry in declared {
        entry.file = record.rel_path.clone();
        types.push(entry.type_name.clone());
        st.type_index.put_type(&record.layer, entry.modified_at(record.modified))?;
    }
    Ok(types)
}

/// Layers whose output goes to `build_layer`, in stack order.
fn member_layers(graph: &LayerGraph, build_layer: &str) -> Vec<Layer> {
    graph
        .layers()
        .iter()
        .filter(|l| {
            graph
                .build_layer_of(&l.name)
                .is_some_and(|b| b.name == build_layer)
        })
        .cloned()
        .collect()
}

/// Marks sources stale whose recorded dependencies changed, until nothing
/// more changes.
fn propagate_dependencies(state: &BuildState, last: Option<&LastBuildRecord>, stale: &mut BTreeSet<usize>) {
    let Some(last) = last else {
        return;
    };
    let mut changed: BTreeSet<&str> = state.changed_files.iter().map(String::as_str).collect();
    loop {
        let mut grew = false;
        for (i, record) in state.entries.iter().enumerate() {
            if stale.contains(&i) {
                continue;
            }
            let depends_on_changed = last
                .get(&record.key())
                .is_some_and(|s| s.depends_on.iter().any(|d| changed.contains(d.as_str())));
            if depends_on_changed {
                stale.insert(i);
                changed.insert(record.rel_path.as_str());
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
}

/// Writes a generated file unless identical content is already on disk,
/// then records it as produced and in use.
fn write_output(
    st: &mut SystemState,
    paths: &BuildLayerPaths,
    build_layer: &str,
    producing_layer: &str,
    output: &OutputFile,
) -> Result<(), BuildError> {
    let hash = ContentHash::from_bytes(&output.contents);
    let unchanged = st
        .tracker
        .build_layer(build_layer)
        .and_then(|t| t.index.get(&output.rel_path))
        .is_some_and(|e| e.hash == hash)
        && !st.tracker.output_changed(build_layer, &output.rel_path);

    if !unchanged {
        let path = paths.output_dir().join(&output.rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        std::fs::write(&path, &output.contents).map_err(|e| BuildError::io(&path, e))?;
    }

    let mut entry = SrcIndexEntry::new(hash, output.extension(), producing_layer);
    if let Some(outer) = &output.inner_of {
        entry = entry.inner_of(outer.as_str());
    }
    st.tracker.record_output(build_layer, &output.rel_path, entry);
    st.tracker.mark_in_use(build_layer, &output.rel_path);
    Ok(())
}

fn stub_source(source_ext: &str, stub: &ExternalDynType) -> String {
    let users: Vec<&str> = stub.reverse_deps.iter().map(String::as_str).collect();
    let (package, simple) = stub
        .type_name
        .rsplit_once('.')
        .unwrap_or(("", stub.type_name.as_str()));
    match source_ext {
        "java" => {
            let mut text = String::new();
            if !package.is_empty() {
                text.push_str(&format!("package {package};\n\n"));
            }
            text.push_str(&format!(
                "// Dynamic stub used by {}\npublic class {simple} {{\n}}\n",
                users.join(", ")
            ));
            text
        }
        _ => format!(
            "// Dynamic stub for {} used by {}\nexport class {simple} {{}}\n",
            stub.type_name,
            users.join(", ")
        ),
    }
}
