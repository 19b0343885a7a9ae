//! Peer systems built side by side, one per runtime or process.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use strata_config::{default_targets, ProjectConfig};
use strata_diagnostics::DiagnosticSink;

use crate::error::BuildError;
use crate::processor::FileProcessor;
use crate::state::BuildSummary;
use crate::system::{LayeredSystem, PeerAnswer};

/// The systems of one project.
///
/// Systems share nothing in memory. They learn about each other only
/// through [`SystemGroup::peer_lookup`], which never waits for a peer that
/// is in the middle of a pass.
#[derive(Debug, Default)]
pub struct SystemGroup {
    systems: Vec<Arc<LayeredSystem>>,
}

impl SystemGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens one system per target of the project.
    pub fn open(
        project_root: &Path,
        config: &ProjectConfig,
        sink: &DiagnosticSink,
    ) -> Result<Self, BuildError> {
        let mut group = Self::new();
        for target in default_targets(config) {
            let system = LayeredSystem::open(project_root, config, target, sink)?;
            group.insert(Arc::new(system));
        }
        Ok(group)
    }

    /// Adds a system, replacing one with the same name.
    pub fn insert(&mut self, system: Arc<LayeredSystem>) {
        self.systems.retain(|s| s.name() != system.name());
        self.systems.push(system);
    }

    /// The system with the given target name.
    pub fn get(&self, name: &str) -> Option<&Arc<LayeredSystem>> {
        self.systems.iter().find(|s| s.name() == name)
    }

    /// Every system, in insertion order.
    pub fn systems(&self) -> &[Arc<LayeredSystem>] {
        &self.systems
    }

    /// Asks every system but `asking` whether it declares `type_name`.
    pub fn peer_lookup(&self, asking: &str, type_name: &str) -> Vec<(String, PeerAnswer)> {
        self.systems
            .iter()
            .filter(|s| s.name() != asking)
            .map(|s| (s.name().to_string(), s.try_declares(type_name)))
            .collect()
    }

    /// Builds every system concurrently.
    ///
    /// The fatal flag is per system: one system crossing its threshold
    /// does not stop the others.
    pub fn build_all(
        &self,
        processor: &dyn FileProcessor,
        sink: &DiagnosticSink,
    ) -> Result<Vec<BuildSummary>, BuildError> {
        let per_system: Vec<Vec<BuildSummary>> = self
            .systems
            .par_iter()
            .map(|system| system.build(processor, sink))
            .collect::<Result<_, _>>()?;
        Ok(per_system.into_iter().flatten().collect())
    }
}
