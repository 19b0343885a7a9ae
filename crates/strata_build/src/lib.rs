//! Incremental builds of a layered project.
//!
//! A [`LayeredSystem`] is the layer stack of one runtime or process together
//! with its incremental state: the generated-file tracker, the build
//! metadata, and the type index, all behind one writer-lock. A build pass
//! walks the system's build-layers in stack order. For each, stale sources
//! are handed to a [`FileProcessor`] in parallel outside the lock, and the
//! results are applied under it. A shared fatal flag stops scheduling new
//! files once errors cross the configured threshold.
//!
//! Code generation backends are the closed set in [`RuntimeProcessor`].
//! Several systems of one project live in a [`SystemGroup`] and consult
//! each other only through non-blocking peer lookups.

#![warn(missing_docs)]

pub mod error;
pub mod group;
mod pass;
pub mod processor;
pub mod runtime;
pub mod state;
pub mod system;

pub use error::BuildError;
pub use group::SystemGroup;
pub use processor::{FileProcessor, OutputFile, ProcessContext, ProcessError, ProcessedFile};
pub use runtime::{LaunchPlan, RuntimeProcessor};
pub use state::{BuildPhase, BuildState, BuildSummary};
pub use system::{LayeredSystem, PeerAnswer, SystemSettings, SystemState, STRATA_VERSION};
