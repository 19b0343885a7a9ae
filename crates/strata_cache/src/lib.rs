//! Incremental build state for strata build-layers.
//!
//! Each build-layer keeps its state under `<output>/.strata/`: the source
//! index of generated files, the record of the last build, the dynamic-type
//! index, and the build-in-progress marker. Binary artifacts (build-info
//! side data, per-layer type indexes) share one validated header format
//! provided by [`ArtifactStore`]. All loads are fail-safe: a missing, corrupt
//! or version-mismatched file reads as absent.

#![warn(missing_docs)]

pub mod artifact;
pub mod dynamic_types;
pub mod error;
pub mod last_build;
pub mod layout;
pub mod marker;
pub mod src_index;
pub mod tracker;

pub use artifact::ArtifactStore;
pub use dynamic_types::DynamicTypeIndex;
pub use error::CacheError;
pub use last_build::{LastBuildRecord, LastSource};
pub use layout::BuildLayerPaths;
pub use marker::{BuildMarker, MarkerStatus};
pub use src_index::{SrcIndex, SrcIndexEntry};
pub use tracker::{
    classify_source, CleanupReport, IncrementalBuildTracker, SourceStatus, TrackedBuildLayer,
};
