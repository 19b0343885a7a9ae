//! Durable per-build-layer build facts.
//!
//! A [`BuildInfo`] accumulates the cross-cutting facts code generators need
//! after all files are processed: entry points, test registrations,
//! packaging directives, type-group memberships, and stubs for types used
//! reflectively from outside the compiled graph. The
//! [`BuildMetadataStore`] keeps one per build-layer, fans facts added to
//! the root build-layer out to the build-layers that need them, and prunes
//! facts whose declaring type changed but was not reprocessed.

#![warn(missing_docs)]

pub mod error;
pub mod facts;
pub mod info;
pub mod side;
pub mod store;
mod text;

pub use error::BuildInfoError;
pub use facts::{
    AddOutcome, ExternalDynType, Fact, MainInit, PackagingDirective, TestInstance,
    TypeGroupMember,
};
pub use info::BuildInfo;
pub use side::SideData;
pub use store::{BuildLayerMetadata, BuildMetadataStore};
