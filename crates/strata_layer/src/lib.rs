//! Layer model, enablement resolution, and the ordered layer graph.
//!
//! A [`LayerGraph`] owns the active stack of layers in an arena indexed by
//! position. Layers reference their bases by name only. The
//! [`LayerEnablementResolver`] decides which layers participate in a given
//! runtime or process before they are ordered.

#![warn(missing_docs)]

pub mod discovery;
pub mod enablement;
pub mod error;
pub mod graph;
pub mod layer;

pub use discovery::discover_layers;
pub use enablement::{LayerEnabledState, LayerEnablementResolver, LayerLookup};
pub use error::LayerError;
pub use graph::LayerGraph;
pub use layer::{Layer, LayerAffinity, LayerFlags, LayerState};
pub use strata_config::LayerKind;
