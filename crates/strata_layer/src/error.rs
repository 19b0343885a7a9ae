//! Errors surfaced by direct layer graph edits.

/// Errors returned when the caller edits the layer graph out of order.
///
/// Problems found while building a whole graph (missing bases, cycles) are
/// not errors: they mark the affected layers failed and are reported as
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    /// A base layer is not present in the graph yet.
    #[error("layer '{layer}' extends '{base}' which has not been added")]
    MissingBase {
        /// The layer being added.
        layer: String,
        /// The absent base layer.
        base: String,
    },

    /// A layer with this name is already in the graph.
    #[error("layer '{0}' is already in the stack")]
    Duplicate(String),

    /// The layer tries to extend a layer marked final.
    #[error("layer '{layer}' cannot extend final layer '{base}'")]
    ExtendsFinal {
        /// The layer being added.
        layer: String,
        /// The final base layer.
        base: String,
    },

    /// No layer with this name exists.
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),
}
