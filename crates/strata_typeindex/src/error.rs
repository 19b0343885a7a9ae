//! Error types for type index operations.

use std::path::PathBuf;

use strata_cache::CacheError;

/// Errors raised by type index mutation and persistence.
#[derive(Debug, thiserror::Error)]
pub enum TypeIndexError {
    /// An I/O error occurred while writing an index file.
    #[error("type index I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A value could not be serialized.
    #[error("type index serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// The layer has no index in this set.
    #[error("no type index for layer '{0}'")]
    UnknownLayer(String),

    /// The layer does not declare the type.
    #[error("layer '{layer}' does not declare type '{type_name}'")]
    UnknownType {
        /// The layer that was searched.
        layer: String,
        /// The missing type.
        type_name: String,
    },

    /// The new name is already declared in the layer.
    #[error("layer '{layer}' already declares type '{type_name}'")]
    DuplicateType {
        /// The layer holding both names.
        layer: String,
        /// The clashing name.
        type_name: String,
    },

    /// Writing a binary index artifact failed.
    #[error(transparent)]
    Artifact(#[from] CacheError),
}
