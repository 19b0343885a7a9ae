//! Error types for build-info persistence.

use std::path::PathBuf;

use strata_cache::CacheError;

/// Errors raised while saving build info or side data.
#[derive(Debug, thiserror::Error)]
pub enum BuildInfoError {
    /// An I/O error occurred while writing the text file.
    #[error("build info I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A value could not be serialized.
    #[error("build info serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// The named build-layer has no metadata in this store.
    #[error("unknown build-layer '{0}'")]
    UnknownBuildLayer(String),

    /// Writing the binary side data failed.
    #[error(transparent)]
    Artifact(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_display() {
        let err = BuildInfoError::Serialization {
            reason: "unsupported None value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "build info serialization error: unsupported None value"
        );
    }
}
