//! Error types for the build pass.

use std::path::PathBuf;

use strata_buildinfo::BuildInfoError;
use strata_cache::CacheError;
use strata_common::InternalError;
use strata_config::ConfigError;
use strata_layer::LayerError;
use strata_typeindex::TypeIndexError;

/// Errors that stop a system from opening or a pass from saving its state.
///
/// Problems with the project itself (bad layers, failing files, drifted
/// outputs) are diagnostics, not errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Writing a generated file or creating an output directory failed.
    #[error("build I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// No runtime processor exists for the target's runtime.
    #[error("unknown runtime '{0}'")]
    UnknownRuntime(String),

    /// The named build-layer is not part of this system.
    #[error("unknown build-layer '{0}'")]
    UnknownBuildLayer(String),

    /// The project configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A layer could not be added, removed or updated.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// Incremental state could not be saved.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Build info could not be saved.
    #[error(transparent)]
    BuildInfo(#[from] BuildInfoError),

    /// The type index could not be saved or updated.
    #[error(transparent)]
    TypeIndex(#[from] TypeIndexError),

    /// An internal invariant was broken.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_runtime_display() {
        assert_eq!(
            BuildError::UnknownRuntime("wasm".to_string()).to_string(),
            "unknown runtime 'wasm'"
        );
    }

    #[test]
    fn cache_error_is_transparent() {
        let err: BuildError = CacheError::Io {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        }
        .into();
        assert!(err.to_string().contains("disk full"));
    }
}
