//! The build-in-progress marker.
//!
//! A pass writes `started <ms>` before touching anything and `completed <ms>`
//! once everything is saved. Finding `started` at the beginning of the next
//! pass means the previous one never finished.

use std::path::{Path, PathBuf};

use strata_common::Timestamp;

use crate::error::CacheError;

/// State the previous pass left the marker in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStatus {
    /// No marker: this build-layer was never built.
    Fresh,
    /// The previous pass completed.
    Completed,
    /// The previous pass started but never completed.
    Interrupted,
}

/// Marker file of one build-layer.
#[derive(Debug, Clone)]
pub struct BuildMarker {
    path: PathBuf,
}

impl BuildMarker {
    /// Marker stored at `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Reads what the previous pass left behind.
    ///
    /// Unreadable or unrecognized content counts as an interrupted build.
    pub fn status(&self) -> MarkerStatus {
        if !self.path.exists() {
            return MarkerStatus::Fresh;
        }
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.starts_with("completed ") => MarkerStatus::Completed,
            Ok(_) => MarkerStatus::Interrupted,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable build marker");
                MarkerStatus::Interrupted
            }
        }
    }

    /// Records the start of a pass and returns the previous status.
    pub fn begin(&self, now: Timestamp) -> Result<MarkerStatus, CacheError> {
        let previous = self.status();
        self.write(&format!("started {}", now.as_millis()))?;
        Ok(previous)
    }

    /// Records that the pass completed.
    pub fn complete(&self, now: Timestamp) -> Result<(), CacheError> {
        self.write(&format!("completed {}", now.as_millis()))
    }

    fn write(&self, text: &str) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        std::fs::write(&self.path, text).map_err(|e| CacheError::io(&self.path, e))
    }
}
