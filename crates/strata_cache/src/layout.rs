//! File locations of one build-layer's persisted state.

use std::path::{Path, PathBuf};

/// Directory under a build-layer's output holding its state files.
pub const STATE_DIR: &str = ".strata";

/// Paths of every state file kept for one build-layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayerPaths {
    output_dir: PathBuf,
}

impl BuildLayerPaths {
    /// Paths for the build-layer `name` under `build_dir`.
    pub fn new(build_dir: &Path, name: &str) -> Self {
        Self {
            output_dir: build_dir.join(name),
        }
    }

    /// Directory receiving generated files.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory holding state files.
    pub fn state_dir(&self) -> PathBuf {
        self.output_dir.join(STATE_DIR)
    }

    /// Source index of generated files.
    pub fn src_index(&self) -> PathBuf {
        self.state_dir().join("buildSrcIndex.json")
    }

    /// Record of the last build pass.
    pub fn last_build(&self) -> PathBuf {
        self.state_dir().join("lastBuild.json")
    }

    /// Dynamic-type index.
    pub fn dynamic_types(&self) -> PathBuf {
        self.state_dir().join("dynTypeIndex.json")
    }

    /// Build-in-progress marker.
    pub fn marker(&self) -> PathBuf {
        self.state_dir().join("buildInProgress")
    }

    /// Text build-info file.
    pub fn build_info(&self) -> PathBuf {
        self.state_dir().join("buildInfo.toml")
    }

    /// Binary build-info side data.
    pub fn side_data(&self) -> PathBuf {
        self.state_dir().join("buildInfo.side")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_layer_names_become_nested_dirs() {
        let paths = BuildLayerPaths::new(Path::new("/p/build"), "app/main");
        assert_eq!(paths.output_dir(), Path::new("/p/build/app/main"));
        assert_eq!(
            paths.src_index(),
            PathBuf::from("/p/build/app/main/.strata/buildSrcIndex.json")
        );
        assert_eq!(
            paths.marker(),
            PathBuf::from("/p/build/app/main/.strata/buildInProgress")
        );
    }
}
