//! Configuration types deserialized from `strata.toml` and `layer.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `strata.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata and directory layout.
    pub project: ProjectMeta,
    /// Build settings shared by every target.
    #[serde(default)]
    pub build: BuildSettings,
    /// Named build targets (e.g. "server", "browser").
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

/// Core project metadata required in every `strata.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    #[serde(default)]
    pub version: String,
    /// Directories searched for layer definitions, relative to the project root.
    #[serde(default = "default_layer_path")]
    pub layer_path: Vec<String>,
    /// Root of all build-layer output directories.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
    /// Directory holding the persistent type index.
    #[serde(default = "default_index_dir")]
    pub index_dir: String,
}

fn default_layer_path() -> Vec<String> {
    vec!["layers".to_string()]
}

fn default_build_dir() -> String {
    "build".to_string()
}

fn default_index_dir() -> String {
    ".strata-index".to_string()
}

/// Settings controlling every build pass.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSettings {
    /// Runtimes the project builds for (e.g. "java", "js").
    #[serde(default = "default_runtimes")]
    pub runtimes: Vec<String>,
    /// Named processes within runtimes (e.g. "server", "client").
    #[serde(default)]
    pub processes: Vec<String>,
    /// Number of errors after which the build stops scheduling new files.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: usize,
    /// Slack applied to last-modified comparisons for coarse filesystem clocks.
    #[serde(default = "default_mtime_slack_ms")]
    pub mtime_slack_ms: u64,
    /// Extensions of files treated as layer sources.
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
}

fn default_runtimes() -> Vec<String> {
    vec!["java".to_string()]
}

fn default_error_threshold() -> usize {
    100
}

fn default_mtime_slack_ms() -> u64 {
    2_000
}

fn default_source_extensions() -> Vec<String> {
    vec!["sc".to_string(), "java".to_string()]
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            runtimes: default_runtimes(),
            processes: Vec::new(),
            error_threshold: default_error_threshold(),
            mtime_slack_ms: default_mtime_slack_ms(),
            source_extensions: default_source_extensions(),
        }
    }
}

/// A named target: one runtime and, optionally, one process within it.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Runtime name (must be listed in `build.runtimes`).
    pub runtime: String,
    /// Process name within the runtime.
    #[serde(default)]
    pub process: Option<String>,
}

/// Broad category of a layer, used when ordering layers of equal priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Shared framework code; sorts before application layers.
    Framework,
    /// Ordinary application code.
    #[default]
    Application,
    /// Configuration for the layers it extends; sorts right after them.
    Config,
}

/// Affinity of a layer for runtimes or for processes (same shape for both).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AffinityDef {
    /// Only these names are enabled.
    #[serde(default)]
    pub include: Vec<String>,
    /// These names are disabled.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// The layer belongs to exactly this name.
    #[serde(default)]
    pub bound: Option<String>,
    /// Layers extending this one inherit this affinity.
    #[serde(default)]
    pub export: bool,
}

/// A layer definition parsed from `layer.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerDef {
    /// Layer name; defaults to the directory path under the layer path.
    #[serde(default)]
    pub name: Option<String>,
    /// Package prefix applied to every type declared by the layer.
    #[serde(default)]
    pub package: String,
    /// Base layers this layer extends.
    #[serde(default)]
    pub extends: Vec<String>,
    /// Explicit ordering priority; lower sorts earlier.
    #[serde(default)]
    pub priority: i32,
    /// Layer category.
    #[serde(default)]
    pub kind: LayerKind,
    /// Sources are interpreted at runtime rather than compiled.
    #[serde(default)]
    pub dynamic: bool,
    /// The layer only contributes compiled artifacts, no sources.
    #[serde(default)]
    pub compiled_only: bool,
    /// The layer is compiled into its own build-layer directory.
    #[serde(default)]
    pub build_separate: bool,
    /// No layer may extend this one.
    #[serde(default, rename = "final")]
    pub final_layer: bool,
    /// Hidden from tooling views.
    #[serde(default)]
    pub hidden: bool,
    /// Explicitly disabled by the user.
    #[serde(default)]
    pub disabled: bool,
    /// Excluded from this project's stack.
    #[serde(default)]
    pub excluded: bool,
    /// Contributes annotations only.
    #[serde(default)]
    pub annotation_only: bool,
    /// Runtime affinity.
    #[serde(default)]
    pub runtimes: AffinityDef,
    /// Process affinity.
    #[serde(default)]
    pub processes: AffinityDef,
    /// Source roots relative to the layer directory.
    #[serde(default = "default_source_roots")]
    pub source_roots: Vec<String>,
}

fn default_source_roots() -> Vec<String> {
    vec![".".to_string()]
}
