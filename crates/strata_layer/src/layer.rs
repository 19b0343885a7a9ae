//! The layer value type and its flags.

use std::path::{Path, PathBuf};

use strata_config::{AffinityDef, LayerDef, LayerKind};

/// Boolean switches declared in a layer definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerFlags {
    /// Sources are interpreted at runtime.
    pub dynamic: bool,
    /// Only compiled artifacts, no sources.
    pub compiled_only: bool,
    /// Compiled into its own build-layer directory.
    pub build_separate: bool,
    /// Cannot be extended.
    pub final_layer: bool,
    /// Hidden from tooling views.
    pub hidden: bool,
    /// Disabled by the user.
    pub disabled: bool,
    /// Excluded from the project.
    pub excluded: bool,
    /// Contributes annotations only.
    pub annotation_only: bool,
}

/// Runtime or process affinity of a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerAffinity {
    /// Only these names are enabled.
    pub include: Vec<String>,
    /// These names are disabled.
    pub exclude: Vec<String>,
    /// Bound to exactly this name.
    pub bound: Option<String>,
    /// Extending layers inherit this affinity.
    pub export: bool,
}

impl LayerAffinity {
    /// Affinity enabling only `name` and exporting it.
    pub fn bound_to(name: impl Into<String>) -> Self {
        Self {
            bound: Some(name.into()),
            export: true,
            ..Self::default()
        }
    }

    /// Returns `true` if the layer itself says anything about this axis.
    pub fn is_explicit(&self) -> bool {
        self.bound.is_some() || !self.include.is_empty() || !self.exclude.is_empty()
    }
}

impl From<&AffinityDef> for LayerAffinity {
    fn from(def: &AffinityDef) -> Self {
        Self {
            include: def.include.clone(),
            exclude: def.exclude.clone(),
            bound: def.bound.clone(),
            export: def.export,
        }
    }
}

/// Lifecycle of a layer within one system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerState {
    /// Definition loaded, bases not yet resolved.
    Defined,
    /// Bases resolved and affinity computed.
    Initialized,
    /// Source tree indexed.
    Started,
    /// Initialization failed; the layer is kept out of the active stack.
    InitFailed {
        /// Why initialization failed.
        reason: String,
    },
}

/// A named unit of declarations.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Unique layer name.
    pub name: String,
    /// Ordinal position in the active stack.
    pub position: usize,
    /// Package prefix for declared types.
    pub package: String,
    /// Names of the base layers this layer extends.
    pub extends: Vec<String>,
    /// Explicit ordering priority; lower sorts earlier.
    pub priority: i32,
    /// Layer category.
    pub kind: LayerKind,
    /// Declared flags.
    pub flags: LayerFlags,
    /// Runtime affinity.
    pub runtimes: LayerAffinity,
    /// Process affinity.
    pub processes: LayerAffinity,
    /// Directory holding the layer definition.
    pub dir: PathBuf,
    /// Absolute source roots.
    pub source_roots: Vec<PathBuf>,
    /// Lifecycle state.
    pub state: LayerState,
    /// Directory of the definition that superseded this one, if any.
    pub replaced_by: Option<PathBuf>,
    /// Order in which the layer was discovered; breaks sort ties.
    pub discovery_index: usize,
}

impl Layer {
    /// Creates an application layer with no bases rooted at `dir = name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            dir: PathBuf::from(&name),
            source_roots: vec![PathBuf::from(&name)],
            name,
            position: 0,
            package: String::new(),
            extends: Vec::new(),
            priority: 0,
            kind: LayerKind::Application,
            flags: LayerFlags::default(),
            runtimes: LayerAffinity::default(),
            processes: LayerAffinity::default(),
            state: LayerState::Defined,
            replaced_by: None,
            discovery_index: 0,
        }
    }

    /// Builds a layer from its parsed definition file.
    pub fn from_def(def: &LayerDef, default_name: &str, dir: &Path) -> Self {
        let name = def.name.clone().unwrap_or_else(|| default_name.to_string());
        Self {
            name,
            position: 0,
            package: def.package.clone(),
            extends: def.extends.clone(),
            priority: def.priority,
            kind: def.kind,
            flags: LayerFlags {
                dynamic: def.dynamic,
                compiled_only: def.compiled_only,
                build_separate: def.build_separate,
                final_layer: def.final_layer,
                hidden: def.hidden,
                disabled: def.disabled,
                excluded: def.excluded,
                annotation_only: def.annotation_only,
            },
            runtimes: LayerAffinity::from(&def.runtimes),
            processes: LayerAffinity::from(&def.processes),
            dir: dir.to_path_buf(),
            source_roots: def.source_roots.iter().map(|r| dir.join(r)).collect(),
            state: LayerState::Defined,
            replaced_by: None,
            discovery_index: 0,
        }
    }

    /// Adds a base layer.
    pub fn extending(mut self, base: impl Into<String>) -> Self {
        self.extends.push(base.into());
        self
    }

    /// Sets the explicit priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the layer kind.
    pub fn with_kind(mut self, kind: LayerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the flags.
    pub fn with_flags(mut self, flags: LayerFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the runtime affinity.
    pub fn with_runtimes(mut self, affinity: LayerAffinity) -> Self {
        self.runtimes = affinity;
        self
    }

    /// Sets the process affinity.
    pub fn with_processes(mut self, affinity: LayerAffinity) -> Self {
        self.processes = affinity;
        self
    }

    /// Sets the package prefix.
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Sets the source roots.
    pub fn with_source_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.source_roots = roots;
        self
    }

    /// Returns `true` if initialization failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, LayerState::InitFailed { .. })
    }

    /// Returns `true` if the user switched the layer off.
    pub fn is_switched_off(&self) -> bool {
        self.flags.disabled || self.flags.excluded
    }

    /// Class rank used under equal explicit priority.
    ///
    /// Config layers rank first so they are emitted as soon as the layers
    /// they configure are placed.
    pub fn class_rank(&self) -> i64 {
        match self.kind {
            LayerKind::Config => 0,
            _ if self.flags.compiled_only => 1,
            LayerKind::Framework => 2,
            LayerKind::Application => 3,
        }
    }

    /// Sort key among layers whose bases are all placed; lower sorts earlier.
    pub fn sort_priority(&self) -> i64 {
        i64::from(self.priority) * 8 + self.class_rank()
    }
}
