//! Target resolution: picking the runtime and process a system builds for.

use crate::error::ConfigError;
use crate::types::ProjectConfig;

/// The runtime and optional process one layered system is built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildTarget {
    /// Target name (the runtime name for implicit targets).
    pub name: String,
    /// Runtime name, e.g. "java" or "js".
    pub runtime: String,
    /// Process name within the runtime, if the target names one.
    pub process: Option<String>,
}

impl BuildTarget {
    /// Creates a target for a runtime with no specific process.
    pub fn runtime(runtime: impl Into<String>) -> Self {
        let runtime = runtime.into();
        Self {
            name: runtime.clone(),
            runtime,
            process: None,
        }
    }

    /// Creates a target for a process within a runtime.
    pub fn process(runtime: impl Into<String>, process: impl Into<String>) -> Self {
        let process = process.into();
        Self {
            name: process.clone(),
            runtime: runtime.into(),
            process: Some(process),
        }
    }
}

/// Resolves a named target from `[targets.<name>]`.
pub fn resolve_target(config: &ProjectConfig, name: &str) -> Result<BuildTarget, ConfigError> {
    let target = config
        .targets
        .get(name)
        .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))?;
    Ok(BuildTarget {
        name: name.to_string(),
        runtime: target.runtime.clone(),
        process: target.process.clone(),
    })
}

/// Returns every target the project builds.
///
/// Explicit `[targets]` win; without them there is one implicit target per
/// runtime in `build.runtimes`.
pub fn default_targets(config: &ProjectConfig) -> Vec<BuildTarget> {
    if config.targets.is_empty() {
        return config
            .build
            .runtimes
            .iter()
            .map(BuildTarget::runtime)
            .collect();
    }
    config
        .targets
        .iter()
        .map(|(name, t)| BuildTarget {
            name: name.clone(),
            runtime: t.runtime.clone(),
            process: t.process.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn resolve_named_target() {
        let config = load_config_from_str(
            r#"
[project]
name = "p"
[build]
runtimes = ["java", "js"]
[targets.server]
runtime = "java"
process = "server"
"#,
        )
        .unwrap();
        let t = resolve_target(&config, "server").unwrap();
        assert_eq!(t, BuildTarget::process("java", "server"));
    }

    #[test]
    fn unknown_target_errors() {
        let config = load_config_from_str("[project]\nname = \"p\"\n").unwrap();
        let err = resolve_target(&config, "nope").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTarget(_)));
    }

    #[test]
    fn implicit_targets_per_runtime() {
        let config = load_config_from_str(
            "[project]\nname = \"p\"\n[build]\nruntimes = [\"java\", \"js\"]\n",
        )
        .unwrap();
        let targets = default_targets(&config);
        assert_eq!(
            targets,
            vec![BuildTarget::runtime("java"), BuildTarget::runtime("js")]
        );
    }
}
