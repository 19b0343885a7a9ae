//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{AffinityDef, LayerDef, ProjectConfig};
use std::collections::HashSet;
use std::path::Path;

/// Name of the project configuration file.
pub const PROJECT_FILE: &str = "strata.toml";

/// Name of the per-layer definition file.
pub const LAYER_FILE: &str = "layer.toml";

/// Loads and validates `<project_dir>/strata.toml`.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = project_dir.join(PROJECT_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io { path, source: e })?;
    load_config_from_str(&content)
}

/// Parses and validates a project configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads and validates a `layer.toml` file.
pub fn load_layer_def(path: &Path) -> Result<LayerDef, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_layer_def_from_str(&content)
}

/// Parses and validates a layer definition from a string.
pub fn load_layer_def_from_str(content: &str) -> Result<LayerDef, ConfigError> {
    let def: LayerDef =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_layer_def(&def)?;
    Ok(def)
}

fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.project.layer_path.is_empty() {
        return Err(ConfigError::MissingField("project.layer_path".to_string()));
    }
    if config.build.error_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "build.error_threshold must be greater than zero".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for runtime in &config.build.runtimes {
        if !seen.insert(runtime) {
            return Err(ConfigError::ValidationError(format!(
                "runtime '{runtime}' listed twice in build.runtimes"
            )));
        }
    }
    for (name, target) in &config.targets {
        if !config.build.runtimes.contains(&target.runtime) {
            return Err(ConfigError::ValidationError(format!(
                "target '{name}' uses runtime '{}' which is not in build.runtimes",
                target.runtime
            )));
        }
    }
    Ok(())
}

fn validate_layer_def(def: &LayerDef) -> Result<(), ConfigError> {
    if let Some(name) = &def.name {
        if name.is_empty() {
            return Err(ConfigError::MissingField("name".to_string()));
        }
        if def.extends.iter().any(|b| b == name) {
            return Err(ConfigError::ValidationError(format!(
                "layer '{name}' extends itself"
            )));
        }
    }
    let mut seen = HashSet::new();
    for base in &def.extends {
        if !seen.insert(base) {
            return Err(ConfigError::ValidationError(format!(
                "base layer '{base}' listed twice in extends"
            )));
        }
    }
    validate_affinity("runtimes", &def.runtimes)?;
    validate_affinity("processes", &def.processes)?;
    Ok(())
}

fn validate_affinity(section: &str, affinity: &AffinityDef) -> Result<(), ConfigError> {
    if let Some(name) = affinity
        .include
        .iter()
        .find(|n| affinity.exclude.contains(n))
    {
        return Err(ConfigError::ValidationError(format!(
            "'{name}' is both included and excluded in [{section}]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LayerKind;

    #[test]
    fn parse_minimal_config() {
        let config = load_config_from_str(
            r#"
[project]
name = "todo"
"#,
        )
        .unwrap();
        assert_eq!(config.project.name, "todo");
        assert_eq!(config.project.layer_path, vec!["layers"]);
        assert_eq!(config.project.build_dir, "build");
        assert_eq!(config.build.runtimes, vec!["java"]);
        assert_eq!(config.build.error_threshold, 100);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let config = load_config_from_str(
            r#"
[project]
name = "todo"
version = "1.0"
layer_path = ["layers", "vendor/layers"]
build_dir = "out"
index_dir = "out/index"

[build]
runtimes = ["java", "js"]
processes = ["server", "client"]
error_threshold = 5
mtime_slack_ms = 0
source_extensions = ["sc"]

[targets.server]
runtime = "java"
process = "server"

[targets.browser]
runtime = "js"
"#,
        )
        .unwrap();
        assert_eq!(config.project.layer_path.len(), 2);
        assert_eq!(config.build.runtimes, vec!["java", "js"]);
        assert_eq!(config.build.error_threshold, 5);
        assert_eq!(config.targets["server"].process.as_deref(), Some("server"));
        assert!(config.targets["browser"].process.is_none());
    }

    #[test]
    fn missing_name_errors() {
        let err = load_config_from_str("[project]\nname = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn zero_threshold_errors() {
        let err = load_config_from_str(
            "[project]\nname = \"p\"\n[build]\nerror_threshold = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn duplicate_runtime_errors() {
        let err = load_config_from_str(
            "[project]\nname = \"p\"\n[build]\nruntimes = [\"js\", \"js\"]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn target_with_unknown_runtime_errors() {
        let err = load_config_from_str(
            "[project]\nname = \"p\"\n[targets.t]\nruntime = \"android\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not toml {{{").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn parse_layer_def() {
        let def = load_layer_def_from_str(
            r#"
name = "js.prebuild"
package = "sc.js"
extends = ["sys.std"]
priority = -1
kind = "framework"
build_separate = true
final = false

[runtimes]
bound = "js"
export = true

[processes]
exclude = ["server"]
"#,
        )
        .unwrap();
        assert_eq!(def.name.as_deref(), Some("js.prebuild"));
        assert_eq!(def.kind, LayerKind::Framework);
        assert!(def.build_separate);
        assert_eq!(def.runtimes.bound.as_deref(), Some("js"));
        assert!(def.runtimes.export);
        assert_eq!(def.processes.exclude, vec!["server"]);
        assert_eq!(def.source_roots, vec!["."]);
    }

    #[test]
    fn layer_def_defaults() {
        let def = load_layer_def_from_str("").unwrap();
        assert!(def.name.is_none());
        assert!(def.extends.is_empty());
        assert_eq!(def.kind, LayerKind::Application);
        assert!(!def.final_layer);
    }

    #[test]
    fn layer_extending_itself_errors() {
        let err = load_layer_def_from_str("name = \"a\"\nextends = [\"a\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn duplicate_base_errors() {
        let err = load_layer_def_from_str("extends = [\"a\", \"a\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn include_and_exclude_same_name_errors() {
        let err = load_layer_def_from_str(
            "[runtimes]\ninclude = [\"js\"]\nexclude = [\"js\"]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_layer_def_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LAYER_FILE);
        std::fs::write(&path, "package = \"app\"\n").unwrap();
        let def = load_layer_def(&path).unwrap();
        assert_eq!(def.package, "app");
    }
}
