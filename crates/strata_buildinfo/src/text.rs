//! TOML persistence of [`BuildInfo`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BuildInfoError;
use crate::facts::{ExternalDynType, Fact, MainInit, PackagingDirective, TestInstance, TypeGroupMember};
use crate::info::BuildInfo;

/// Current `buildInfo.toml` format version.
pub(crate) const BUILD_INFO_FORMAT_VERSION: u32 = 1;

/// On-disk shape: one array of tables per fact kind.
#[derive(Debug, Serialize, Deserialize)]
struct BuildInfoFile {
    format_version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    main_init: Vec<MainInit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    test: Vec<TestInstance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    packaging: Vec<PackagingDirective>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    type_group: Vec<TypeGroupMember>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    external_dyn_type: Vec<ExternalDynType>,
}

impl From<&BuildInfo> for BuildInfoFile {
    fn from(info: &BuildInfo) -> Self {
        Self {
            format_version: BUILD_INFO_FORMAT_VERSION,
            main_init: info.main_inits.values().cloned().collect(),
            test: info.tests.values().cloned().collect(),
            packaging: info.packaging.values().cloned().collect(),
            type_group: info.type_groups.values().cloned().collect(),
            external_dyn_type: info.external_dyn_types.values().cloned().collect(),
        }
    }
}

impl From<BuildInfoFile> for BuildInfo {
    fn from(file: BuildInfoFile) -> Self {
        let mut info = BuildInfo::new();
        let facts = file
            .main_init
            .into_iter()
            .map(Fact::MainInit)
            .chain(file.test.into_iter().map(Fact::Test))
            .chain(file.packaging.into_iter().map(Fact::Packaging))
            .chain(file.type_group.into_iter().map(Fact::TypeGroup))
            .chain(file.external_dyn_type.into_iter().map(Fact::ExternalDyn));
        for fact in facts {
            info.add(fact);
        }
        info
    }
}

/// Parses build info text; `None` if unparsable or from another version.
pub(crate) fn parse(content: &str, path: &Path) -> Option<BuildInfo> {
    let file: BuildInfoFile = match toml::from_str(content) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "discarding corrupt build info");
            return None;
        }
    };
    if file.format_version != BUILD_INFO_FORMAT_VERSION {
        tracing::warn!(
            path = %path.display(),
            found = file.format_version,
            "discarding build info from another format version"
        );
        return None;
    }
    Some(file.into())
}

/// Loads build info from `path`; `None` if missing or invalid.
pub(crate) fn load(path: &Path) -> Option<BuildInfo> {
    let content = std::fs::read_to_string(path).ok()?;
    parse(&content, path)
}

/// Renders build info as TOML.
pub(crate) fn render(info: &BuildInfo) -> Result<String, BuildInfoError> {
    toml::to_string_pretty(&BuildInfoFile::from(info)).map_err(|e| BuildInfoError::Serialization {
        reason: e.to_string(),
    })
}

/// Writes build info to `path`, creating parent directories.
pub(crate) fn save(info: &BuildInfo, path: &Path) -> Result<(), BuildInfoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BuildInfoError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let text = render(info)?;
    std::fs::write(path, text).map_err(|e| BuildInfoError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildInfo {
        let mut info = BuildInfo::new();
        info.add(Fact::MainInit(MainInit {
            type_name: "app.Main".into(),
            launcher_name: "runMain".into(),
            stop_hook: None,
            layer: "app".into(),
        }));
        info.add(Fact::Packaging(PackagingDirective {
            jar_name: "app.jar".into(),
            main_class: Some("app.Main".into()),
            packages: vec!["app".into()],
            declared_by: "app.Main".into(),
        }));
        let mut stub = ExternalDynType::used_by("ext.Widget", "app.Main");
        stub.mark_generated();
        info.add(Fact::ExternalDyn(stub));
        info
    }

    #[test]
    fn written_text_reloads_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".strata/buildInfo.toml");
        let info = sample();
        save(&info, &path).unwrap();
        assert_eq!(load(&path).unwrap(), info);
    }

    #[test]
    fn text_is_human_readable_tables() {
        let text = render(&sample()).unwrap();
        assert!(text.starts_with("format_version = 1"));
        assert!(text.contains("[[main_init]]"));
        assert!(text.contains("launcher_name = \"runMain\""));
        assert!(!text.contains("[[test]]"));
    }

    #[test]
    fn corrupt_or_foreign_text_is_discarded() {
        let path = Path::new("buildInfo.toml");
        assert!(parse("main_init = 3 [[", path).is_none());
        assert!(parse("format_version = 7", path).is_none());
        assert!(parse("format_version = 1", path).unwrap().is_empty());
    }
}
