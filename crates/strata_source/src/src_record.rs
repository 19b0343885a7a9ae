//! Value type identifying a single source file of a layer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_common::{ContentHash, Timestamp};

/// One source file belonging to a layer.
///
/// Records are plain values: they are produced by discovery, consumed by the
/// staleness check and the file processor, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcRecord {
    /// Name of the layer that owns the file.
    pub layer: String,
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// Path relative to the layer's source root, always `/`-separated.
    pub rel_path: String,
    /// Content hash at discovery time.
    pub hash: ContentHash,
    /// Last-modified time at discovery time.
    pub modified: Timestamp,
}

impl SrcRecord {
    /// Creates a record from its parts.
    pub fn new(
        layer: impl Into<String>,
        abs_path: impl Into<PathBuf>,
        rel_path: impl Into<String>,
        hash: ContentHash,
        modified: Timestamp,
    ) -> Self {
        Self {
            layer: layer.into(),
            abs_path: abs_path.into(),
            rel_path: rel_path.into(),
            hash,
            modified,
        }
    }

    /// Key unique across all layers: `<layer>:<rel_path>`.
    ///
    /// Two layers may contain the same relative path (that is how one layer
    /// overrides another), so the relative path alone is not a key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.layer, self.rel_path)
    }

    /// File extension without the dot, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.rel_path)
            .extension()
            .and_then(|e| e.to_str())
    }

    /// Full type name declared by this file, by path convention.
    ///
    /// `a/b/Widget.sc` in a layer with package prefix `app` declares
    /// `app.a.b.Widget`.
    pub fn type_name(&self, package_prefix: &str) -> String {
        let without_ext = match self.rel_path.rfind('.') {
            Some(dot) if !self.rel_path[dot..].contains('/') => &self.rel_path[..dot],
            _ => self.rel_path.as_str(),
        };
        let dotted = without_ext.replace('/', ".");
        if package_prefix.is_empty() {
            dotted
        } else {
            format!("{package_prefix}.{dotted}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(layer: &str, rel: &str) -> SrcRecord {
        SrcRecord::new(
            layer,
            format!("/proj/{layer}/{rel}"),
            rel,
            ContentHash::from_bytes(rel.as_bytes()),
            Timestamp::from_millis(1),
        )
    }

    #[test]
    fn key_includes_layer() {
        let a = record("base", "app/Main.sc");
        let b = record("override", "app/Main.sc");
        assert_eq!(a.key(), "base:app/Main.sc");
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn extension() {
        assert_eq!(record("l", "a/B.sc").extension(), Some("sc"));
        assert_eq!(record("l", "README").extension(), None);
    }

    #[test]
    fn type_name_with_prefix() {
        let r = record("l", "ui/Widget.sc");
        assert_eq!(r.type_name("app"), "app.ui.Widget");
        assert_eq!(r.type_name(""), "ui.Widget");
    }

    #[test]
    fn type_name_dot_in_directory() {
        let r = record("l", "v1.2/Thing");
        assert_eq!(r.type_name(""), "v1.2.Thing");
    }

    #[test]
    fn serde_roundtrip() {
        let r = record("base", "app/Main.sc");
        let json = serde_json::to_string(&r).unwrap();
        let back: SrcRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
