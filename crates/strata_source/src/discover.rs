//! Discovery of source files under a layer's source roots.

use std::io;
use std::path::{Path, PathBuf};

/// A file found under a source root, before hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// Path relative to the source root, `/`-separated.
    pub rel_path: String,
}

/// Discovers source files with one of the given extensions under `root` (recursive).
///
/// Hidden entries (names starting with `.`) are skipped so that a layer's
/// own build output directories are never picked up as sources. Results are
/// sorted by relative path. A missing root yields an empty list.
pub fn discover_sources(root: &Path, extensions: &[&str]) -> io::Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    if !root.is_dir() {
        return Ok(files);
    }
    walk_dir(root, root, extensions, &mut files)?;
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn walk_dir(
    root: &Path,
    dir: &Path,
    extensions: &[&str],
    files: &mut Vec<DiscoveredFile>,
) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            walk_dir(root, &path, extensions, files)?;
        } else if has_extension(&path, extensions) {
            files.push(DiscoveredFile {
                rel_path: relative_slash_path(root, &path),
                abs_path: path,
            });
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.contains(&ext))
}

/// Returns `path` relative to `root` with `/` separators on every platform.
pub fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
