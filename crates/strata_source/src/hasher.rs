//! Source file hashing into [`SrcRecord`]s.
//!
//! Hashing is the only per-file work the core parallelizes itself: it has no
//! shared state, so each discovered file is read and hashed on the rayon pool.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use strata_common::{ContentHash, Timestamp};
use tracing::warn;

use crate::discover::DiscoveredFile;
use crate::src_record::SrcRecord;

/// Utility for computing content hashes of source files.
pub struct SrcHasher;

impl SrcHasher {
    /// Computes the content hash of a single file.
    pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
        ContentHash::from_file(path)
    }

    /// Computes content hashes for multiple files in parallel.
    ///
    /// Files that cannot be read are skipped; callers treat a missing hash
    /// the same way as a deleted file.
    pub fn hash_files(paths: &[PathBuf]) -> HashMap<PathBuf, ContentHash> {
        paths
            .par_iter()
            .filter_map(|p| Self::hash_file(p).ok().map(|h| (p.clone(), h)))
            .collect()
    }

    /// Builds one record per discovered file of `layer`.
    ///
    /// Unreadable files are logged and dropped. Output order matches input order.
    pub fn records(layer: &str, files: &[DiscoveredFile]) -> Vec<SrcRecord> {
        files
            .par_iter()
            .filter_map(|f| match Self::record(layer, f) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(path = %f.abs_path.display(), error = %e, "skipping unreadable source file");
                    None
                }
            })
            .collect()
    }

    /// Builds the record for a single discovered file.
    pub fn record(layer: &str, file: &DiscoveredFile) -> io::Result<SrcRecord> {
        let hash = Self::hash_file(&file.abs_path)?;
        let modified = Timestamp::modified(&file.abs_path)?;
        Ok(SrcRecord::new(
            layer,
            file.abs_path.clone(),
            file.rel_path.clone(),
            hash,
            modified,
        ))
    }
}
