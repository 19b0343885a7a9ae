//! Validated binary artifact storage.
//!
//! Binary state (build-info side data, per-layer type indexes) is written
//! with a header containing magic bytes, a format version, the producing
//! strata version, and a checksum of the payload. Payloads are bincode.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_common::ContentHash;

use crate::error::CacheError;

/// Magic bytes identifying a strata artifact.
const ARTIFACT_MAGIC: [u8; 4] = *b"STRA";

/// Current artifact format version. Increment on breaking changes to
/// the header or payload format.
const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Header prepended to every artifact for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"STRA"`.
    pub magic: [u8; 4],

    /// Artifact format version.
    pub format_version: u32,

    /// Strata version that produced this artifact.
    pub strata_version: String,

    /// Content hash of the payload data.
    pub checksum: ContentHash,
}

/// Reads and writes artifacts under a root directory.
///
/// Keyed artifacts live at `<root>/<subdir>/<key>.<ext>`, see
/// [`ArtifactStore::artifact_path`]; any other path works as well.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    strata_version: String,
}

impl ArtifactStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: &Path, strata_version: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            strata_version: strata_version.to_string(),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path for an artifact with the given key.
    pub fn artifact_path(&self, subdir: &str, key: &str, ext: &str) -> PathBuf {
        self.root.join(subdir).join(format!("{key}.{ext}"))
    }

    /// Writes `data` to `path` behind a validated header, creating parent
    /// directories as needed.
    pub fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }

        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            strata_version: self.strata_version.clone(),
            checksum: ContentHash::from_bytes(data),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);

        std::fs::write(path, &output).map_err(|e| CacheError::io(path, e))
    }

    /// Reads and validates the artifact at `path`.
    ///
    /// Returns `None` if the file is missing or fails validation. Validation
    /// failures are logged.
    pub fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        if !path.exists() {
            return None;
        }
        match self.read_file_checked(path) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable artifact");
                None
            }
        }
    }

    /// Reads the artifact at `path`, reporting why validation failed.
    pub fn read_file_checked(&self, path: &Path) -> Result<Vec<u8>, CacheError> {
        let raw = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if raw.len() < 4 {
            return Err(invalid("file shorter than header length"));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&raw[..4]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if raw.len() < 4 + header_len {
            return Err(invalid("truncated header"));
        }

        let (header, _): (ArtifactHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;

        if header.magic != ARTIFACT_MAGIC {
            return Err(invalid("bad magic bytes"));
        }
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: ARTIFACT_FORMAT_VERSION,
                actual: header.format_version,
            });
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: header.checksum.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(payload.to_vec())
    }

    /// Serializes `value` with bincode and writes it to `path`.
    pub fn write_value<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), CacheError> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(
            |e| CacheError::Serialization {
                reason: e.to_string(),
            },
        )?;
        self.write_file(path, &bytes)
    }

    /// Reads and deserializes a value written by [`ArtifactStore::write_value`].
    pub fn read_value<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let bytes = self.read_file(path)?;
        match bincode::serde::decode_from_slice(&bytes, bincode::config::standard()) {
            Ok((value, _)) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding undecodable artifact");
                None
            }
        }
    }

    /// Removes artifacts in `subdir` whose key is not in `live_keys`.
    ///
    /// Returns the number of files removed.
    pub fn gc(&self, subdir: &str, ext: &str, live_keys: &[&str]) -> Result<usize, CacheError> {
        let dir = self.root.join(subdir);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let entries = std::fs::read_dir(&dir).map_err(|e| CacheError::io(&dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !live_keys.contains(&stem) {
                    std::fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
