//! Binary side data kept next to the text build info.
//!
//! Code generators stash arbitrary serializable values here (lists of
//! synchronized types, resource tables) that are too bulky or too
//! structured for the TOML file. Each value is bincode-encoded on `put`,
//! and the whole map is written as one validated artifact.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_cache::ArtifactStore;

use crate::error::BuildInfoError;

/// Named binary values of one build-layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideData {
    values: BTreeMap<String, Vec<u8>>,
}

impl SideData {
    /// Creates empty side data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), BuildInfoError> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(
            |e| BuildInfoError::Serialization {
                reason: e.to_string(),
            },
        )?;
        self.values.insert(key.to_string(), bytes);
        Ok(())
    }

    /// Decodes the value under `key`; `None` if absent or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.values.get(key)?;
        match bincode::serde::decode_from_slice(bytes, bincode::config::standard()) {
            Ok((value, _)) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "side data value does not decode");
                None
            }
        }
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns `true` if no value is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Loads side data from `path`; `None` if missing or invalid.
    pub fn load(store: &ArtifactStore, path: &Path) -> Option<Self> {
        store.read_value(path)
    }

    /// Writes the side data to `path`.
    pub fn save(&self, store: &ArtifactStore, path: &Path) -> Result<(), BuildInfoError> {
        store.write_value(path, self)?;
        Ok(())
    }
}
