//! One indexed type declaration.

use serde::{Deserialize, Serialize};
use strata_common::Timestamp;

/// A type declared by one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeIndexEntry {
    /// Full type name.
    pub type_name: String,
    /// Full names of the types it extends or implements.
    pub base_types: Vec<String>,
    /// Declaring file, relative to the layer's source root.
    pub file: String,
    /// Last-modified time of the declaring file when indexed.
    pub modified: Timestamp,
    /// Declaring layer.
    pub layer: String,
    /// Declares the layer itself rather than an ordinary type.
    pub is_layer_type: bool,
    /// Nested inside another declaration of the same file.
    pub is_inner: bool,
}

impl TypeIndexEntry {
    /// Creates an entry for a top-level type with no bases.
    pub fn new(
        type_name: impl Into<String>,
        layer: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            base_types: Vec::new(),
            file: file.into(),
            modified: Timestamp::ZERO,
            layer: layer.into(),
            is_layer_type: false,
            is_inner: false,
        }
    }

    /// Sets the base types.
    pub fn with_bases<I, S>(mut self, bases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_types = bases.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the last-modified time.
    pub fn modified_at(mut self, modified: Timestamp) -> Self {
        self.modified = modified;
        self
    }

    /// Marks the entry as an inner declaration.
    pub fn inner(mut self) -> Self {
        self.is_inner = true;
        self
    }

    /// Marks the entry as the layer's own declaration.
    pub fn layer_type(mut self) -> Self {
        self.is_layer_type = true;
        self
    }

    /// Simple name: the part after the last `.`.
    pub fn simple_name(&self) -> &str {
        self.type_name
            .rsplit_once('.')
            .map_or(self.type_name.as_str(), |(_, simple)| simple)
    }
}
