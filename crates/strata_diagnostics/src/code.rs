//! Diagnostic codes grouped by the kind of problem they report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a diagnostic code, determining its prefix letter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Layer graph problems (missing or cyclic base layers), prefixed with `G`.
    Graph,
    /// Persisted index or metadata that had to be discarded, prefixed with `I`.
    Index,
    /// Generated files that no longer match what the build wrote, prefixed with `D`.
    Drift,
    /// Inconsistent build metadata, prefixed with `M`.
    Metadata,
    /// File processing failures, prefixed with `B`.
    Build,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Graph => 'G',
            Category::Index => 'I',
            Category::Drift => 'D',
            Category::Metadata => 'M',
            Category::Build => 'B',
        }
    }
}

/// A category prefix plus a number, displayed as e.g. `G001`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}
