//! The fact kinds recorded in build info.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strata_common::hash::hex;
use strata_common::{ContentHash, Timestamp};

/// A registered entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainInit {
    /// Full name of the type declaring the entry point.
    pub type_name: String,
    /// Name of the generated launcher.
    pub launcher_name: String,
    /// Method run on shutdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_hook: Option<String>,
    /// Layer declaring the type.
    pub layer: String,
}

/// A registered test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInstance {
    /// Full name of the test type.
    pub type_name: String,
    /// Kind of test runner, e.g. "unit" or "ui".
    pub test_kind: String,
}

/// Instructions for packaging compiled output into an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingDirective {
    /// Archive file name.
    pub jar_name: String,
    /// Main class written into the archive manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    /// Packages included in the archive.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Type that declared the directive.
    pub declared_by: String,
}

/// Membership of a type in a named group consulted by code generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeGroupMember {
    /// Group name.
    pub group: String,
    /// Full name of the member type.
    pub type_name: String,
    /// Layer declaring the member type.
    pub layer: String,
}

/// A type referenced reflectively from outside the compiled graph.
///
/// The reverse dependencies are the types that call into or bind against
/// it. The stub is regenerated when the set changes or the compiled
/// artifact is older than the stub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDynType {
    /// Full name of the external type.
    pub type_name: String,
    /// Types that use it.
    #[serde(default)]
    pub reverse_deps: BTreeSet<String>,
    /// Record hash at the time the stub was last generated.
    #[serde(
        default,
        with = "hex::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub generated_hash: Option<ContentHash>,
}

impl ExternalDynType {
    /// Creates a stub record used by `caller`.
    pub fn used_by(type_name: impl Into<String>, caller: impl Into<String>) -> Self {
        let mut reverse_deps = BTreeSet::new();
        reverse_deps.insert(caller.into());
        Self {
            type_name: type_name.into(),
            reverse_deps,
            generated_hash: None,
        }
    }

    /// Hash of the record's content (name and reverse dependencies).
    pub fn record_hash(&self) -> ContentHash {
        let mut text = self.type_name.clone();
        for dep in &self.reverse_deps {
            text.push('\n');
            text.push_str(dep);
        }
        ContentHash::from_bytes(text.as_bytes())
    }

    /// Returns `true` if the stub's generated source must be rewritten.
    ///
    /// That is the case when the record changed since generation, when
    /// either file is missing, or when the compiled artifact is older than
    /// the stub source.
    pub fn needs_regeneration(
        &self,
        stub_modified: Option<Timestamp>,
        compiled_modified: Option<Timestamp>,
    ) -> bool {
        if self.generated_hash != Some(self.record_hash()) {
            return true;
        }
        match (stub_modified, compiled_modified) {
            (Some(stub), Some(compiled)) => compiled < stub,
            _ => true,
        }
    }

    /// Records that the stub was generated from the current record.
    pub fn mark_generated(&mut self) {
        self.generated_hash = Some(self.record_hash());
    }
}

/// Any fact, as accepted by the add operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    /// An entry point.
    MainInit(MainInit),
    /// A test registration.
    Test(TestInstance),
    /// A packaging directive.
    Packaging(PackagingDirective),
    /// A type-group membership.
    TypeGroup(TypeGroupMember),
    /// A use of an external dynamic type.
    ExternalDyn(ExternalDynType),
}

impl Fact {
    /// De-duplication key, unique within the fact's kind.
    pub fn key(&self) -> String {
        match self {
            Fact::MainInit(f) => f.type_name.clone(),
            Fact::Test(f) => format!("{}#{}", f.type_name, f.test_kind),
            Fact::Packaging(f) => f.jar_name.clone(),
            Fact::TypeGroup(f) => format!("{}:{}", f.group, f.type_name),
            Fact::ExternalDyn(f) => f.type_name.clone(),
        }
    }
}

/// How an add changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The key was new.
    Added,
    /// An equal fact was already present.
    Unchanged,
    /// New information was merged into the existing fact.
    Merged,
    /// A different fact had the key; the new one was at least as complete.
    Replaced,
    /// A different, more complete fact had the key and was kept.
    KeptExisting,
}

impl AddOutcome {
    /// Returns `true` if the add conflicted with an existing value.
    pub fn is_conflict(self) -> bool {
        matches!(self, AddOutcome::Replaced | AddOutcome::KeptExisting)
    }
}

/// Number of optional parts a fact fills in; higher is more complete.
pub(crate) trait Completeness {
    fn completeness(&self) -> usize;
}

impl Completeness for MainInit {
    fn completeness(&self) -> usize {
        usize::from(self.stop_hook.is_some()) + usize::from(!self.launcher_name.is_empty())
    }
}

impl Completeness for TestInstance {
    fn completeness(&self) -> usize {
        usize::from(!self.test_kind.is_empty())
    }
}

impl Completeness for PackagingDirective {
    fn completeness(&self) -> usize {
        usize::from(self.main_class.is_some()) + self.packages.len()
    }
}

impl Completeness for TypeGroupMember {
    fn completeness(&self) -> usize {
        usize::from(!self.layer.is_empty())
    }
}
