//! Build info of one build-layer.

use std::collections::{BTreeMap, HashSet};

use crate::facts::{
    AddOutcome, Completeness, ExternalDynType, Fact, MainInit, PackagingDirective, TestInstance,
    TypeGroupMember,
};

/// Facts accumulated for one build-layer, each kind keyed by [`Fact::key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    pub(crate) main_inits: BTreeMap<String, MainInit>,
    pub(crate) tests: BTreeMap<String, TestInstance>,
    pub(crate) packaging: BTreeMap<String, PackagingDirective>,
    pub(crate) type_groups: BTreeMap<String, TypeGroupMember>,
    pub(crate) external_dyn_types: BTreeMap<String, ExternalDynType>,
}

fn add_keyed<F: Clone + PartialEq + Completeness>(
    map: &mut BTreeMap<String, F>,
    key: String,
    fact: F,
) -> AddOutcome {
    match map.get(&key) {
        None => {
            map.insert(key, fact);
            AddOutcome::Added
        }
        Some(existing) if *existing == fact => AddOutcome::Unchanged,
        Some(existing) => {
            if fact.completeness() >= existing.completeness() {
                map.insert(key, fact);
                AddOutcome::Replaced
            } else {
                AddOutcome::KeptExisting
            }
        }
    }
}

impl BuildInfo {
    /// Creates empty build info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fact. Re-adding an equal fact is a no-op.
    ///
    /// A different fact under the same key is a conflict: the more complete
    /// of the two is kept, the new one on a tie. External dynamic types
    /// never conflict; their reverse dependencies are unioned.
    pub fn add(&mut self, fact: Fact) -> AddOutcome {
        let key = fact.key();
        match fact {
            Fact::MainInit(f) => add_keyed(&mut self.main_inits, key, f),
            Fact::Test(f) => add_keyed(&mut self.tests, key, f),
            Fact::Packaging(f) => add_keyed(&mut self.packaging, key, f),
            Fact::TypeGroup(f) => add_keyed(&mut self.type_groups, key, f),
            Fact::ExternalDyn(f) => match self.external_dyn_types.get_mut(&key) {
                None => {
                    self.external_dyn_types.insert(key, f);
                    AddOutcome::Added
                }
                Some(existing) => {
                    let before = existing.reverse_deps.len();
                    existing.reverse_deps.extend(f.reverse_deps);
                    if existing.reverse_deps.len() == before {
                        AddOutcome::Unchanged
                    } else {
                        AddOutcome::Merged
                    }
                }
            },
        }
    }

    /// Removes facts whose owning type changed but was not reprocessed.
    ///
    /// Types in `changed` are expected to re-add their facts while being
    /// processed; a type already in `processed` has done so and keeps them.
    /// Stale callers are dropped from external stubs, and a stub nobody
    /// uses any more is removed. Returns the number of facts removed.
    pub fn clean_stale_entries(
        &mut self,
        changed: &HashSet<String>,
        processed: &HashSet<String>,
    ) -> usize {
        let stale = |t: &str| changed.contains(t) && !processed.contains(t);
        let before = self.len();

        self.main_inits.retain(|_, f| !stale(&f.type_name));
        self.tests.retain(|_, f| !stale(&f.type_name));
        self.packaging.retain(|_, f| !stale(&f.declared_by));
        self.type_groups.retain(|_, f| !stale(&f.type_name));
        self.external_dyn_types.retain(|name, f| {
            f.reverse_deps.retain(|caller| !stale(caller));
            if f.reverse_deps.is_empty() {
                tracing::debug!(type_name = %name, "external stub no longer used");
                false
            } else {
                true
            }
        });

        let removed = before - self.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned stale build facts");
        }
        removed
    }

    /// Absorbs every fact of `other`, with the same rules as [`BuildInfo::add`].
    ///
    /// Returns the number of conflicts.
    pub fn merge(&mut self, other: &BuildInfo) -> usize {
        other
            .facts()
            .into_iter()
            .map(|f| self.add(f))
            .filter(|o| o.is_conflict())
            .count()
    }

    /// Every fact, grouped by kind.
    pub fn facts(&self) -> Vec<Fact> {
        let mut facts = Vec::with_capacity(self.len());
        facts.extend(self.main_inits.values().cloned().map(Fact::MainInit));
        facts.extend(self.tests.values().cloned().map(Fact::Test));
        facts.extend(self.packaging.values().cloned().map(Fact::Packaging));
        facts.extend(self.type_groups.values().cloned().map(Fact::TypeGroup));
        facts.extend(self.external_dyn_types.values().cloned().map(Fact::ExternalDyn));
        facts
    }

    /// Total number of facts.
    pub fn len(&self) -> usize {
        self.main_inits.len()
            + self.tests.len()
            + self.packaging.len()
            + self.type_groups.len()
            + self.external_dyn_types.len()
    }

    /// Returns `true` if no fact is recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry points in type-name order.
    pub fn main_inits(&self) -> impl Iterator<Item = &MainInit> {
        self.main_inits.values()
    }

    /// Looks up the entry point of a type.
    pub fn main_init(&self, type_name: &str) -> Option<&MainInit> {
        self.main_inits.get(type_name)
    }

    /// Test registrations.
    pub fn tests(&self) -> impl Iterator<Item = &TestInstance> {
        self.tests.values()
    }

    /// Packaging directives.
    pub fn packaging(&self) -> impl Iterator<Item = &PackagingDirective> {
        self.packaging.values()
    }

    /// Member types of a named group, in name order.
    pub fn type_group(&self, group: &str) -> Vec<&str> {
        self.type_groups
            .values()
            .filter(|m| m.group == group)
            .map(|m| m.type_name.as_str())
            .collect()
    }

    /// External dynamic types.
    pub fn external_dyn_types(&self) -> impl Iterator<Item = &ExternalDynType> {
        self.external_dyn_types.values()
    }

    /// Mutable access to one external dynamic type.
    pub fn external_dyn_type_mut(&mut self, type_name: &str) -> Option<&mut ExternalDynType> {
        self.external_dyn_types.get_mut(type_name)
    }
}
