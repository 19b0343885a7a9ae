//! The ordered stack of active layers.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use strata_config::BuildTarget;
use strata_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};

use crate::enablement::{LayerEnablementResolver, LayerLookup};
use crate::error::LayerError;
use crate::layer::{Layer, LayerState};

const MISSING_BASE: DiagnosticCode = DiagnosticCode::new(Category::Graph, 1);
const CYCLIC_BASE: DiagnosticCode = DiagnosticCode::new(Category::Graph, 2);
const FAILED_BASE: DiagnosticCode = DiagnosticCode::new(Category::Graph, 3);
const EXTENDS_FINAL: DiagnosticCode = DiagnosticCode::new(Category::Graph, 5);

/// The authoritative ordered list of layers for one system.
///
/// Layers live in a flat arena whose index is the layer's position. Every
/// layer sits after all the layers it extends. Layers that failed to
/// initialize, were switched off, or do not participate in the target are
/// held aside and never appear in the active order.
#[derive(Debug, Default)]
pub struct LayerGraph {
    layers: Vec<Layer>,
    index: HashMap<String, usize>,
    failed: Vec<Layer>,
    inactive: Vec<Layer>,
    replaced: Vec<Layer>,
}

impl LayerLookup for LayerGraph {
    fn layer(&self, name: &str) -> Option<&Layer> {
        self.get(name)
    }
}

impl LayerGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the active stack from discovered layers.
    ///
    /// Layers appear in `discovered` in discovery order. A later definition
    /// with the same name replaces an earlier one. Layers disabled for
    /// `target` (or switched off) go to the inactive list along with any
    /// layer extending them. Missing bases and cycles fail the layers
    /// involved and, depth-first, everything that extends them.
    pub fn build(
        discovered: Vec<Layer>,
        target: Option<&BuildTarget>,
        sink: &DiagnosticSink,
    ) -> Self {
        let mut graph = Self::new();

        let mut candidates: HashMap<String, Layer> = HashMap::new();
        let mut discovery: Vec<String> = Vec::new();
        for (i, mut layer) in discovered.into_iter().enumerate() {
            layer.discovery_index = i;
            if let Some(mut previous) = candidates.remove(&layer.name) {
                tracing::info!(
                    layer = %layer.name,
                    replaced = %previous.dir.display(),
                    by = %layer.dir.display(),
                    "layer definition replaced"
                );
                previous.replaced_by = Some(layer.dir.clone());
                graph.replaced.push(previous);
                discovery.retain(|n| n != &layer.name);
            }
            discovery.push(layer.name.clone());
            candidates.insert(layer.name.clone(), layer);
        }

        let mut inactive: HashSet<String> = {
            let resolver = LayerEnablementResolver::new(&candidates);
            candidates
                .values()
                .filter(|l| {
                    l.is_switched_off()
                        || target.is_some_and(|t| !resolver.resolve(l, t).is_enabled())
                })
                .map(|l| l.name.clone())
                .collect()
        };
        loop {
            let newly: Vec<String> = candidates
                .values()
                .filter(|l| !inactive.contains(&l.name))
                .filter(|l| l.extends.iter().any(|b| inactive.contains(b)))
                .map(|l| l.name.clone())
                .collect();
            if newly.is_empty() {
                break;
            }
            inactive.extend(newly);
        }

        let mut failed: HashMap<String, String> = HashMap::new();
        for name in &discovery {
            if inactive.contains(name) {
                continue;
            }
            let layer = &candidates[name];
            for base in &layer.extends {
                match candidates.get(base) {
                    None => {
                        sink.emit(
                            Diagnostic::error(
                                MISSING_BASE,
                                format!("base layer '{base}' not found"),
                            )
                            .in_layer(name.clone()),
                        );
                        failed
                            .entry(name.clone())
                            .or_insert_with(|| format!("missing base layer '{base}'"));
                    }
                    Some(b) if b.flags.final_layer => {
                        sink.emit(
                            Diagnostic::error(
                                EXTENDS_FINAL,
                                format!("cannot extend final layer '{base}'"),
                            )
                            .in_layer(name.clone()),
                        );
                        failed
                            .entry(name.clone())
                            .or_insert_with(|| format!("extends final layer '{base}'"));
                    }
                    Some(_) => {}
                }
            }
        }

        for cycle in find_cycles(&candidates, &discovery, &inactive) {
            let members = cycle.join(" -> ");
            for name in cycle {
                sink.emit(
                    Diagnostic::error(CYCLIC_BASE, format!("cyclic base layers: {members}"))
                        .in_layer(name.clone()),
                );
                failed
                    .entry(name)
                    .or_insert_with(|| format!("cyclic base layers: {members}"));
            }
        }

        let roots: Vec<String> = discovery
            .iter()
            .filter(|n| failed.contains_key(*n))
            .cloned()
            .collect();
        for root in roots {
            fail_dependents(&root, &candidates, &discovery, &inactive, &mut failed, sink);
        }

        let mut active = Vec::new();
        for name in discovery {
            let Some(mut layer) = candidates.remove(&name) else {
                continue;
            };
            if inactive.contains(&name) {
                graph.inactive.push(layer);
            } else if let Some(reason) = failed.remove(&name) {
                layer.state = LayerState::InitFailed { reason };
                graph.failed.push(layer);
            } else {
                layer.state = LayerState::Initialized;
                active.push(layer);
            }
        }

        graph.layers = order_by_priority(active, |l| l.discovery_index);
        graph.renumber();
        tracing::debug!(
            active = graph.layers.len(),
            inactive = graph.inactive.len(),
            failed = graph.failed.len(),
            "layer graph built"
        );
        graph
    }

    /// Orders layers outside the active stack for display.
    ///
    /// Ties fall back to `prior_order` (the last persisted order) so tooling
    /// views stay stable, then to discovery order for unknown layers.
    pub fn order_inactive(layers: Vec<Layer>, prior_order: &[String]) -> Vec<Layer> {
        let prior: HashMap<&str, usize> = prior_order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let offset = prior_order.len();
        let ties: HashMap<String, usize> = layers
            .iter()
            .map(|l| {
                let tie = prior
                    .get(l.name.as_str())
                    .copied()
                    .unwrap_or(offset + l.discovery_index);
                (l.name.clone(), tie)
            })
            .collect();
        order_by_priority(layers, |l| ties.get(&l.name).copied().unwrap_or(usize::MAX))
    }

    /// Inserts a layer whose bases are all present.
    ///
    /// The layer goes after its last base, before the first later layer that
    /// sorts after it. Returns the new position.
    pub fn add_layer(&mut self, mut layer: Layer) -> Result<usize, LayerError> {
        if self.index.contains_key(&layer.name) {
            return Err(LayerError::Duplicate(layer.name));
        }
        let mut earliest = 0;
        for base in &layer.extends {
            let Some(&pos) = self.index.get(base) else {
                return Err(LayerError::MissingBase {
                    layer: layer.name.clone(),
                    base: base.clone(),
                });
            };
            if self.layers[pos].flags.final_layer {
                return Err(LayerError::ExtendsFinal {
                    layer: layer.name.clone(),
                    base: base.clone(),
                });
            }
            earliest = earliest.max(pos + 1);
        }

        let key = layer.sort_priority();
        let at = (earliest..self.layers.len())
            .find(|&i| self.layers[i].sort_priority() > key)
            .unwrap_or(self.layers.len());
        layer.state = LayerState::Initialized;
        tracing::debug!(layer = %layer.name, position = at, "layer added");
        self.layers.insert(at, layer);
        self.renumber();
        Ok(at)
    }

    /// Removes a layer and every layer that extends it.
    ///
    /// Returns the removed names in stack order.
    pub fn remove_layer(&mut self, name: &str) -> Result<Vec<String>, LayerError> {
        if !self.index.contains_key(name) {
            return Err(LayerError::UnknownLayer(name.to_string()));
        }
        let doomed: HashSet<String> = self
            .layers
            .iter()
            .filter(|l| l.name == name || self.extends(&l.name, name))
            .map(|l| l.name.clone())
            .collect();
        let mut removed = Vec::new();
        self.layers.retain(|l| {
            if doomed.contains(&l.name) {
                removed.push(l.name.clone());
                false
            } else {
                true
            }
        });
        self.renumber();
        tracing::info!(layer = name, removed = removed.len(), "layer removed");
        Ok(removed)
    }

    /// Returns `true` if `a` transitively extends `b`.
    pub fn extends(&self, a: &str, b: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![a];
        while let Some(name) = stack.pop() {
            let Some(layer) = self.get(name) else {
                continue;
            };
            for base in &layer.extends {
                if base == b {
                    return true;
                }
                if visited.insert(base.as_str()) {
                    stack.push(base);
                }
            }
        }
        false
    }

    /// Sort key of a layer in the stack; lower sorts earlier.
    pub fn sort_priority(&self, name: &str) -> Option<i64> {
        self.get(name).map(Layer::sort_priority)
    }

    /// Looks up an active layer by name.
    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.index.get(name).map(|&i| &self.layers[i])
    }

    /// Position of an active layer.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Active layers in stack order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Names of active layers in stack order.
    pub fn names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    /// Number of active layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if no layer is active.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The top of the stack.
    pub fn top(&self) -> Option<&Layer> {
        self.layers.last()
    }

    /// Layers that failed to initialize.
    pub fn failed(&self) -> &[Layer] {
        &self.failed
    }

    /// Layers not participating in this system.
    pub fn inactive(&self) -> &[Layer] {
        &self.inactive
    }

    /// Definitions superseded by a later definition of the same name.
    pub fn replaced(&self) -> &[Layer] {
        &self.replaced
    }

    /// Updates the lifecycle state of an active layer.
    pub fn set_state(&mut self, name: &str, state: LayerState) -> Result<(), LayerError> {
        let &i = self
            .index
            .get(name)
            .ok_or_else(|| LayerError::UnknownLayer(name.to_string()))?;
        self.layers[i].state = state;
        Ok(())
    }

    /// Returns `true` if the layer is a unit of compiled output.
    ///
    /// Build-separate layers and the top of the stack are build-layers.
    pub fn is_build_layer(&self, name: &str) -> bool {
        self.position(name).is_some_and(|p| self.is_build_layer_at(p))
    }

    fn is_build_layer_at(&self, pos: usize) -> bool {
        pos + 1 == self.layers.len() || self.layers[pos].flags.build_separate
    }

    /// All build-layers in stack order.
    pub fn build_layers(&self) -> Vec<&Layer> {
        (0..self.layers.len())
            .filter(|&p| self.is_build_layer_at(p))
            .map(|p| &self.layers[p])
            .collect()
    }

    /// The root build-layer: the top of the stack.
    pub fn root_build_layer(&self) -> Option<&Layer> {
        self.top()
    }

    /// The build-layer whose output holds `name`: the first build-layer at
    /// or after its position.
    pub fn build_layer_of(&self, name: &str) -> Option<&Layer> {
        let start = self.position(name)?;
        (start..self.layers.len())
            .find(|&p| self.is_build_layer_at(p))
            .map(|p| &self.layers[p])
    }

    /// Build-layers other than the root that need facts declared in
    /// `declaring`.
    ///
    /// These are the build-layers of every layer extending (or equal to)
    /// the declaring layer.
    pub fn fanout_targets(&self, declaring: &str) -> Vec<String> {
        let root = self.root_build_layer().map(|l| l.name.as_str());
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for layer in &self.layers {
            if layer.name != declaring && !self.extends(&layer.name, declaring) {
                continue;
            }
            let Some(build_layer) = self.build_layer_of(&layer.name) else {
                continue;
            };
            if Some(build_layer.name.as_str()) != root && seen.insert(build_layer.name.as_str()) {
                targets.push(build_layer.name.clone());
            }
        }
        targets
    }

    fn renumber(&mut self) {
        self.index.clear();
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.position = i;
            self.index.insert(layer.name.clone(), i);
        }
    }
}

/// Kahn's algorithm picking the lowest `(sort_priority, tie)` among ready
/// layers. Bases outside `layers` are ignored. Layers left over by a cycle
/// are appended in input order.
fn order_by_priority(layers: Vec<Layer>, tie: impl Fn(&Layer) -> usize) -> Vec<Layer> {
    let order: Vec<usize> = {
        let pos: HashMap<&str, usize> = layers
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.as_str(), i))
            .collect();
        let mut indegree = vec![0usize; layers.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); layers.len()];
        for (i, layer) in layers.iter().enumerate() {
            for base in &layer.extends {
                if let Some(&j) = pos.get(base.as_str()) {
                    indegree[i] += 1;
                    dependents[j].push(i);
                }
            }
        }

        let key = |i: usize| Reverse((layers[i].sort_priority(), tie(&layers[i]), i));
        let mut ready: BinaryHeap<_> = (0..layers.len())
            .filter(|&i| indegree[i] == 0)
            .map(key)
            .collect();
        let mut order = Vec::with_capacity(layers.len());
        while let Some(Reverse((_, _, i))) = ready.pop() {
            order.push(i);
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.push(key(d));
                }
            }
        }
        let placed: HashSet<usize> = order.iter().copied().collect();
        order.extend((0..layers.len()).filter(|i| !placed.contains(i)));
        order
    };

    let mut slots: Vec<Option<Layer>> = layers.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Strongly connected components of the extends-graph that form cycles.
fn find_cycles(
    candidates: &HashMap<String, Layer>,
    discovery: &[String],
    inactive: &HashSet<String>,
) -> Vec<Vec<String>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for name in discovery.iter().filter(|n| !inactive.contains(*n)) {
        nodes.insert(name.as_str(), graph.add_node(name.as_str()));
    }
    for (name, &node) in &nodes {
        for base in &candidates[*name].extends {
            if let Some(&base_node) = nodes.get(base.as_str()) {
                graph.add_edge(base_node, node, ());
            }
        }
    }
    tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut names: Vec<String> = scc.iter().map(|&n| graph[n].to_string()).collect();
            names.sort();
            names
        })
        .collect()
}

/// Marks every layer extending `root` failed, depth-first.
fn fail_dependents(
    root: &str,
    candidates: &HashMap<String, Layer>,
    discovery: &[String],
    inactive: &HashSet<String>,
    failed: &mut HashMap<String, String>,
    sink: &DiagnosticSink,
) {
    for name in discovery {
        if inactive.contains(name) || failed.contains_key(name) {
            continue;
        }
        if candidates[name].extends.iter().any(|b| b == root) {
            sink.emit(
                Diagnostic::error(FAILED_BASE, format!("base layer '{root}' failed to initialize"))
                    .in_layer(name.clone()),
            );
            failed.insert(name.clone(), format!("base layer '{root}' failed"));
            fail_dependents(name, candidates, discovery, inactive, failed, sink);
        }
    }
}
