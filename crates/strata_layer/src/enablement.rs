//! Deciding whether a layer participates in a runtime or process.
//!
//! Resolution is pure: it reads layers through a [`LayerLookup`] and never
//! mutates them, so it can run repeatedly while the stack is still being
//! assembled.
//!
//! For one axis (runtime or process) a layer answers from its own settings
//! first: a bound name decides outright, then a non-empty include list, then
//! a non-empty exclude list. Without its own settings the layer asks its
//! exporting bases. An `Enabled` base wins immediately; otherwise any
//! `Disabled` base makes the answer `Disabled`; otherwise it is `NotSet`.
//!
//! The process case combines a process-level signal with the runtime-level
//! one. Each signal carries the transitive distance of the ancestor that
//! produced it. A process-level `Disabled` overrides a runtime-level
//! `Enabled` only when it came from an ancestor at least as close as the one
//! that enabled the runtime.

use std::collections::{HashMap, HashSet};

use strata_config::BuildTarget;

use crate::layer::{Layer, LayerAffinity};

/// Tri-state answer of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerEnabledState {
    /// The layer participates.
    Enabled,
    /// The layer does not participate.
    Disabled,
    /// Nothing in the ancestry says; callers treat this as enabled.
    NotSet,
}

impl LayerEnabledState {
    /// Applies the enabled-by-default rule.
    pub fn is_enabled(self) -> bool {
        self != LayerEnabledState::Disabled
    }
}

/// Read access to layers by name.
pub trait LayerLookup {
    /// Returns the layer named `name`, if present.
    fn layer(&self, name: &str) -> Option<&Layer>;
}

impl LayerLookup for HashMap<String, Layer> {
    fn layer(&self, name: &str) -> Option<&Layer> {
        self.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Runtime,
    Process,
}

impl Axis {
    fn of(self, layer: &Layer) -> &LayerAffinity {
        match self {
            Axis::Runtime => &layer.runtimes,
            Axis::Process => &layer.processes,
        }
    }
}

/// A definite answer and the transitive distance of the layer that gave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signal {
    state: LayerEnabledState,
    distance: u32,
}

/// Resolves layer enablement against a set of known layers.
pub struct LayerEnablementResolver<'a, L: LayerLookup + ?Sized> {
    layers: &'a L,
}

impl<'a, L: LayerLookup + ?Sized> LayerEnablementResolver<'a, L> {
    /// Creates a resolver reading base layers from `layers`.
    pub fn new(layers: &'a L) -> Self {
        Self { layers }
    }

    /// Resolves `layer` against a target's runtime and, if set, its process.
    pub fn resolve(&self, layer: &Layer, target: &BuildTarget) -> LayerEnabledState {
        match &target.process {
            Some(process) => self.resolve_process(layer, Some(&target.runtime), process),
            None => self.resolve_runtime(layer, &target.runtime),
        }
    }

    /// Resolves `layer` for a runtime.
    pub fn resolve_runtime(&self, layer: &Layer, runtime: &str) -> LayerEnabledState {
        self.signal(layer, Axis::Runtime, runtime)
            .map_or(LayerEnabledState::NotSet, |s| s.state)
    }

    /// Resolves `layer` for a process, falling back to the runtime answer.
    pub fn resolve_process(
        &self,
        layer: &Layer,
        runtime: Option<&str>,
        process: &str,
    ) -> LayerEnabledState {
        let by_process = self.signal(layer, Axis::Process, process);
        let by_runtime = runtime.and_then(|r| self.signal(layer, Axis::Runtime, r));
        combine(by_process, by_runtime)
    }

    fn signal(&self, layer: &Layer, axis: Axis, name: &str) -> Option<Signal> {
        let mut visited = HashSet::new();
        visited.insert(layer.name.clone());
        self.signal_at(layer, axis, name, 0, &mut visited)
    }

    fn signal_at(
        &self,
        layer: &Layer,
        axis: Axis,
        name: &str,
        distance: u32,
        visited: &mut HashSet<String>,
    ) -> Option<Signal> {
        if let Some(state) = explicit_state(axis.of(layer), name) {
            return Some(Signal { state, distance });
        }

        let mut disabled: Option<Signal> = None;
        for base_name in &layer.extends {
            if !visited.insert(base_name.clone()) {
                continue;
            }
            let Some(base) = self.layers.layer(base_name) else {
                continue;
            };
            if !self.exports(base, axis, &mut HashSet::new()) {
                continue;
            }
            match self.signal_at(base, axis, name, distance + 1, visited) {
                Some(s) if s.state == LayerEnabledState::Enabled => return Some(s),
                Some(s) => {
                    if disabled.map_or(true, |d| s.distance < d.distance) {
                        disabled = Some(s);
                    }
                }
                None => {}
            }
        }
        disabled
    }

    /// A base exports its affinity if it says so, or if it has none of its
    /// own and one of its bases exports.
    fn exports(&self, layer: &Layer, axis: Axis, visited: &mut HashSet<String>) -> bool {
        let affinity = axis.of(layer);
        if affinity.export {
            return true;
        }
        if affinity.is_explicit() || !visited.insert(layer.name.clone()) {
            return false;
        }
        layer.extends.iter().any(|b| {
            self.layers
                .layer(b)
                .is_some_and(|base| self.exports(base, axis, visited))
        })
    }
}

fn explicit_state(affinity: &LayerAffinity, name: &str) -> Option<LayerEnabledState> {
    let pick = |on: bool| {
        if on {
            LayerEnabledState::Enabled
        } else {
            LayerEnabledState::Disabled
        }
    };
    if let Some(bound) = &affinity.bound {
        return Some(pick(bound == name));
    }
    if !affinity.include.is_empty() {
        return Some(pick(affinity.include.iter().any(|n| n == name)));
    }
    if !affinity.exclude.is_empty() {
        return Some(pick(!affinity.exclude.iter().any(|n| n == name)));
    }
    None
}

fn combine(by_process: Option<Signal>, by_runtime: Option<Signal>) -> LayerEnabledState {
    use LayerEnabledState::*;
    match (by_process, by_runtime) {
        (None, None) => NotSet,
        (None, Some(r)) => r.state,
        (Some(p), r) if p.state == Enabled => match r {
            Some(r) if r.state == Disabled => Disabled,
            _ => Enabled,
        },
        (Some(p), Some(r)) if r.state == Enabled => {
            if p.distance <= r.distance {
                Disabled
            } else {
                Enabled
            }
        }
        (Some(_), _) => Disabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LayerEnabledState::*;

    fn stack(layers: Vec<Layer>) -> HashMap<String, Layer> {
        layers.into_iter().map(|l| (l.name.clone(), l)).collect()
    }

    fn excluding(names: &[&str], export: bool) -> LayerAffinity {
        LayerAffinity {
            exclude: names.iter().map(|s| s.to_string()).collect(),
            export,
            ..LayerAffinity::default()
        }
    }

    #[test]
    fn bound_runtime_decides() {
        let layers = stack(vec![Layer::new("js").with_runtimes(LayerAffinity::bound_to("js"))]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["js"], "js"), Enabled);
        assert_eq!(r.resolve_runtime(&layers["js"], "java"), Disabled);
    }

    #[test]
    fn include_list_decides() {
        let layer = Layer::new("a").with_runtimes(LayerAffinity {
            include: vec!["java".into(), "android".into()],
            ..LayerAffinity::default()
        });
        let layers = stack(vec![layer]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["a"], "android"), Enabled);
        assert_eq!(r.resolve_runtime(&layers["a"], "js"), Disabled);
    }

    #[test]
    fn exclude_list_decides() {
        let layers = stack(vec![Layer::new("a").with_runtimes(excluding(&["js"], false))]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["a"], "js"), Disabled);
        assert_eq!(r.resolve_runtime(&layers["a"], "java"), Enabled);
    }

    #[test]
    fn no_settings_is_not_set() {
        let layers = stack(vec![Layer::new("base"), Layer::new("app").extending("base")]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["app"], "js"), NotSet);
        assert!(NotSet.is_enabled());
    }

    #[test]
    fn non_exporting_base_is_ignored() {
        let base = Layer::new("base").with_runtimes(LayerAffinity {
            bound: Some("js".into()),
            export: false,
            ..LayerAffinity::default()
        });
        let layers = stack(vec![base, Layer::new("app").extending("base")]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["app"], "java"), NotSet);
    }

    #[test]
    fn exporting_base_is_inherited() {
        let layers = stack(vec![
            Layer::new("js.base").with_runtimes(LayerAffinity::bound_to("js")),
            Layer::new("app").extending("js.base"),
        ]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["app"], "js"), Enabled);
        assert_eq!(r.resolve_runtime(&layers["app"], "java"), Disabled);
    }

    #[test]
    fn any_enabled_base_wins_over_disabled_bases() {
        let layers = stack(vec![
            Layer::new("js.base").with_runtimes(LayerAffinity::bound_to("js")),
            Layer::new("java.base").with_runtimes(LayerAffinity::bound_to("java")),
            Layer::new("app").extending("js.base").extending("java.base"),
        ]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["app"], "java"), Enabled);
        assert_eq!(r.resolve_runtime(&layers["app"], "js"), Enabled);
        assert_eq!(r.resolve_runtime(&layers["app"], "android"), Disabled);
    }

    #[test]
    fn export_is_transitive_through_layers_without_settings() {
        let layers = stack(vec![
            Layer::new("js.base").with_runtimes(LayerAffinity::bound_to("js")),
            Layer::new("mid").extending("js.base"),
            Layer::new("app").extending("mid"),
        ]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["app"], "java"), Disabled);
    }

    #[test]
    fn own_setting_overrides_base() {
        let app = Layer::new("app")
            .extending("js.base")
            .with_runtimes(LayerAffinity::bound_to("java"));
        let layers = stack(vec![
            Layer::new("js.base").with_runtimes(LayerAffinity::bound_to("js")),
            app,
        ]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["app"], "java"), Enabled);
    }

    #[test]
    fn cyclic_input_terminates() {
        let layers = stack(vec![
            Layer::new("a")
                .extending("b")
                .with_runtimes(LayerAffinity {
                    export: true,
                    ..LayerAffinity::default()
                }),
            Layer::new("b")
                .extending("a")
                .with_runtimes(LayerAffinity {
                    export: true,
                    ..LayerAffinity::default()
                }),
        ]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_runtime(&layers["a"], "js"), NotSet);
    }

    #[test]
    fn process_falls_back_to_runtime() {
        let layers = stack(vec![
            Layer::new("js.base").with_runtimes(LayerAffinity::bound_to("js")),
            Layer::new("app").extending("js.base"),
        ]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_process(&layers["app"], Some("js"), "browser"), Enabled);
        assert_eq!(r.resolve_process(&layers["app"], Some("java"), "server"), Disabled);
        assert_eq!(r.resolve_process(&layers["app"], None, "server"), NotSet);
    }

    #[test]
    fn closer_process_disable_overrides_runtime_enable() {
        let app = Layer::new("app")
            .extending("java.base")
            .with_processes(excluding(&["server"], false));
        let layers = stack(vec![
            Layer::new("java.base").with_runtimes(LayerAffinity::bound_to("java")),
            app,
        ]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_process(&layers["app"], Some("java"), "server"), Disabled);
        assert_eq!(r.resolve_process(&layers["app"], Some("java"), "client"), Enabled);
    }

    #[test]
    fn farther_process_disable_does_not_override_closer_runtime_enable() {
        let layers = stack(vec![
            Layer::new("no.server").with_processes(excluding(&["server"], true)),
            Layer::new("app")
                .extending("no.server")
                .with_runtimes(LayerAffinity::bound_to("java")),
        ]);
        let r = LayerEnablementResolver::new(&layers);
        // runtime enabled at distance 0, process disabled at distance 1
        assert_eq!(r.resolve_process(&layers["app"], Some("java"), "server"), Enabled);
    }

    #[test]
    fn equal_distance_goes_to_process() {
        let app = Layer::new("app")
            .with_runtimes(LayerAffinity::bound_to("java"))
            .with_processes(excluding(&["server"], false));
        let layers = stack(vec![app]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_process(&layers["app"], Some("java"), "server"), Disabled);
    }

    #[test]
    fn process_enable_cannot_resurrect_disabled_runtime() {
        let app = Layer::new("app")
            .with_runtimes(LayerAffinity::bound_to("js"))
            .with_processes(LayerAffinity::bound_to("server"));
        let layers = stack(vec![app]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve_process(&layers["app"], Some("java"), "server"), Disabled);
        assert_eq!(r.resolve_process(&layers["app"], Some("js"), "server"), Enabled);
    }

    #[test]
    fn resolve_dispatches_on_target() {
        let layers = stack(vec![Layer::new("app").with_processes(excluding(&["server"], false))]);
        let r = LayerEnablementResolver::new(&layers);
        assert_eq!(r.resolve(&layers["app"], &BuildTarget::runtime("java")), NotSet);
        assert_eq!(
            r.resolve(&layers["app"], &BuildTarget::process("java", "server")),
            Disabled
        );
    }
}
