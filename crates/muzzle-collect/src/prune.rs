//! Graph pruning for export.
//!
//! Only references to library (external) symbols have to be checked against
//! an environment. Helper references are kept when the helper sits in the
//! supertype chain of a library type, since they describe how the helper
//! fills that type in; all other helper references are dropped.

use std::collections::BTreeSet;

use muzzle_core::{Flag, ReferenceGraph};

use crate::config::CollectorConfig;

/// Removes helper references that take no part in a library supertype
/// chain. Retained helper references lose their constructor, private and
/// static methods.
pub fn prune(
    graph: &mut ReferenceGraph,
    config: &CollectorConfig,
    is_internal: &dyn Fn(&str) -> bool,
) {
    let pruner = Pruner {
        graph,
        config,
        is_internal,
    };
    let keep = pruner.participating_helpers();
    let before = graph.len();

    graph.retain(|reference| {
        !is_internal(&reference.class_name) || keep.contains(&reference.class_name)
    });
    for reference in graph.iter_mut() {
        if !is_internal(&reference.class_name) {
            continue;
        }
        reference.methods.retain(|_, method| {
            !method.is_constructor()
                && !method.flags.contains(&Flag::Private)
                && !method.flags.contains(&Flag::Static)
        });
    }
    tracing::debug!(before, after = graph.len(), "pruned reference graph");
}

struct Pruner<'a> {
    graph: &'a ReferenceGraph,
    config: &'a CollectorConfig,
    is_internal: &'a dyn Fn(&str) -> bool,
}

impl Pruner<'_> {
    fn is_library(&self, name: &str) -> bool {
        !(self.is_internal)(name) && !self.config.is_platform(name)
    }

    /// Helpers with a library supertype, plus their helper supertypes.
    fn participating_helpers(&self) -> BTreeSet<String> {
        let mut keep = BTreeSet::new();
        for reference in self.graph {
            let name = &reference.class_name;
            if (self.is_internal)(name) && self.has_library_supertype(name, &mut BTreeSet::new()) {
                self.add_helper_supertypes(name, &mut keep);
            }
        }
        keep
    }

    fn add_helper_supertypes(&self, name: &str, keep: &mut BTreeSet<String>) {
        if !(self.is_internal)(name) || !keep.insert(name.to_string()) {
            return;
        }
        if let Some(reference) = self.graph.get(name) {
            // interfaces too, they may carry default methods
            for parent in reference.super_name.iter().chain(&reference.interfaces) {
                self.add_helper_supertypes(parent, keep);
            }
        }
    }

    fn has_library_supertype(&self, name: &str, seen: &mut BTreeSet<String>) -> bool {
        let Some(reference) = self.graph.get(name) else {
            return false;
        };
        if !seen.insert(name.to_string()) {
            return false;
        }
        for parent in reference.super_name.iter().chain(&reference.interfaces) {
            if self.config.is_platform(parent) {
                continue;
            }
            if self.is_library(parent) || self.has_library_supertype(parent, seen) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muzzle_core::{MethodRef, MethodSig, Reference};

    fn internal(name: &str) -> bool {
        name.starts_with("agent.")
    }

    fn method(name: &str, flag: Flag) -> MethodRef {
        MethodRef::new(name, MethodSig::parse("()V").unwrap()).with_flag(flag)
    }

    #[test]
    fn keeps_library_references_and_helpers_in_library_chains() {
        let mut graph = ReferenceGraph::from_references([
            Reference::new("external.Listener"),
            Reference::builder("agent.Base")
                .super_name("java.lang.Object")
                .method(method("onEvent", Flag::Public))
                .method(method("<init>", Flag::Public))
                .method(method("secret", Flag::Private))
                .method(method("create", Flag::Static))
                .build(),
            Reference::builder("agent.Impl")
                .super_name("agent.Base")
                .interface("external.Listener")
                .build(),
            Reference::builder("agent.Util")
                .super_name("java.lang.Object")
                .build(),
        ])
        .unwrap();

        prune(&mut graph, &CollectorConfig::default(), &internal);

        let names: Vec<&str> = graph.names().collect();
        assert_eq!(names, ["external.Listener", "agent.Base", "agent.Impl"]);
        let base_methods: Vec<&str> = graph
            .get("agent.Base")
            .unwrap()
            .methods
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(base_methods, ["onEvent()void"]);
    }

    #[test]
    fn cyclic_helper_chains_terminate() {
        let mut graph = ReferenceGraph::from_references([
            Reference::builder("agent.A").interface("agent.B").build(),
            Reference::builder("agent.B").interface("agent.A").build(),
        ])
        .unwrap();
        prune(&mut graph, &CollectorConfig::default(), &internal);
        assert!(graph.is_empty());
    }
}
