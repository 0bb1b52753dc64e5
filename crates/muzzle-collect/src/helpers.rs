//! Helper dependency graph and injection order.
//!
//! Nodes are helper units. An edge `sub -> super` says `sub` extends or
//! implements `super`, so `super` must be injected first. Node indices
//! follow insertion order, which makes the sort deterministic.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::CollectError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "DiGraph<String, ()>", into = "DiGraph<String, ()>")]
pub struct HelperGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl From<DiGraph<String, ()>> for HelperGraph {
    fn from(graph: DiGraph<String, ()>) -> Self {
        let index = graph
            .node_indices()
            .map(|idx| (graph[idx].clone(), idx))
            .collect();
        HelperGraph { graph, index }
    }
}

impl From<HelperGraph> for DiGraph<String, ()> {
    fn from(helpers: HelperGraph) -> Self {
        helpers.graph
    }
}

impl HelperGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a helper if it is not already present.
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Records that `sub` extends or implements `sup`.
    pub fn add_edge(&mut self, sub: &str, sup: &str) {
        let from = self.add_node(sub);
        let to = self.add_node(sup);
        self.graph.update_edge(from, to, ());
    }

    /// Drops a node and its edges, keeping the remaining insertion order.
    pub fn remove_node(&mut self, name: &str) -> bool {
        if !self.contains(name) {
            return false;
        }
        let mut rebuilt = HelperGraph::new();
        for node in self.names().filter(|n| *n != name) {
            rebuilt.add_node(node);
        }
        for edge in self.graph.edge_references() {
            let (sub, sup) = (&self.graph[edge.source()], &self.graph[edge.target()]);
            if sub != name && sup != name {
                rebuilt.add_edge(sub, sup);
            }
        }
        *self = rebuilt;
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Helpers in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    /// The helper supertypes `name` directly depends on.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].as_str())
            .collect();
        // petgraph yields the newest edge first
        deps.reverse();
        deps
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Weakly connected components, ordered by their first node. Each
    /// component lists its nodes in insertion order.
    pub fn components(&self) -> Vec<Vec<NodeIndex>> {
        let mut sets = UnionFind::<usize>::new(self.graph.node_count());
        for edge in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                sets.union(a.index(), b.index());
            }
        }
        let labels = sets.into_labeling();
        let mut components: IndexMap<usize, Vec<NodeIndex>> = IndexMap::new();
        for idx in self.graph.node_indices() {
            components.entry(labels[idx.index()]).or_default().push(idx);
        }
        components.into_values().collect()
    }

    /// Orders helpers so that every supertype precedes its subtypes.
    ///
    /// Each weakly connected component is sorted on its own with Kahn's
    /// algorithm over the transposed graph, and the results are concatenated.
    /// Fails with [`CollectError::HelperCycle`] if supertypes form a cycle.
    pub fn sorted(&self) -> Result<Vec<String>, CollectError> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        for component in self.components() {
            order.extend(self.sort_component(&component)?);
        }
        Ok(order)
    }

    fn sort_component(&self, component: &[NodeIndex]) -> Result<Vec<String>, CollectError> {
        // unresolved supertypes per node
        let mut pending: HashMap<NodeIndex, usize> = component
            .iter()
            .map(|&idx| {
                let count = self
                    .graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .count();
                (idx, count)
            })
            .collect();

        let mut queue: VecDeque<NodeIndex> = component
            .iter()
            .copied()
            .filter(|idx| pending[idx] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(component.len());
        while let Some(idx) = queue.pop_front() {
            sorted.push(self.graph[idx].clone());

            let mut dependents: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            dependents.sort();
            for dependent in dependents {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if sorted.len() != component.len() {
            let members = component
                .iter()
                .filter(|idx| pending[*idx] > 0)
                .map(|&idx| self.graph[idx].clone())
                .collect();
            return Err(CollectError::HelperCycle { members });
        }
        Ok(sorted)
    }
}
