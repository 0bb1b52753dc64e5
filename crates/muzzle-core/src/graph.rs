//! ReferenceGraph: every symbol a set of injected units requires, keyed by
//! symbol name.
//!
//! The graph is an insertion-ordered map from symbol name to [`Reference`].
//! Inserting a reference for a name already present merges the two, so a
//! graph never holds two nodes for the same symbol. Once the collector hands a
//! graph out it is treated as immutable; the matcher only reads it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::reference::Reference;

/// Insertion-ordered symbol name -> [`Reference`] map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceGraph {
    references: IndexMap<String, Reference>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from references, merging duplicates.
    pub fn from_references(
        references: impl IntoIterator<Item = Reference>,
    ) -> Result<Self, CoreError> {
        let mut graph = ReferenceGraph::new();
        for reference in references {
            graph.insert(reference)?;
        }
        Ok(graph)
    }

    /// Adds a reference, merging it into an existing node of the same name.
    pub fn insert(&mut self, reference: Reference) -> Result<(), CoreError> {
        match self.references.get_mut(&reference.class_name) {
            Some(existing) => existing.absorb(reference),
            None => {
                self.references
                    .insert(reference.class_name.clone(), reference);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Reference> {
        self.references.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    /// Removes a node, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Reference> {
        self.references.shift_remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.references.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.references.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Keeps only the nodes for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&Reference) -> bool) {
        self.references.retain(|_, reference| keep(reference));
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Reference> {
        self.references.values_mut()
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<'a> IntoIterator for &'a ReferenceGraph {
    type Item = &'a Reference;
    type IntoIter = indexmap::map::Values<'a, String, Reference>;

    fn into_iter(self) -> Self::IntoIter {
        self.references.values()
    }
}
