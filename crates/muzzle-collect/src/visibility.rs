//! Minimum visibility an accessing unit needs to reach a target.

use std::collections::BTreeSet;

use muzzle_core::names::package_of;
use muzzle_core::Flag;

/// The accessing side of an access: its name and every supertype it is
/// known to have.
#[derive(Debug, Clone, Default)]
pub struct Accessor {
    pub name: String,
    pub ancestors: BTreeSet<String>,
}

impl Accessor {
    pub fn new(name: impl Into<String>) -> Self {
        Accessor {
            name: name.into(),
            ancestors: BTreeSet::new(),
        }
    }

    pub fn with_ancestors<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ancestors.extend(ancestors.into_iter().map(Into::into));
        self
    }

    /// `PRIVATE_OR_HIGHER` for the accessor itself, `PACKAGE_OR_HIGHER`
    /// inside its package, `PROTECTED_OR_HIGHER` for its supertypes and
    /// `PUBLIC` for everything else.
    pub fn minimum_access(&self, target: &str) -> Flag {
        if self.name == target {
            Flag::PrivateOrHigher
        } else if package_of(&self.name) == package_of(target) {
            Flag::PackageOrHigher
        } else if self.ancestors.contains(target) {
            Flag::ProtectedOrHigher
        } else {
            Flag::Public
        }
    }
}
