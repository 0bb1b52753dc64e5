//! Completeness of helper units.
//!
//! Helpers are injected, so their presence is never checked. What can still
//! go wrong is the hierarchy they join: a helper that extends a library type
//! must implement every abstract method the library declares, and fields it
//! uses without declaring must exist somewhere above it.
//!
//! The helper is treated as a bag of members gathered from itself, its helper
//! supertypes (from the reference graph) and its library supertypes (from the
//! environment).

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use muzzle_core::{access, Flag, FlagKind, MethodRef, Reference, ReferenceGraph};

use crate::environment::Environment;
use crate::error::ScanError;
use crate::mismatch::Mismatch;
use crate::scanner::{ChainLookup, Link, SymbolScanner};
use crate::shape::Shape;

pub(crate) struct HelperCheck<'a> {
    pub(crate) scanner: &'a SymbolScanner,
    pub(crate) graph: &'a ReferenceGraph,
    pub(crate) helpers: &'a BTreeSet<String>,
    pub(crate) check_fields: bool,
}

/// Member keys visible somewhere in a helper's hierarchy.
#[derive(Debug, Default)]
struct Members {
    fields: BTreeSet<String>,
    abstract_methods: BTreeSet<String>,
    plain_methods: BTreeSet<String>,
}

impl Members {
    fn add_method(&mut self, key: String, is_abstract: bool) {
        if is_abstract {
            self.abstract_methods.insert(key);
        } else {
            self.plain_methods.insert(key);
        }
    }

    /// Private fields count only on the helper being checked.
    fn add_helper(&mut self, helper: &Reference, is_root: bool) {
        self.fields.extend(
            helper
                .fields
                .values()
                .filter(|field| field.declared)
                .filter(|field| is_root || !field.flags.contains(&Flag::Private))
                .map(|field| field.key()),
        );
        for method in helper.methods.values().filter(|m| is_inherited_declaration(m)) {
            self.add_method(method.key(), method.flags.contains(&Flag::Abstract));
        }
    }

    fn add_library(&mut self, shape: &Shape) {
        self.fields.extend(
            shape
                .fields()
                .filter(|field| field.access & access::PRIVATE == 0)
                .map(|field| format!("{}:{}", field.name, field.ty)),
        );
        for method in shape.methods() {
            if method.name.starts_with('<')
                || method.access & (access::PRIVATE | access::STATIC) != 0
            {
                continue;
            }
            let key = format!("{}{}", method.name, method.sig);
            self.add_method(key, method.access & access::ABSTRACT != 0);
        }
    }
}

/// Self-declared methods carry their exact visibility; methods only called
/// on the helper do not.
fn is_inherited_declaration(method: &MethodRef) -> bool {
    !method.flags.contains(&Flag::Private)
        && method
            .flags
            .iter()
            .any(|flag| flag.kind() == FlagKind::Visibility)
}

impl HelperCheck<'_> {
    pub(crate) fn check(
        &self,
        env: &Arc<Environment>,
        helper: &Reference,
    ) -> Result<Vec<Mismatch>, ScanError> {
        let sources = || helper.sources.iter().cloned().collect::<Vec<_>>();
        let missing_class = |name: String| {
            vec![Mismatch::MissingClass {
                sources: sources(),
                class_name: name,
            }]
        };

        let mut members = Members::default();
        let mut seen = HashSet::new();
        let mut pending = vec![helper.class_name.clone()];
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if self.helpers.contains(&name) {
                if let Some(reference) = self.graph.get(&name) {
                    members.add_helper(reference, name == helper.class_name);
                    pending.extend(
                        reference
                            .super_name
                            .iter()
                            .chain(&reference.interfaces)
                            .cloned(),
                    );
                }
                continue;
            }
            match self.scanner.link(env, &name)? {
                Link::Resolved(shape) => {
                    let lookup = self.scanner.find_in_chain(env, &shape, |shape, _| {
                        members.add_library(shape);
                        None::<()>
                    })?;
                    if let ChainLookup::MissingSupertype(missing) = lookup {
                        return Ok(missing_class(missing));
                    }
                }
                Link::Platform => {}
                Link::Missing => return Ok(missing_class(name)),
            }
        }

        let mut mismatches = Vec::new();
        if self.check_fields {
            for field in helper.fields.values().filter(|field| !field.declared) {
                let key = field.key();
                if !members.fields.contains(&key) {
                    mismatches.push(Mismatch::MissingField {
                        sources: field.sources.iter().cloned().collect(),
                        class_name: helper.class_name.clone(),
                        field: key,
                    });
                }
            }
        }

        let has_supertypes = helper.super_name.is_some() || !helper.interfaces.is_empty();
        if helper.flags.contains(&Flag::Abstract) || !has_supertypes {
            return Ok(mismatches);
        }
        for key in members.abstract_methods.difference(&members.plain_methods) {
            mismatches.push(Mismatch::MissingMethod {
                sources: sources(),
                class_name: helper.class_name.clone(),
                method: key.clone(),
            });
        }
        Ok(mismatches)
    }
}
