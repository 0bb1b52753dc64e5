//! Compatibility matching of a reference graph against an environment.
//!
//! For every reference that is not an allowlisted helper:
//!
//! 1. the type must be present, else one `MissingClass` and nothing more;
//! 2. its class flags must match the found access mask;
//! 3. each field and method must be declared on the type or reachable
//!    through its supertypes. Private members of supertypes do not count.
//!    A found member must also satisfy the flags recorded for it.
//!
//! Helpers are shipped with the instrumentation and never looked up. They
//! are checked for completeness instead: a concrete helper must implement
//! the abstract methods of its hierarchy, and fields it uses without
//! declaring must exist above it.
//!
//! Resolution failures never abort the pass. They become a
//! `ReferenceCheckError` for the reference at hand, and the remaining
//! references are still checked.

use std::collections::BTreeSet;
use std::sync::Arc;

use muzzle_core::{access, Flag, Reference, ReferenceGraph, Source};

use crate::config::MatcherConfig;
use crate::environment::Environment;
use crate::error::ScanError;
use crate::helper_check::HelperCheck;
use crate::mismatch::Mismatch;
use crate::scanner::{ChainLookup, SymbolScanner};
use crate::shape::Shape;

/// Checks one reference graph. Shapes are cached in the scanner, which
/// may be shared between matchers.
pub struct ReferenceMatcher {
    graph: ReferenceGraph,
    helpers: BTreeSet<String>,
    config: MatcherConfig,
    scanner: Arc<SymbolScanner>,
}

impl ReferenceMatcher {
    pub fn new<I, S>(graph: ReferenceGraph, helper_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(graph, helper_classes, MatcherConfig::default())
    }

    pub fn with_config<I, S>(
        graph: ReferenceGraph,
        helper_classes: I,
        config: MatcherConfig,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scanner = Arc::new(SymbolScanner::with_platform_prefixes(
            config.platform_prefixes.iter().cloned(),
        ));
        ReferenceMatcher {
            graph,
            helpers: helper_classes.into_iter().map(Into::into).collect(),
            config,
            scanner,
        }
    }

    /// Replaces the shape scanner, e.g. with one shared by other matchers.
    pub fn with_scanner(mut self, scanner: Arc<SymbolScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn scanner(&self) -> &Arc<SymbolScanner> {
        &self.scanner
    }

    pub fn graph(&self) -> &ReferenceGraph {
        &self.graph
    }

    pub fn is_helper(&self, name: &str) -> bool {
        self.helpers.contains(name)
    }

    /// Every mismatch between the graph and `env`.
    pub fn mismatches(&self, env: &Arc<Environment>) -> Vec<Mismatch> {
        let helper_check = HelperCheck {
            scanner: &self.scanner,
            graph: &self.graph,
            helpers: &self.helpers,
            check_fields: self.config.check_fields,
        };
        let mut mismatches = Vec::new();
        let mut checked = 0usize;
        for reference in &self.graph {
            let outcome = if self.is_helper(&reference.class_name) {
                helper_check.check(env, reference)
            } else {
                checked += 1;
                self.try_check_reference(env, reference)
            };
            mismatches.extend(recover(env, reference, outcome));
        }
        tracing::debug!(
            env = env.name(),
            checked,
            helpers = self.graph.len() - checked,
            mismatches = mismatches.len(),
            "matched references"
        );
        mismatches
    }

    /// Shorthand for an empty [`mismatches`](Self::mismatches).
    pub fn matches(&self, env: &Arc<Environment>) -> bool {
        self.mismatches(env).is_empty()
    }

    fn try_check_reference(
        &self,
        env: &Arc<Environment>,
        reference: &Reference,
    ) -> Result<Vec<Mismatch>, ScanError> {
        let class_name = &reference.class_name;
        let missing_class = |name: &str| Mismatch::MissingClass {
            sources: sources(&reference.sources),
            class_name: name.to_string(),
        };

        if !env.contains(class_name)? {
            return Ok(vec![missing_class(class_name)]);
        }
        let Some(shape) = self.scanner.resolve(env, class_name)? else {
            return Ok(vec![missing_class(class_name)]);
        };

        let mut mismatches = Vec::new();
        if self.config.check_flags {
            self.check_flags(&mut mismatches, &reference.flags, shape.access, || {
                (sources(&reference.sources), class_name.clone())
            });
        }

        if self.config.check_fields {
            for field in reference.fields.values() {
                let key = field.key();
                match self.find_member(env, &shape, |shape| shape.field(&key).map(|f| f.access))? {
                    ChainLookup::Found(found) => {
                        if self.config.check_flags {
                            self.check_flags(&mut mismatches, &field.flags, found, || {
                                (sources(&field.sources), format!("{class_name}#{key}"))
                            });
                        }
                    }
                    ChainLookup::NotFound => mismatches.push(Mismatch::MissingField {
                        sources: sources(&field.sources),
                        class_name: class_name.clone(),
                        field: key,
                    }),
                    ChainLookup::MissingSupertype(name) => {
                        mismatches.push(missing_class(&name));
                        return Ok(mismatches);
                    }
                    ChainLookup::PlatformSupertype(platform) => {
                        tracing::trace!(
                            class = %class_name,
                            field = %key,
                            %platform,
                            "left to platform"
                        );
                    }
                }
            }
        }

        for method in reference.methods.values() {
            let key = method.key();
            match self.find_member(env, &shape, |shape| shape.method(&key).map(|m| m.access))? {
                ChainLookup::Found(found) => {
                    if self.config.check_flags {
                        self.check_flags(&mut mismatches, &method.flags, found, || {
                            (sources(&method.sources), format!("{class_name}#{key}"))
                        });
                    }
                }
                ChainLookup::NotFound => mismatches.push(Mismatch::MissingMethod {
                    sources: sources(&method.sources),
                    class_name: class_name.clone(),
                    method: key,
                }),
                ChainLookup::MissingSupertype(name) => {
                    mismatches.push(missing_class(&name));
                    return Ok(mismatches);
                }
                ChainLookup::PlatformSupertype(platform) => {
                    tracing::trace!(
                        class = %class_name,
                        method = %key,
                        %platform,
                        "left to platform"
                    );
                }
            }
        }
        Ok(mismatches)
    }

    /// Looks a member up on `shape` and its supertypes. `access_of` returns
    /// the access mask of the member if the given shape declares it.
    fn find_member(
        &self,
        env: &Arc<Environment>,
        shape: &Shape,
        access_of: impl Fn(&Shape) -> Option<u16>,
    ) -> Result<ChainLookup<u16>, ScanError> {
        self.scanner.find_in_chain(env, shape, |candidate, is_root| {
            access_of(candidate).filter(|mask| is_root || mask & access::PRIVATE == 0)
        })
    }

    fn check_flags(
        &self,
        mismatches: &mut Vec<Mismatch>,
        flags: &BTreeSet<Flag>,
        found: u16,
        describe: impl Fn() -> (Vec<Source>, String),
    ) {
        for &flag in flags {
            if !flag.matches(found) {
                let (sources, target) = describe();
                mismatches.push(Mismatch::MissingFlag {
                    sources,
                    target,
                    flag,
                    found,
                });
            }
        }
    }
}

/// Turns a failed check into a single mismatch for that reference.
fn recover(
    env: &Environment,
    reference: &Reference,
    outcome: Result<Vec<Mismatch>, ScanError>,
) -> Vec<Mismatch> {
    outcome.unwrap_or_else(|err| {
        tracing::warn!(
            env = env.name(),
            class = %reference.class_name,
            error = %err,
            "reference check failed"
        );
        vec![Mismatch::ReferenceCheckError {
            class_name: reference.class_name.clone(),
            environment: env.name().to_string(),
            detail: err.to_string(),
        }]
    })
}

fn sources(set: &BTreeSet<Source>) -> Vec<Source> {
    set.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use muzzle_classfile::ClassAssembler;
    use muzzle_core::{FieldRef, InMemoryProvider, MethodRef, MethodSig, TypeSig};
    use proptest::prelude::*;

    fn method(name: &str, descriptor: &str) -> MethodRef {
        MethodRef::new(name, MethodSig::parse(descriptor).unwrap())
            .with_source(Source::at("agent.Advice", 7))
    }

    fn env() -> Arc<Environment> {
        Environment::new(
            "app",
            InMemoryProvider::new()
                .with(
                    "external.Lib",
                    ClassAssembler::new("external.Lib")
                        .access(access::PUBLIC | access::FINAL)
                        .extends("external.Base")
                        .field(access::PUBLIC, "count", "I")
                        .declare_method(access::PUBLIC, "run", "()V")
                        .declare_method(access::PRIVATE, "own", "()V")
                        .finish(),
                )
                .with(
                    "external.Base",
                    ClassAssembler::new("external.Base")
                        .field(access::PRIVATE, "secret", "I")
                        .declare_method(access::PUBLIC | access::STATIC, "make", "()V")
                        .declare_method(access::PRIVATE, "hidden", "()V")
                        .finish(),
                ),
        )
    }

    fn matcher(reference: Reference) -> ReferenceMatcher {
        ReferenceMatcher::new(
            ReferenceGraph::from_references([reference]).unwrap(),
            Vec::<String>::new(),
        )
    }

    #[test]
    fn inherited_members_are_found() {
        let reference = Reference::builder("external.Lib")
            .method(method("make", "()V").with_flag(Flag::Static))
            .method(method("run", "()V").with_flag(Flag::NonStatic))
            .build();
        assert!(matcher(reference).matches(&env()));
    }

    #[test]
    fn private_members_only_count_on_the_type_itself() {
        let reference = Reference::builder("external.Lib")
            .method(method("own", "()V"))
            .method(method("hidden", "()V"))
            .field(FieldRef::new("secret", TypeSig::parse("I").unwrap()))
            .build();
        let mismatches = matcher(reference).mismatches(&env());
        let details: Vec<String> = mismatches.iter().map(Mismatch::details).collect();
        assert_eq!(
            details,
            [
                "Missing field external.Lib#secret:int",
                "Missing method external.Lib#hidden()void",
            ]
        );
    }

    #[test]
    fn flags_are_checked_on_classes_and_members() {
        let reference = Reference::builder("external.Lib")
            .flag(Flag::NonFinal)
            .method(method("make", "()V").with_flag(Flag::NonStatic))
            .field(
                FieldRef::new("count", TypeSig::parse("I").unwrap())
                    .with_flag(Flag::Static)
                    .with_source(Source::at("agent.Advice", 9)),
            )
            .build();
        let mismatches = matcher(reference).mismatches(&env());
        let details: Vec<String> = mismatches.iter().map(Mismatch::details).collect();
        assert_eq!(
            details,
            [
                "external.Lib requires flag NON_FINAL found 0x0011",
                "external.Lib#count:int requires flag STATIC found 0x0001",
                "external.Lib#make()void requires flag NON_STATIC found 0x0009",
            ]
        );
        assert_eq!(mismatches[1].sources(), [Source::at("agent.Advice", 9)]);
    }

    #[test]
    fn toggles_disable_flag_and_field_checks() {
        let reference = Reference::builder("external.Lib")
            .flag(Flag::NonFinal)
            .field(FieldRef::new("absent", TypeSig::parse("J").unwrap()))
            .build();
        let config = MatcherConfig {
            check_flags: false,
            check_fields: false,
            ..MatcherConfig::default()
        };
        let matcher = ReferenceMatcher::with_config(
            ReferenceGraph::from_references([reference]).unwrap(),
            Vec::<String>::new(),
            config,
        );
        assert!(matcher.matches(&env()));
    }

    #[test]
    fn missing_supertype_ends_the_reference() {
        let env = Environment::new(
            "partial",
            InMemoryProvider::new().with(
                "external.Child",
                ClassAssembler::new("external.Child").extends("external.Gone").finish(),
            ),
        );
        let reference = Reference::builder("external.Child")
            .source(Source::at("agent.Advice", 3))
            .method(method("a", "()V"))
            .method(method("b", "()V"))
            .build();
        let mismatches = matcher(reference).mismatches(&env);
        assert_eq!(
            mismatches,
            [Mismatch::MissingClass {
                sources: vec![Source::at("agent.Advice", 3)],
                class_name: "external.Gone".to_string(),
            }]
        );
    }

    #[test]
    fn helpers_are_not_looked_up_in_the_environment() {
        let graph = ReferenceGraph::from_references([Reference::new("agent.Helper")]).unwrap();
        let matcher = ReferenceMatcher::new(graph, ["agent.Helper"]);
        assert!(matcher.is_helper("agent.Helper"));
        assert!(matcher.matches(&env()));
    }

    #[test]
    fn helper_fields_are_checked_against_library_supertypes() {
        let int = || TypeSig::parse("I").unwrap();
        let helper = Reference::builder("agent.Helper")
            .super_name("external.Base")
            .field(FieldRef::new("secret", int()).with_source(Source::at("agent.Helper", 4)))
            .build();
        let graph = ReferenceGraph::from_references([helper]).unwrap();

        let checked = ReferenceMatcher::new(graph.clone(), ["agent.Helper"]);
        let mismatches = checked.mismatches(&env());
        let details: Vec<String> = mismatches.iter().map(Mismatch::details).collect();
        assert_eq!(details, ["Missing field agent.Helper#secret:int"]);

        let config = MatcherConfig {
            check_fields: false,
            ..MatcherConfig::default()
        };
        let unchecked = ReferenceMatcher::with_config(graph, ["agent.Helper"], config);
        assert!(unchecked.matches(&env()));
    }

    #[test]
    fn resolution_failures_become_mismatches() {
        let env = Environment::new(
            "broken",
            InMemoryProvider::new()
                .with("external.Corrupt", vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0])
                .with("external.Fine", ClassAssembler::new("external.Fine").finish()),
        );
        let graph = ReferenceGraph::from_references([
            Reference::builder("external.Corrupt")
                .method(method("x", "()V"))
                .build(),
            Reference::builder("external.Fine")
                .method(method("gone", "()V"))
                .build(),
        ])
        .unwrap();
        let mismatches = ReferenceMatcher::new(graph, Vec::<String>::new()).mismatches(&env);
        assert_eq!(mismatches.len(), 2);
        assert!(matches!(
            &mismatches[0],
            Mismatch::ReferenceCheckError { class_name, environment, .. }
                if class_name == "external.Corrupt" && environment == "broken"
        ));
        assert!(matches!(&mismatches[1], Mismatch::MissingMethod { .. }));
    }

    const NAMES: [&str; 6] = ["open", "close", "read", "write", "flush", "size"];

    proptest! {
        #[test]
        fn missing_methods_are_exactly_the_undeclared_ones(
            declared in proptest::collection::btree_set(0..NAMES.len(), 0..=NAMES.len()),
            required in proptest::collection::btree_set(0..NAMES.len(), 0..=NAMES.len()),
            on_base in any::<bool>(),
        ) {
            // declarations live either on the type or on its superclass
            let mut owner = ClassAssembler::new(owner_name(on_base));
            for &i in &declared {
                owner = owner.declare_method(access::PUBLIC, NAMES[i], "()V");
            }
            let mut provider = InMemoryProvider::new().with(owner_name(on_base), owner.finish());
            if on_base {
                provider = provider.with(
                    "external.Lib",
                    ClassAssembler::new("external.Lib").extends("external.Base").finish(),
                );
            }
            let env = Environment::new("app", provider);

            let mut builder = Reference::builder("external.Lib");
            for &i in &required {
                builder = builder.method(method(NAMES[i], "()V"));
            }
            let mismatches = matcher(builder.build()).mismatches(&env);

            let missing: BTreeSet<String> = mismatches
                .iter()
                .map(|m| match m {
                    Mismatch::MissingMethod { method, .. } => Ok(method.clone()),
                    other => Err(other.details()),
                })
                .collect::<Result<_, _>>()
                .map_err(TestCaseError::fail)?;
            let expected: BTreeSet<String> = required
                .difference(&declared)
                .map(|&i| format!("{}()void", NAMES[i]))
                .collect();
            prop_assert_eq!(missing, expected);
        }
    }

    fn owner_name(on_base: bool) -> &'static str {
        if on_base {
            "external.Base"
        } else {
            "external.Lib"
        }
    }
}
