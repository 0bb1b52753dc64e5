//! Symbol table scanning.
//!
//! [`SymbolScanner::resolve`] reads a type's declarations from an
//! environment and caches the result per `(environment, name)`. Only the
//! requested type is read; supertypes are resolved when a lookup walks up
//! to them, through [`SymbolScanner::find_in_chain`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use muzzle_classfile::decode_headers;

use crate::environment::Environment;
use crate::error::ScanError;
use crate::shape::{Shape, OBJECT};
use crate::weak_cache::WeakCache;

/// `Ok(None)` means the environment has no such type.
pub type Resolution = Result<Option<Arc<Shape>>, ScanError>;

/// Resolutions of one environment, one single-flight cell per name.
#[derive(Default)]
struct ShapeTable {
    cells: DashMap<String, Arc<OnceLock<Resolution>>>,
}

impl ShapeTable {
    fn cell(&self, name: &str) -> Arc<OnceLock<Resolution>> {
        if let Some(cell) = self.cells.get(name) {
            return Arc::clone(&cell);
        }
        Arc::clone(&self.cells.entry(name.to_string()).or_default())
    }
}

/// Outcome of a lookup through a type's supertype chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainLookup<T> {
    Found(T),
    NotFound,
    /// A supertype on the way could not be resolved.
    MissingSupertype(String),
    /// Not declared by any readable type, but the chain reaches a platform
    /// type the environment cannot read, which may declare it.
    PlatformSupertype(String),
}

/// A supertype named in a chain, as the environment resolves it.
pub(crate) enum Link {
    Resolved(Arc<Shape>),
    /// A platform type the environment does not carry.
    Platform,
    Missing,
}

/// Resolves and caches shapes per environment.
#[derive(Default)]
pub struct SymbolScanner {
    tables: WeakCache<Arc<ShapeTable>>,
    loads: AtomicUsize,
    /// Unresolvable supertypes under these prefixes end a chain walk
    /// instead of failing it.
    platform_prefixes: Vec<String>,
}

impl SymbolScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_platform_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SymbolScanner {
            platform_prefixes: prefixes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The shape of `name` in `env`, reading it on first request only.
    pub fn resolve(&self, env: &Arc<Environment>, name: &str) -> Resolution {
        let table = self.tables.get_or_init(env, Default::default);
        table
            .cell(name)
            .get_or_init(|| self.load(env, name))
            .clone()
    }

    /// Searches `root` and then its supertypes, depth first: superclass
    /// chain before interfaces. `pick` receives each shape and whether it is
    /// the root; the first `Some` wins. Each type is visited once.
    pub fn find_in_chain<T>(
        &self,
        env: &Arc<Environment>,
        root: &Shape,
        mut pick: impl FnMut(&Shape, bool) -> Option<T>,
    ) -> Result<ChainLookup<T>, ScanError> {
        if let Some(found) = pick(root, true) {
            return Ok(ChainLookup::Found(found));
        }
        let mut seen: HashSet<String> = HashSet::from([root.name.clone()]);
        let mut stack: Vec<String> = Vec::new();
        push_supertypes(&mut stack, root);

        let mut unread_platform = None;
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let shape = match self.link(env, &name)? {
                Link::Resolved(shape) => shape,
                Link::Platform => {
                    unread_platform.get_or_insert(name);
                    continue;
                }
                Link::Missing => return Ok(ChainLookup::MissingSupertype(name)),
            };
            if let Some(found) = pick(&shape, false) {
                return Ok(ChainLookup::Found(found));
            }
            push_supertypes(&mut stack, &shape);
        }
        Ok(match unread_platform {
            Some(name) => ChainLookup::PlatformSupertype(name),
            None => ChainLookup::NotFound,
        })
    }

    /// Resolves a supertype. `java.lang.Object` falls back to its
    /// well-known shape when the environment cannot read it; other platform
    /// types the environment cannot read are [`Link::Platform`].
    pub(crate) fn link(&self, env: &Arc<Environment>, name: &str) -> Result<Link, ScanError> {
        if let Some(shape) = self.resolve(env, name)? {
            return Ok(Link::Resolved(shape));
        }
        if !self.is_platform(name) {
            return Ok(Link::Missing);
        }
        if name == OBJECT {
            return Ok(Link::Resolved(platform_object()));
        }
        Ok(Link::Platform)
    }

    /// How many shapes have been read from providers so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Forgets the shapes of dropped environments.
    pub fn purge(&self) -> usize {
        self.tables.purge()
    }

    /// Environments with cached shapes, live or not yet swept.
    pub fn environments(&self) -> usize {
        self.tables.len()
    }

    fn is_platform(&self, name: &str) -> bool {
        muzzle_core::names::has_any_prefix(name, &self.platform_prefixes)
    }

    fn load(&self, env: &Environment, name: &str) -> Resolution {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let Some(bytes) = env.find(name)? else {
            tracing::trace!(env = env.name(), name, "not found");
            return Ok(None);
        };
        let events = decode_headers(&bytes).map_err(|source| ScanError::Decode {
            name: name.to_string(),
            environment: env.name().to_string(),
            source,
        })?;
        let shape = Shape::from_events(&events).ok_or_else(|| ScanError::UnexpectedUnit {
            requested: name.to_string(),
            found: String::new(),
            environment: env.name().to_string(),
        })?;
        if shape.name != name {
            return Err(ScanError::UnexpectedUnit {
                requested: name.to_string(),
                found: shape.name,
                environment: env.name().to_string(),
            });
        }
        tracing::trace!(
            env = env.name(),
            name,
            methods = shape.methods().count(),
            "resolved shape"
        );
        Ok(Some(Arc::new(shape)))
    }
}

fn platform_object() -> Arc<Shape> {
    static OBJECT_SHAPE: OnceLock<Arc<Shape>> = OnceLock::new();
    Arc::clone(OBJECT_SHAPE.get_or_init(|| Arc::new(Shape::platform_object())))
}

/// Pushes so that the superclass is popped before the interfaces, and the
/// interfaces in declaration order.
fn push_supertypes(stack: &mut Vec<String>, shape: &Shape) {
    stack.extend(shape.interfaces.iter().rev().cloned());
    stack.extend(shape.super_name.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use muzzle_classfile::ClassAssembler;
    use muzzle_core::{access, InMemoryProvider};

    fn env() -> Arc<Environment> {
        Environment::new(
            "test",
            InMemoryProvider::new()
                .with(
                    "external.Lib",
                    ClassAssembler::new("external.Lib")
                        .extends("external.Base")
                        .implements("external.Api")
                        .finish(),
                )
                .with(
                    "external.Base",
                    ClassAssembler::new("external.Base")
                        .declare_method(access::PUBLIC, "base", "()V")
                        .finish(),
                )
                .with(
                    "external.Api",
                    ClassAssembler::interface("external.Api")
                        .declare_method(access::PUBLIC | access::ABSTRACT, "api", "()V")
                        .finish(),
                )
                .with("external.Renamed", ClassAssembler::new("external.Other").finish())
                .with("external.Corrupt", vec![0xCA, 0xFE, 0xBA, 0xBE]),
        )
    }

    fn scanner() -> SymbolScanner {
        SymbolScanner::with_platform_prefixes(["java."])
    }

    #[test]
    fn resolves_once_per_name() {
        let scanner = scanner();
        let env = env();
        let first = scanner.resolve(&env, "external.Lib").unwrap().unwrap();
        let second = scanner.resolve(&env, "external.Lib").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(scanner.loads(), 1);
        assert_eq!(first.super_name.as_deref(), Some("external.Base"));
    }

    #[test]
    fn absent_types_are_cached_too() {
        let scanner = scanner();
        let env = env();
        assert!(scanner.resolve(&env, "external.Gone").unwrap().is_none());
        assert!(scanner.resolve(&env, "external.Gone").unwrap().is_none());
        assert_eq!(scanner.loads(), 1);
    }

    #[test]
    fn malformed_units_are_errors() {
        let scanner = scanner();
        let env = env();
        assert!(matches!(
            scanner.resolve(&env, "external.Corrupt"),
            Err(ScanError::Decode { .. })
        ));
        match scanner.resolve(&env, "external.Renamed") {
            Err(ScanError::UnexpectedUnit { found, .. }) => assert_eq!(found, "external.Other"),
            other => panic!("expected an unexpected unit, got {other:?}"),
        }
    }

    #[test]
    fn chain_walk_visits_superclass_then_interfaces() {
        let scanner = scanner();
        let env = env();
        let lib = scanner.resolve(&env, "external.Lib").unwrap().unwrap();

        let mut visited = Vec::new();
        let lookup = scanner
            .find_in_chain(&env, &lib, |shape, _| {
                visited.push(shape.name.clone());
                shape.method("api()void").map(|m| m.access)
            })
            .unwrap();
        assert_eq!(lookup, ChainLookup::Found(access::PUBLIC | access::ABSTRACT));
        assert_eq!(
            visited,
            ["external.Lib", "external.Base", "java.lang.Object", "external.Api"]
        );
    }

    #[test]
    fn chain_walk_is_lazy() {
        let scanner = scanner();
        let env = env();
        let lib = scanner.resolve(&env, "external.Lib").unwrap().unwrap();
        let lookup = scanner
            .find_in_chain(&env, &lib, |shape, is_root| is_root.then(|| shape.name.clone()))
            .unwrap();
        assert_eq!(lookup, ChainLookup::Found("external.Lib".to_string()));
        assert_eq!(scanner.loads(), 1);
    }

    #[test]
    fn unresolvable_supertype_is_reported() {
        let scanner = scanner();
        let env = Environment::new(
            "partial",
            InMemoryProvider::new().with(
                "external.Child",
                ClassAssembler::new("external.Child").extends("external.Gone").finish(),
            ),
        );
        let child = scanner.resolve(&env, "external.Child").unwrap().unwrap();
        let lookup = scanner
            .find_in_chain(&env, &child, |shape, _| shape.method("x()void").map(|_| ()))
            .unwrap();
        assert_eq!(lookup, ChainLookup::MissingSupertype("external.Gone".to_string()));
    }

    #[test]
    fn unreadable_object_falls_back_to_its_known_shape() {
        let scanner = scanner();
        let env = env();
        let lib = scanner.resolve(&env, "external.Lib").unwrap().unwrap();
        let lookup = scanner
            .find_in_chain(&env, &lib, |shape, _| {
                shape.method("toString()java.lang.String").map(|m| m.access)
            })
            .unwrap();
        assert_eq!(lookup, ChainLookup::Found(access::PUBLIC));

        let lookup = scanner
            .find_in_chain(&env, &lib, |shape, _| shape.method("gone()void").map(|_| ()))
            .unwrap();
        assert_eq!(lookup, ChainLookup::NotFound);
    }

    #[test]
    fn unreadable_platform_supertype_may_declare_the_member() {
        let scanner = scanner();
        let env = Environment::new(
            "app",
            InMemoryProvider::new()
                .with(
                    "external.Items",
                    ClassAssembler::new("external.Items")
                        .extends("java.util.AbstractList")
                        .implements("external.Sized")
                        .finish(),
                )
                .with(
                    "external.Sized",
                    ClassAssembler::interface("external.Sized")
                        .declare_method(access::PUBLIC | access::ABSTRACT, "count", "()I")
                        .finish(),
                ),
        );
        let items = scanner.resolve(&env, "external.Items").unwrap().unwrap();
        let lookup = scanner
            .find_in_chain(&env, &items, |shape, _| shape.method("size()int").map(|_| ()))
            .unwrap();
        assert_eq!(
            lookup,
            ChainLookup::PlatformSupertype("java.util.AbstractList".to_string())
        );

        // a readable declaration still wins
        let lookup = scanner
            .find_in_chain(&env, &items, |shape, _| shape.method("count()int").map(|_| ()))
            .unwrap();
        assert_eq!(lookup, ChainLookup::Found(()));
    }

    #[test]
    fn without_platform_prefixes_object_must_be_readable() {
        let scanner = SymbolScanner::new();
        let env = env();
        let lib = scanner.resolve(&env, "external.Lib").unwrap().unwrap();
        let lookup = scanner
            .find_in_chain(&env, &lib, |shape, _| {
                shape.method("toString()java.lang.String").map(|_| ())
            })
            .unwrap();
        assert_eq!(
            lookup,
            ChainLookup::MissingSupertype("java.lang.Object".to_string())
        );
    }

    #[test]
    fn cyclic_supertypes_terminate() {
        let scanner = scanner();
        let env = Environment::new(
            "cyclic",
            InMemoryProvider::new()
                .with(
                    "external.A",
                    ClassAssembler::new("external.A").extends("external.B").finish(),
                )
                .with(
                    "external.B",
                    ClassAssembler::new("external.B").extends("external.A").finish(),
                ),
        );
        let a = scanner.resolve(&env, "external.A").unwrap().unwrap();
        let lookup = scanner
            .find_in_chain(&env, &a, |shape, _| shape.method("x()void").map(|_| ()))
            .unwrap();
        assert_eq!(lookup, ChainLookup::NotFound);
    }

    #[test]
    fn dropped_environments_release_their_shapes() {
        let scanner = scanner();
        let env = env();
        scanner.resolve(&env, "external.Lib").unwrap();
        assert_eq!(scanner.environments(), 1);
        drop(env);
        assert_eq!(scanner.purge(), 1);
        assert_eq!(scanner.environments(), 0);
    }
}
