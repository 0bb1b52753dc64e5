//! Collection followed by matching, against environments assembled in
//! memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use muzzle_check::{Environment, MatchResultCache, Mismatch, ReferenceMatcher, SymbolScanner};
use muzzle_classfile::ClassAssembler;
use muzzle_collect::{collect, Collection, CollectorConfig};
use muzzle_core::{
    access, ClassProvider, InMemoryProvider, MethodRef, MethodSig, ProviderError, Reference,
    ReferenceGraph, Source,
};

/// Counts every read that reaches the wrapped provider.
#[derive(Default)]
struct CountingProvider {
    inner: InMemoryProvider,
    reads: AtomicUsize,
}

impl CountingProvider {
    fn new(inner: InMemoryProvider) -> Arc<Self> {
        Arc::new(CountingProvider {
            inner,
            reads: AtomicUsize::new(0),
        })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ClassProvider for CountingProvider {
    fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find(name)
    }

    fn contains(&self, name: &str) -> Result<bool, ProviderError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.contains(name)
    }

    fn describe(&self) -> String {
        format!("counting {}", self.inner.describe())
    }
}

/// `agent.Advice` calls `external.Lib#helper()` at line 12.
fn advice_collection() -> Collection {
    let agent = InMemoryProvider::new().with(
        "agent.Advice",
        ClassAssembler::new("agent.Advice")
            .method(access::PUBLIC | access::STATIC, "enter", "()V", |code| {
                code.line(12)
                    .invoke_virtual("external.Lib", "helper", "()V")
                    .return_void();
            })
            .finish(),
    );
    collect(
        "agent.Advice",
        agent,
        CollectorConfig::with_internal_prefixes(["agent."]),
    )
    .unwrap()
}

fn matcher_for(collection: Collection) -> ReferenceMatcher {
    ReferenceMatcher::new(collection.references, collection.helper_classes)
}

/// A library where `Lib` only has `helper(int)`.
fn library_with_wrong_overload() -> InMemoryProvider {
    InMemoryProvider::new().with(
        "external.Lib",
        ClassAssembler::new("external.Lib")
            .declare_method(access::PUBLIC, "helper", "(I)V")
            .finish(),
    )
}

fn required_methods(class_name: &str, methods: &[&str]) -> ReferenceGraph {
    let mut builder = Reference::builder(class_name).source(Source::at("agent.Advice", 5));
    for name in methods {
        builder = builder.method(
            MethodRef::new(*name, MethodSig::parse("()V").unwrap())
                .with_source(Source::at("agent.Advice", 6)),
        );
    }
    ReferenceGraph::from_references([builder.build()]).unwrap()
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[test]
fn advice_against_wrong_overload_reports_one_missing_method() {
    let cache = MatchResultCache::new(matcher_for(advice_collection()));
    let env = Environment::new("app", library_with_wrong_overload());

    assert!(!cache.matches(&env));
    let mismatches = cache.get_mismatches(&env);
    assert_eq!(mismatches.len(), 1);
    match &mismatches[0] {
        Mismatch::MissingMethod {
            class_name, method, ..
        } => {
            assert_eq!(class_name, "external.Lib");
            assert_eq!(method, "helper()void");
        }
        other => panic!("expected a missing method, got {other:?}"),
    }
    insta::assert_snapshot!(
        mismatches[0].to_string(),
        @"agent.Advice:12 Missing method external.Lib#helper()void"
    );
}

#[test]
fn advice_against_matching_library_passes() {
    let matcher = matcher_for(advice_collection());
    let env = Environment::new(
        "app",
        InMemoryProvider::new().with(
            "external.Lib",
            ClassAssembler::new("external.Lib")
                .declare_method(access::PUBLIC, "helper", "()V")
                .finish(),
        ),
    );
    assert!(matcher.matches(&env));
}

#[test]
fn graph_without_external_requirements_matches_anything() {
    let agent = InMemoryProvider::new()
        .with(
            "agent.Advice",
            ClassAssembler::new("agent.Advice")
                .method(access::PUBLIC | access::STATIC, "enter", "()V", |code| {
                    code.invoke_static("agent.Helper", "assist", "()V").return_void();
                })
                .finish(),
        )
        .with(
            "agent.Helper",
            ClassAssembler::new("agent.Helper")
                .method(access::PUBLIC | access::STATIC, "assist", "()V", |code| {
                    code.return_void();
                })
                .finish(),
        );
    let collection = collect(
        "agent.Advice",
        agent,
        CollectorConfig::with_internal_prefixes(["agent."]),
    )
    .unwrap();
    assert_eq!(collection.helper_classes, ["agent.Helper"]);

    let matcher = matcher_for(collection);
    assert!(matcher.matches(&Environment::new("empty", InMemoryProvider::new())));
    assert!(matcher.matches(&Environment::new("app", library_with_wrong_overload())));
}

#[test]
fn missing_class_is_reported_once() {
    let matcher = ReferenceMatcher::new(
        required_methods("external.Lib", &["a", "b", "c"]),
        Vec::<String>::new(),
    );
    let mismatches = matcher.mismatches(&Environment::new("empty", InMemoryProvider::new()));
    assert_eq!(
        mismatches,
        [Mismatch::MissingClass {
            sources: vec![Source::at("agent.Advice", 5)],
            class_name: "external.Lib".to_string(),
        }]
    );
}

#[test]
fn missing_method_is_reported_once() {
    let matcher = ReferenceMatcher::new(
        required_methods("external.Lib", &["helper"]),
        Vec::<String>::new(),
    );
    let mismatches = matcher.mismatches(&Environment::new("app", library_with_wrong_overload()));
    assert_eq!(
        mismatches,
        [Mismatch::MissingMethod {
            sources: vec![Source::at("agent.Advice", 6)],
            class_name: "external.Lib".to_string(),
            method: "helper()void".to_string(),
        }]
    );
}

#[test]
fn private_supertype_method_does_not_satisfy_a_requirement() {
    let env = Environment::new(
        "app",
        InMemoryProvider::new()
            .with(
                "external.Lib",
                ClassAssembler::new("external.Lib").extends("external.Base").finish(),
            )
            .with(
                "external.Base",
                ClassAssembler::new("external.Base")
                    .declare_method(access::PRIVATE, "helper", "()V")
                    .finish(),
            ),
    );
    let matcher = ReferenceMatcher::new(
        required_methods("external.Lib", &["helper"]),
        Vec::<String>::new(),
    );
    let mismatches = matcher.mismatches(&env);
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].details(), "Missing method external.Lib#helper()void");
}

#[test]
fn bootstrap_tier_provides_types() {
    let env = Environment::with_bootstrap(
        "app",
        InMemoryProvider::new(),
        library_with_wrong_overload(),
    );
    let matcher =
        ReferenceMatcher::new(required_methods("external.Lib", &[]), Vec::<String>::new());
    assert!(matcher.matches(&env));
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

#[test]
fn second_lookup_does_not_resolve_again() {
    let provider = CountingProvider::new(library_with_wrong_overload());
    let env = Environment::new("app", Arc::clone(&provider));
    let cache = MatchResultCache::new(matcher_for(advice_collection()));

    let first = cache.get_mismatches(&env);
    // contains(Lib), find(Lib), find(java.lang.Object)
    assert_eq!(provider.reads(), 3);
    let second = cache.get_mismatches(&env);
    assert_eq!(first, second);
    assert_eq!(provider.reads(), 3);
    assert_eq!(cache.passes(), 1);

    // an uncached pass still reuses the scanned shapes
    cache.matcher().mismatches(&env);
    assert_eq!(provider.reads(), 4);
}

#[test]
fn concurrent_callers_share_one_pass() {
    let cache = MatchResultCache::new(matcher_for(advice_collection()));
    let env = Environment::new("app", library_with_wrong_overload());

    let results: Vec<Arc<[Mismatch]>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| cache.get_mismatches(&env)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(cache.passes(), 1);
    assert!(results.iter().all(|result| Arc::ptr_eq(result, &results[0])));
    assert_eq!(results[0].len(), 1);
}

#[test]
fn dropped_environment_is_released() {
    let cache = MatchResultCache::new(matcher_for(advice_collection()));
    let env = Environment::new("short-lived", library_with_wrong_overload());
    let weak = Arc::downgrade(&env);

    assert!(!cache.matches(&env));
    drop(env);
    assert!(weak.upgrade().is_none());

    assert_eq!(cache.purge(), 1);
    assert!(cache.is_empty());
    assert_eq!(cache.matcher().scanner().environments(), 0);
}

#[test]
fn matchers_can_share_a_scanner() {
    let scanner = Arc::new(SymbolScanner::with_platform_prefixes(["java."]));
    let env = Environment::new("app", library_with_wrong_overload());
    let no_helpers = Vec::<String>::new;
    let first = ReferenceMatcher::new(required_methods("external.Lib", &["helper"]), no_helpers())
        .with_scanner(Arc::clone(&scanner));
    let second = ReferenceMatcher::new(required_methods("external.Lib", &["other"]), no_helpers())
        .with_scanner(Arc::clone(&scanner));

    assert_eq!(first.mismatches(&env).len(), 1);
    let loads = scanner.loads();
    assert_eq!(second.mismatches(&env).len(), 1);
    assert_eq!(scanner.loads(), loads);
}

fn collect_advice(agent: InMemoryProvider) -> Collection {
    collect(
        "agent.Advice",
        agent,
        CollectorConfig::with_internal_prefixes(["agent."]),
    )
    .unwrap()
}

#[test]
fn methods_inherited_from_object_are_found_without_a_platform_tier() {
    let agent = InMemoryProvider::new().with(
        "agent.Advice",
        ClassAssembler::new("agent.Advice")
            .method(access::PUBLIC | access::STATIC, "enter", "()V", |code| {
                code.line(4)
                    .invoke_virtual("external.Lib", "toString", "()Ljava/lang/String;")
                    .invoke_virtual("external.Lib", "hashCode", "()I")
                    .return_void();
            })
            .finish(),
    );
    let matcher = matcher_for(collect_advice(agent));
    let env = Environment::new(
        "app",
        InMemoryProvider::new().with("external.Lib", ClassAssembler::new("external.Lib").finish()),
    );
    assert_eq!(matcher.mismatches(&env), Vec::<Mismatch>::new());
}

#[test]
fn unreadable_platform_superclass_may_declare_the_method() {
    let agent = InMemoryProvider::new().with(
        "agent.Advice",
        ClassAssembler::new("agent.Advice")
            .method(access::PUBLIC | access::STATIC, "enter", "()V", |code| {
                code.invoke_virtual("external.Items", "size", "()I").return_void();
            })
            .finish(),
    );
    let matcher = matcher_for(collect_advice(agent));
    let env = Environment::new(
        "app",
        InMemoryProvider::new().with(
            "external.Items",
            ClassAssembler::new("external.Items")
                .extends("java.util.AbstractList")
                .finish(),
        ),
    );
    assert!(matcher.matches(&env));
}

#[test]
fn helper_calling_back_into_the_advice_needs_nothing_from_the_environment() {
    let agent = InMemoryProvider::new()
        .with(
            "agent.Advice",
            ClassAssembler::new("agent.Advice")
                .method(access::PUBLIC | access::STATIC, "enter", "()V", |code| {
                    code.invoke_static("agent.Helper", "go", "()V").return_void();
                })
                .method(access::PUBLIC | access::STATIC, "util", "()V", |code| {
                    code.return_void();
                })
                .finish(),
        )
        .with(
            "agent.Helper",
            ClassAssembler::new("agent.Helper")
                .method(access::PUBLIC | access::STATIC, "go", "()V", |code| {
                    code.line(8)
                        .invoke_static("agent.Advice", "util", "()V")
                        .return_void();
                })
                .finish(),
        );
    let collection = collect_advice(agent);
    assert_eq!(collection.helper_classes, ["agent.Helper"]);
    assert!(!collection.references.contains("agent.Advice"));

    let matcher = matcher_for(collection);
    assert_eq!(
        matcher.mismatches(&Environment::new("empty", InMemoryProvider::new())),
        Vec::<Mismatch>::new()
    );
}

/// `agent.Advice` installs `agent.Handler`, a helper implementing the
/// library's `external.Listener`.
fn listener_agent(implements_on_event: bool) -> InMemoryProvider {
    let mut handler = ClassAssembler::new("agent.Handler")
        .implements("external.Listener")
        .method(access::PUBLIC | access::STATIC, "install", "()V", |code| {
            code.return_void();
        });
    if implements_on_event {
        handler = handler.method(access::PUBLIC, "onEvent", "()V", |code| {
            code.return_void();
        });
    }
    InMemoryProvider::new()
        .with(
            "agent.Advice",
            ClassAssembler::new("agent.Advice")
                .method(access::PUBLIC | access::STATIC, "enter", "()V", |code| {
                    code.invoke_static("agent.Handler", "install", "()V").return_void();
                })
                .finish(),
        )
        .with("agent.Handler", handler.finish())
}

fn listener_library() -> Arc<Environment> {
    Environment::new(
        "app",
        InMemoryProvider::new().with(
            "external.Listener",
            ClassAssembler::interface("external.Listener")
                .declare_method(access::PUBLIC | access::ABSTRACT, "onEvent", "()V")
                .finish(),
        ),
    )
}

#[test]
fn helper_leaving_a_library_method_unimplemented_is_reported() {
    let matcher = matcher_for(collect_advice(listener_agent(false)));
    let mismatches = matcher.mismatches(&listener_library());
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].details(), "Missing method agent.Handler#onEvent()void");
    assert!(mismatches[0]
        .sources()
        .contains(&Source::new("agent.Handler", None)));
}

#[test]
fn helper_implementing_the_library_interface_matches() {
    let matcher = matcher_for(collect_advice(listener_agent(true)));
    assert!(matcher.matches(&listener_library()));
}
