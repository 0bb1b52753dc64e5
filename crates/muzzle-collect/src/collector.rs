//! Transitive reference collection over internal units.
//!
//! A [`Collector`] walks a breadth-first work queue seeded with one or more
//! roots. Each internal unit is decoded once and folded into references;
//! internal symbols it mentions are queued, external ones stay leaves. The
//! visited set bounds the walk on cyclic hierarchies.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use muzzle_classfile::{decode, decode_headers, ClassEvent};
use muzzle_core::{ClassProvider, CoreError, ReferenceGraph};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::helpers::HelperGraph;
use crate::prune::prune;
use crate::visibility::Accessor;
use crate::visitor::UnitVisitor;

/// Resource files that name implementations to load, one per line: service
/// provider files and the AWS SDK request handler lists.
const PROVIDER_RESOURCE: &str = concat!(
    r"^(?:META-INF/services/.*",
    r"|software/amazon/awssdk/global/handlers/execution\.interceptors",
    r"|software/amazon/awssdk/services/\w+(?:/\w+)?/execution\.interceptors",
    r"|com/amazonaws/global/handlers/request\.handler2s",
    r"|com/amazonaws/services/\w+(?:/\w+)?/request\.handler2s)$",
);

/// Whether a resource at `path` lists implementations to collect from.
pub fn is_provider_resource(path: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PROVIDER_RESOURCE).expect("resource pattern should compile"))
        .is_match(path)
}

/// The result of a collection: everything needed to check and inject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    pub references: ReferenceGraph,
    /// Helpers in injection order, supertypes first.
    pub helper_classes: Vec<String>,
    pub helper_graph: HelperGraph,
}

impl Collection {
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone)]
struct Supertypes {
    super_name: Option<String>,
    interfaces: Vec<String>,
}

impl Supertypes {
    fn iter(&self) -> impl Iterator<Item = &String> {
        self.super_name.iter().chain(&self.interfaces)
    }
}

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Collects references from advice roots and resource files.
pub struct Collector<P> {
    provider: P,
    config: CollectorConfig,
    is_internal: Predicate,
    graph: ReferenceGraph,
    helpers: HelperGraph,
    advice: BTreeSet<String>,
    visited: HashSet<String>,
    /// Header cache for ancestor lookups. `None` when the unit is absent.
    headers: HashMap<String, Option<Supertypes>>,
}

impl<P: ClassProvider> Collector<P> {
    /// A collector whose internal predicate is built from
    /// `config.internal_prefixes`.
    pub fn new(provider: P, config: CollectorConfig) -> Self {
        let prefixes = config.internal_prefixes.clone();
        let is_internal: Predicate =
            Box::new(move |name: &str| prefixes.iter().any(|p| name.starts_with(p.as_str())));
        Collector {
            provider,
            config,
            is_internal,
            graph: ReferenceGraph::new(),
            helpers: HelperGraph::new(),
            advice: BTreeSet::new(),
            visited: HashSet::new(),
            headers: HashMap::new(),
        }
    }

    /// Replaces the internal-namespace predicate.
    pub fn with_predicate(
        mut self,
        is_internal: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_internal = Box::new(is_internal);
        self
    }

    pub fn is_internal(&self, name: &str) -> bool {
        (self.is_internal)(name)
    }

    /// The references collected so far.
    pub fn references(&self) -> &ReferenceGraph {
        &self.graph
    }

    /// Collects from an advice root. The root's own shape is not recorded
    /// and the root never becomes a helper.
    pub fn collect_from_advice(&mut self, advice: &str) -> Result<(), CollectError> {
        self.advice.insert(advice.to_string());
        self.visit_all([advice.to_string()], true)
    }

    /// Collects from a resource file. Only files matching
    /// [`is_provider_resource`] are read; every implementation they name
    /// becomes a root.
    pub fn collect_from_resource(
        &mut self,
        path: &str,
        contents: &str,
    ) -> Result<(), CollectError> {
        if !is_provider_resource(path) {
            tracing::debug!(path, "ignoring resource");
            return Ok(());
        }
        let roots: Vec<String> = contents
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if roots.is_empty() {
            return Err(CollectError::InvalidResource {
                path: path.to_string(),
                reason: "names no implementations".to_string(),
            });
        }
        self.visit_all(roots, false)
    }

    /// Drops helper references that no library supertype depends on.
    pub fn prune(&mut self) {
        prune(&mut self.graph, &self.config, &*self.is_internal);
    }

    /// Finishes collection, computing the helper injection order.
    pub fn finish(mut self) -> Result<Collection, CollectError> {
        // advice code is inlined into the target, so references back into
        // it from helpers name no class the environment has to provide
        for advice in &self.advice {
            self.helpers.remove_node(advice);
            self.graph.remove(advice);
        }
        let helper_classes = self.helpers.sorted()?;
        tracing::debug!(
            references = self.graph.len(),
            helpers = helper_classes.len(),
            "collection finished"
        );
        Ok(Collection {
            references: self.graph,
            helper_classes,
            helper_graph: self.helpers,
        })
    }

    fn visit_all(
        &mut self,
        roots: impl IntoIterator<Item = String>,
        starts_from_advice: bool,
    ) -> Result<(), CollectError> {
        let mut queue: VecDeque<String> = roots.into_iter().collect();
        let mut is_advice = starts_from_advice;

        while let Some(name) = queue.pop_front() {
            if self.visited.insert(name.clone()) {
                self.visit_unit(&name, is_advice, &mut queue)?;
            }
            is_advice = false;
        }
        Ok(())
    }

    fn visit_unit(
        &mut self,
        name: &str,
        is_advice: bool,
        queue: &mut VecDeque<String>,
    ) -> Result<(), CollectError> {
        let bytes = self
            .provider
            .find(name)?
            .ok_or_else(|| CollectError::MissingUnit {
                name: name.to_string(),
            })?;
        let events = decode(&bytes).map_err(|source| CollectError::Decode {
            unit: name.to_string(),
            source,
        })?;

        let supertypes = header_supertypes(&events);
        self.headers.insert(name.to_string(), supertypes.clone());
        let accessor = Accessor::new(name).with_ancestors(self.ancestors(supertypes)?);

        let unit = UnitVisitor::new(&self.config, &*self.is_internal, accessor, is_advice)
            .visit_all(&events)?;
        tracing::debug!(
            unit = name,
            advice = is_advice,
            references = unit.references.len(),
            "visited unit"
        );

        for (ref_name, reference) in unit.references {
            if !self.visited.contains(&ref_name) && self.is_internal(&ref_name) {
                queue.push_back(ref_name);
            }
            self.graph.insert(reference)?;
        }
        for helper in &unit.helper_classes {
            self.helpers.add_node(helper);
        }
        if !is_advice {
            for parent in &unit.helper_supers {
                self.helpers.add_edge(name, parent);
            }
        }
        Ok(())
    }

    /// Every supertype reachable through internal headers, starting from a
    /// unit's direct supertypes.
    fn ancestors(&mut self, direct: Option<Supertypes>) -> Result<BTreeSet<String>, CollectError> {
        let mut ancestors = BTreeSet::new();
        let mut pending: VecDeque<String> = direct
            .iter()
            .flat_map(Supertypes::iter)
            .cloned()
            .collect();
        while let Some(parent) = pending.pop_front() {
            if !ancestors.insert(parent.clone()) || !self.is_internal(&parent) {
                continue;
            }
            if let Some(supertypes) = self.supertypes_of(&parent)? {
                pending.extend(supertypes.iter().cloned());
            }
        }
        Ok(ancestors)
    }

    fn supertypes_of(&mut self, name: &str) -> Result<Option<Supertypes>, CollectError> {
        if let Some(cached) = self.headers.get(name) {
            return Ok(cached.clone());
        }
        let supertypes = match self.provider.find(name)? {
            Some(bytes) => {
                let events = decode_headers(&bytes).map_err(|source| CollectError::Decode {
                    unit: name.to_string(),
                    source,
                })?;
                header_supertypes(&events)
            }
            None => None,
        };
        self.headers.insert(name.to_string(), supertypes.clone());
        Ok(supertypes)
    }
}

fn header_supertypes(events: &[ClassEvent]) -> Option<Supertypes> {
    match events.first() {
        Some(ClassEvent::TypeHeader {
            super_name,
            interfaces,
            ..
        }) => Some(Supertypes {
            super_name: super_name.clone(),
            interfaces: interfaces.clone(),
        }),
        _ => None,
    }
}

/// Collects a single advice root in one call.
pub fn collect<P: ClassProvider>(
    advice: &str,
    provider: P,
    config: CollectorConfig,
) -> Result<Collection, CollectError> {
    let mut collector = Collector::new(provider, config);
    collector.collect_from_advice(advice)?;
    collector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use muzzle_classfile::ClassAssembler;
    use muzzle_core::{access, InMemoryProvider};

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new()
            .with(
                "agent.Advice",
                ClassAssembler::new("agent.Advice")
                    .method(access::PUBLIC | access::STATIC, "enter", "()V", |code| {
                        code.new_object("agent.Impl").return_void();
                    })
                    .finish(),
            )
            .with(
                "agent.Impl",
                ClassAssembler::new("agent.Impl").extends("agent.Base").finish(),
            )
            .with(
                "agent.Base",
                ClassAssembler::new("agent.Base")
                    .extends("external.Lib")
                    .access(access::PUBLIC | access::ABSTRACT)
                    .finish(),
            )
    }

    fn config() -> CollectorConfig {
        CollectorConfig::with_internal_prefixes(["agent."])
    }

    #[test]
    fn follows_internal_units_and_sorts_helpers() {
        let collection = collect("agent.Advice", provider(), config()).unwrap();
        assert_eq!(collection.helper_classes, ["agent.Base", "agent.Impl"]);
        assert!(collection.references.contains("external.Lib"));
        assert!(!collection.references.contains("agent.Advice"));
    }

    #[test]
    fn ancestors_follow_internal_headers() {
        let mut collector = Collector::new(provider(), config());
        let direct = Supertypes {
            super_name: Some("agent.Base".to_string()),
            interfaces: Vec::new(),
        };
        let ancestors = collector.ancestors(Some(direct)).unwrap();
        let names: Vec<&str> = ancestors.iter().map(String::as_str).collect();
        assert_eq!(names, ["agent.Base", "external.Lib"]);
    }

    #[test]
    fn missing_internal_unit_is_fatal() {
        let provider = InMemoryProvider::new().with(
            "agent.Advice",
            ClassAssembler::new("agent.Advice")
                .method(access::PUBLIC | access::STATIC, "enter", "()V", |code| {
                    code.invoke_static("agent.Gone", "run", "()V").return_void();
                })
                .finish(),
        );
        match collect("agent.Advice", provider, config()) {
            Err(CollectError::MissingUnit { name }) => assert_eq!(name, "agent.Gone"),
            other => panic!("expected a missing unit, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_internal_unit_is_fatal() {
        let provider = InMemoryProvider::new().with("agent.Advice", vec![0xCA, 0xFE]);
        assert!(matches!(
            collect("agent.Advice", provider, config()),
            Err(CollectError::Decode { .. })
        ));
    }

    #[test]
    fn non_service_resources_are_ignored() {
        let mut collector = Collector::new(provider(), config());
        collector
            .collect_from_resource("META-INF/MANIFEST.MF", "Main-Class: x")
            .unwrap();
        assert!(collector.references().is_empty());
    }

    #[test]
    fn empty_service_file_is_rejected() {
        let mut collector = Collector::new(provider(), config());
        let result = collector.collect_from_resource("META-INF/services/x.Spi", "# nothing\n\n");
        assert!(matches!(result, Err(CollectError::InvalidResource { .. })));
    }

    #[test]
    fn provider_resources_include_sdk_handler_lists() {
        for path in [
            "META-INF/services/external.Spi",
            "software/amazon/awssdk/global/handlers/execution.interceptors",
            "software/amazon/awssdk/services/s3/execution.interceptors",
            "software/amazon/awssdk/services/s3/control/execution.interceptors",
            "com/amazonaws/global/handlers/request.handler2s",
            "com/amazonaws/services/sqs/request.handler2s",
            "com/amazonaws/services/sqs/model/request.handler2s",
        ] {
            assert!(is_provider_resource(path), "{path}");
        }
        for path in [
            "application.properties",
            "software/amazon/awssdk/services/execution.interceptors",
            "software/amazon/awssdk/services/a/b/c/execution.interceptors",
            "com/amazonaws/services/sqs/request_handler2s",
            "prefix/META-INF/services/external.Spi",
        ] {
            assert!(!is_provider_resource(path), "{path}");
        }
    }

    #[test]
    fn sdk_handler_list_names_roots() {
        let mut collector = Collector::new(provider(), config());
        collector
            .collect_from_resource(
                "software/amazon/awssdk/global/handlers/execution.interceptors",
                "agent.Impl\n",
            )
            .unwrap();
        let collection = collector.finish().unwrap();
        assert_eq!(collection.helper_classes, ["agent.Base", "agent.Impl"]);
    }

    #[test]
    fn helper_calls_back_into_the_advice() {
        let provider = InMemoryProvider::new()
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
                        code.invoke_static("agent.Advice", "util", "()V").return_void();
                    })
                    .finish(),
            );
        let collection = collect("agent.Advice", provider, config()).unwrap();
        assert_eq!(collection.helper_classes, ["agent.Helper"]);
        assert!(!collection.references.contains("agent.Advice"));
        assert!(!collection.helper_graph.contains("agent.Advice"));
    }
}
