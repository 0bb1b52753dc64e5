//! Collector configuration.

use muzzle_core::names::has_any_prefix;
use serde::{Deserialize, Serialize};

/// Settings for a [`Collector`](crate::Collector).
///
/// `internal_prefixes` builds the default internal-namespace predicate; a
/// custom predicate can be supplied with
/// [`Collector::with_predicate`](crate::Collector::with_predicate) instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Symbols the platform always provides. They are never recorded.
    pub platform_prefixes: Vec<String>,
    /// Symbols under these prefixes are internal: decoded, traversed and
    /// injected as helpers.
    pub internal_prefixes: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            platform_prefixes: vec!["java.".to_string()],
            internal_prefixes: Vec::new(),
        }
    }
}

impl CollectorConfig {
    /// A default configuration with the given internal prefixes.
    pub fn with_internal_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CollectorConfig {
            internal_prefixes: prefixes.into_iter().map(Into::into).collect(),
            ..CollectorConfig::default()
        }
    }

    pub fn is_platform(&self, name: &str) -> bool {
        has_any_prefix(name, &self.platform_prefixes)
    }

    pub fn is_internal(&self, name: &str) -> bool {
        has_any_prefix(name, &self.internal_prefixes)
    }
}
