//! Target environments.
//!
//! An [`Environment`] is the runtime context references are checked
//! against: a named provider of compiled units, optionally backed by a
//! privileged bootstrap provider that is consulted first. Environments are
//! always handled as `Arc<Environment>`; caches key on the
//! [`EnvironmentId`] and only ever hold a `Weak` to the environment itself.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use muzzle_core::{ClassProvider, ProviderError};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique environment identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvironmentId(pub u64);

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env-{}", self.0)
    }
}

pub struct Environment {
    id: EnvironmentId,
    name: String,
    provider: Box<dyn ClassProvider>,
    bootstrap: Option<Box<dyn ClassProvider>>,
}

impl Environment {
    /// An environment without a bootstrap tier.
    pub fn new(name: impl Into<String>, provider: impl ClassProvider + 'static) -> Arc<Self> {
        Arc::new(Environment {
            id: EnvironmentId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            provider: Box::new(provider),
            bootstrap: None,
        })
    }

    /// An environment whose `bootstrap` provider is searched before its own.
    pub fn with_bootstrap(
        name: impl Into<String>,
        provider: impl ClassProvider + 'static,
        bootstrap: impl ClassProvider + 'static,
    ) -> Arc<Self> {
        Arc::new(Environment {
            id: EnvironmentId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            provider: Box::new(provider),
            bootstrap: Some(Box::new(bootstrap)),
        })
    }

    pub fn id(&self) -> EnvironmentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Presence check across both tiers.
    pub fn contains(&self, name: &str) -> Result<bool, ScanError> {
        for tier in self.tiers() {
            if tier.contains(name).map_err(|err| self.provider_error(name, err))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The bytes of `name`, bootstrap tier first.
    pub fn find(&self, name: &str) -> Result<Option<Vec<u8>>, ScanError> {
        for tier in self.tiers() {
            if let Some(bytes) = tier.find(name).map_err(|err| self.provider_error(name, err))? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    fn tiers(&self) -> impl Iterator<Item = &dyn ClassProvider> {
        self.bootstrap
            .as_deref()
            .into_iter()
            .chain(std::iter::once(&*self.provider))
    }

    fn provider_error(&self, name: &str, err: ProviderError) -> ScanError {
        ScanError::Provider {
            name: name.to_string(),
            environment: self.name.clone(),
            reason: err.to_string(),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider", &self.provider.describe())
            .field(
                "bootstrap",
                &self.bootstrap.as_ref().map(|tier| tier.describe()),
            )
            .finish()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muzzle_core::InMemoryProvider;

    #[test]
    fn ids_are_unique() {
        let a = Environment::new("a", InMemoryProvider::new());
        let b = Environment::new("b", InMemoryProvider::new());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "a");
    }

    #[test]
    fn bootstrap_tier_wins() {
        let env = Environment::with_bootstrap(
            "app",
            InMemoryProvider::new().with("x.Shared", vec![1]).with("x.App", vec![2]),
            InMemoryProvider::new().with("x.Shared", vec![9]),
        );
        assert_eq!(env.find("x.Shared").unwrap(), Some(vec![9]));
        assert_eq!(env.find("x.App").unwrap(), Some(vec![2]));
        assert!(env.contains("x.App").unwrap());
        assert!(!env.contains("x.Other").unwrap());
    }
}
