//! Match result caching.
//!
//! [`MatchResultCache`] runs a [`ReferenceMatcher`] at most once per
//! environment. Results live as long as the environment does and no
//! longer: the cache holds environments weakly and forgets dropped ones on
//! the next registration or [`purge`](MatchResultCache::purge).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::environment::Environment;
use crate::matcher::ReferenceMatcher;
use crate::mismatch::Mismatch;
use crate::weak_cache::WeakCache;

pub struct MatchResultCache {
    matcher: ReferenceMatcher,
    results: WeakCache<Arc<[Mismatch]>>,
    passes: AtomicUsize,
}

impl MatchResultCache {
    pub fn new(matcher: ReferenceMatcher) -> Self {
        MatchResultCache {
            matcher,
            results: WeakCache::new(),
            passes: AtomicUsize::new(0),
        }
    }

    /// All mismatches for `env`. The first call per environment runs the
    /// matcher; concurrent first calls wait for that single pass.
    pub fn get_mismatches(&self, env: &Arc<Environment>) -> Arc<[Mismatch]> {
        self.results.get_or_init(env, || {
            self.passes.fetch_add(1, Ordering::SeqCst);
            let mismatches = self.matcher.mismatches(env);
            if !mismatches.is_empty() {
                tracing::debug!(
                    env = env.name(),
                    mismatches = mismatches.len(),
                    "environment does not match"
                );
            }
            Arc::from(mismatches)
        })
    }

    pub fn matches(&self, env: &Arc<Environment>) -> bool {
        self.get_mismatches(env).is_empty()
    }

    /// How many matching passes have run.
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    /// Drops cached results and shapes of environments that no longer
    /// exist. Returns the number of result entries removed.
    pub fn purge(&self) -> usize {
        self.matcher.scanner().purge();
        self.results.purge()
    }

    /// Environments with cached results, live or not yet swept.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn matcher(&self) -> &ReferenceMatcher {
        &self.matcher
    }
}
