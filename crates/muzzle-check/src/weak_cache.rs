//! Per-environment memoization with weak ownership.
//!
//! [`WeakCache`] maps an environment to a value computed at most once. Each
//! slot keeps a `Weak<Environment>`, so a cached value never extends the
//! environment's lifetime; slots whose environment has been dropped are
//! swept whenever a new environment is registered and on [`WeakCache::purge`].
//!
//! Single-flight: the slot holds an `Arc<OnceLock<V>>`. The `Arc` is cloned
//! out of the map before initialization, so no map shard is locked while a
//! value is being computed and concurrent callers for the same environment
//! block on the same `OnceLock` instead.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

use crate::environment::{Environment, EnvironmentId};

struct Slot<V> {
    owner: Weak<Environment>,
    value: Arc<OnceLock<V>>,
}

pub struct WeakCache<V> {
    slots: DashMap<EnvironmentId, Slot<V>>,
}

impl<V> Default for WeakCache<V> {
    fn default() -> Self {
        WeakCache {
            slots: DashMap::new(),
        }
    }
}

impl<V: Clone> WeakCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `env`, computing it with `init` if this is the
    /// first request. Concurrent first requests run `init` once.
    pub fn get_or_init(&self, env: &Arc<Environment>, init: impl FnOnce() -> V) -> V {
        self.cell(env).get_or_init(init).clone()
    }

    /// The value for `env` if it has already been computed.
    pub fn get(&self, env: &Environment) -> Option<V> {
        self.slots
            .get(&env.id())
            .and_then(|slot| slot.value.get().cloned())
    }

    /// Drops the slots of every environment that no longer exists and
    /// returns how many were removed.
    pub fn purge(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.owner.strong_count() > 0);
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            tracing::debug!(removed, "purged dropped environments");
        }
        removed
    }

    /// Number of slots, live or not yet swept.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn cell(&self, env: &Arc<Environment>) -> Arc<OnceLock<V>> {
        if let Some(slot) = self.slots.get(&env.id()) {
            return Arc::clone(&slot.value);
        }
        // new environment: sweep first
        self.purge();
        let slot = self.slots.entry(env.id()).or_insert_with(|| Slot {
            owner: Arc::downgrade(env),
            value: Arc::new(OnceLock::new()),
        });
        Arc::clone(&slot.value)
    }
}
