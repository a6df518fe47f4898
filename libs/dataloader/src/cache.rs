// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Deduplication caches for [`DataLoader`][crate::loader::DataLoader].

use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use crate::task::Task;

/// Key → [`Task`] table used by a loader to deduplicate loads.
///
/// Implementations must be safe for concurrent use. A loader calls
/// [`set`][CacheMap::set] while holding its queue lock, so implementations
/// must not call back into the loader.
///
/// Keys are opaque to the loader; an implementation that needs a canonical
/// cache key for structurally-equal-but-differently-shaped keys owns that
/// projection together with the table it indexes.
pub trait CacheMap<K, V>: Send + Sync {
    /// Looks up the cached task for `key`.
    fn get(&self, key: &K) -> Option<Arc<Task<K, V>>>;

    /// Inserts `task` under its key if and only if no task is cached there
    /// yet, and returns whichever task is in the cache after the call: `task`
    /// itself on insertion, the previously cached one otherwise.
    fn set(&self, task: Arc<Task<K, V>>) -> Arc<Task<K, V>>;

    /// Removes the entry for `key`, if any.
    fn delete(&self, key: &K);

    /// Removes every entry.
    fn clear(&self);
}

/// The default [`CacheMap`], backed by a sharded concurrent hash map.
pub struct ShardedCache<K, V> {
    tasks: DashMap<K, Arc<Task<K, V>>>,
}

// === impl ShardedCache ===

impl<K: Eq + Hash, V> Default for ShardedCache<K, V> {
    fn default() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }
}

impl<K, V> CacheMap<K, V> for ShardedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<Arc<Task<K, V>>> {
        self.tasks.get(key).map(|task| Arc::clone(task.value()))
    }

    fn set(&self, task: Arc<Task<K, V>>) -> Arc<Task<K, V>> {
        Arc::clone(&self.tasks.entry(task.key().clone()).or_insert(task))
    }

    fn delete(&self, key: &K) {
        self.tasks.remove(key);
    }

    fn clear(&self) {
        self.tasks.clear();
    }
}

impl<K: Eq + Hash, V> fmt::Debug for ShardedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedCache")
            .field("len", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
