// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::any::type_name;
use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use crate::cache::{CacheMap, ShardedCache};
use crate::loader::{BatchLoader, DataLoader, Runner};
use crate::loom::Mutex;

/// Configures and constructs a [`DataLoader`].
///
/// Obtained from [`DataLoader::builder`]; the batch loader itself is the one
/// required ingredient and is passed to [`build`][Builder::build].
pub struct Builder<K, V> {
    max_batch_size: usize,
    cache: CacheChoice<K, V>,
    runner: Option<Arc<dyn Runner>>,
}

enum CacheChoice<K, V> {
    Default,
    Disabled,
    Custom(Arc<dyn CacheMap<K, V>>),
}

// === impl Builder ===

impl<K, V> Builder<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            max_batch_size: 0,
            cache: CacheChoice::Default,
            runner: None,
        }
    }

    /// Caps the number of tasks handed to the batch loader at once.
    ///
    /// A queue longer than `max` is dispatched as several batches, in
    /// insertion order. `0` (the default) means unbounded: the whole queue
    /// is one batch.
    #[must_use]
    pub fn max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Disables deduplication: every load enqueues a fresh task, and priming
    /// and clearing become no-ops.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache = CacheChoice::Disabled;
        self
    }

    /// Replaces the default cache with `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: impl CacheMap<K, V> + 'static) -> Self {
        self.cache = CacheChoice::Custom(Arc::new(cache));
        self
    }

    /// Runs batches on `runner` instead of the dispatching thread.
    #[must_use]
    pub fn runner(mut self, runner: impl Runner + 'static) -> Self {
        self.runner = Some(Arc::new(runner));
        self
    }

    /// Builds the loader around `batch_loader`.
    pub fn build<L>(self, batch_loader: L) -> DataLoader<K, V>
    where
        L: BatchLoader<K, V> + 'static,
        K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
        V: Clone + fmt::Debug + Send + Sync + 'static,
    {
        let cache: Option<Arc<dyn CacheMap<K, V>>> = match self.cache {
            CacheChoice::Default => Some(Arc::new(ShardedCache::default())),
            CacheChoice::Disabled => None,
            CacheChoice::Custom(cache) => Some(cache),
        };

        DataLoader {
            batch_loader: Arc::new(batch_loader),
            loader_name: type_name::<L>(),
            runner: self.runner,
            max_batch_size: self.max_batch_size,
            cache,
            queue: Mutex::new(Vec::new()),
        }
    }
}

impl<K, V> fmt::Debug for Builder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("max_batch_size", &self.max_batch_size)
            .field(
                "cache",
                &match self.cache {
                    CacheChoice::Default => "default",
                    CacheChoice::Disabled => "disabled",
                    CacheChoice::Custom(_) => "custom",
                },
            )
            .field("runner", &self.runner.is_some())
            .finish()
    }
}
