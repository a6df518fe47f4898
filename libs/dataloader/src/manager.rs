// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Registry of named loaders sharing one dispatch trigger.

use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::Error;
use crate::loader::DataLoader;
use crate::loom::Mutex;

/// Multiplexes named [`DataLoader`]s behind a single
/// [`dispatch_all`][Manager::dispatch_all] trigger.
///
/// Managers are plain values, not globals; anything that wants to share one
/// wraps it in an [`Arc`]. Loaders are registered lazily through
/// [`get_or_create`][Manager::get_or_create], typically once per request
/// scope.
pub struct Manager<K, V> {
    loaders: DashMap<String, Arc<DataLoader<K, V>>>,
    /// Serializes `dispatch_all` against itself. Load paths never take this
    /// lock, so registering and loading stay unblocked during a dispatch
    /// sweep.
    dispatch: Mutex<()>,
}

// === impl Manager ===

impl<K, V> Default for Manager<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Manager<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            loaders: DashMap::new(),
            dispatch: Mutex::new(()),
        }
    }

    /// Looks up the loader registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<DataLoader<K, V>>> {
        self.loaders.get(name).map(|loader| Arc::clone(loader.value()))
    }

    /// Returns the loader registered under `name`, creating it with
    /// `factory` if there is none yet.
    ///
    /// Concurrent calls for the same name may each run their factory, but
    /// only one loader wins the registration and every caller gets that
    /// winner; the losers' loaders are dropped. Factories should therefore
    /// not have side effects they cannot afford to repeat.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Factory`] wrapping the factory's error if the loader
    /// had to be created and the factory failed.
    pub fn get_or_create<F>(&self, name: &str, factory: F) -> Result<Arc<DataLoader<K, V>>, Error>
    where
        F: FnOnce() -> Result<DataLoader<K, V>, Error>,
    {
        if let Some(loader) = self.get(name) {
            return Ok(loader);
        }

        let loader = Arc::new(factory().map_err(|source| Error::Factory {
            name: name.into(),
            source: Arc::new(source),
        })?);
        tracing::debug!(name, "registering loader");

        // a racing registration may have won in the meantime; keep the
        // winner and drop ours
        Ok(Arc::clone(
            &self.loaders.entry(name.to_owned()).or_insert(loader),
        ))
    }

    /// Dispatches every registered loader.
    ///
    /// Sweeps are serialized against each other so two triggers cannot
    /// ping-pong-drain the same loaders; `load` calls on the individual
    /// loaders proceed unhindered meanwhile.
    pub fn dispatch_all(&self) {
        let _serialize = self.dispatch.lock();
        tracing::debug!(loaders = self.loaders.len(), "dispatching all loaders");
        for entry in self.loaders.iter() {
            entry.value().dispatch();
        }
    }
}

impl<K, V> fmt::Debug for Manager<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("loaders", &self.loaders.len())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::future::{block_on, join};
    use crate::test_util::{RecordingLoader, TestError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn get_or_create_memoizes_by_name() {
        let manager = Manager::new();
        let created = AtomicUsize::new(0);

        let factory = || {
            created.fetch_add(1, Ordering::Relaxed);
            Ok(DataLoader::new(RecordingLoader::<u32>::new()))
        };

        let first = manager.get_or_create("users", factory).unwrap();
        let second = manager.get_or_create("users", factory).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::Relaxed), 1);
        assert!(manager.get("users").is_some());
        assert!(manager.get("posts").is_none());
    }

    #[test]
    fn factory_errors_are_attributed() {
        let manager: Manager<u32, u32> = Manager::new();

        let error = manager
            .get_or_create("users", || Err(Error::batch(TestError("db down"))))
            .unwrap_err();

        assert!(matches!(&error, Error::Factory { name, .. } if &**name == "users"));
        // the failed factory must not leave a registration behind
        assert!(manager.get("users").is_none());
    }

    #[test]
    fn dispatch_all_drains_every_loader() {
        let manager = Manager::new();

        let users_recorder = RecordingLoader::new();
        let users = manager
            .get_or_create("users", || {
                Ok(DataLoader::new(Arc::clone(&users_recorder)))
            })
            .unwrap();
        let posts_recorder = RecordingLoader::new();
        let posts = manager
            .get_or_create("posts", || {
                Ok(DataLoader::new(Arc::clone(&posts_recorder)))
            })
            .unwrap();

        let a = users.load("A");
        let b = posts.load("B");
        manager.dispatch_all();

        assert_eq!(block_on(join(vec![a, b])).unwrap(), vec!["A", "B"]);
        assert_eq!(users_recorder.calls(), vec![vec!["A"]]);
        assert_eq!(posts_recorder.calls(), vec![vec!["B"]]);
    }

    #[test]
    fn racing_get_or_create_converges_on_one_loader() {
        let manager = Arc::new(Manager::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    manager
                        .get_or_create("users", || {
                            Ok(DataLoader::new(RecordingLoader::<u32>::new()))
                        })
                        .unwrap()
                })
            })
            .collect();

        let loaders: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        for loader in &loaders[1..] {
            assert!(Arc::ptr_eq(&loaders[0], loader));
        }
    }
}
