// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Batching loader over a user-supplied [`BatchLoader`].

mod batch_job;
mod builder;

use core::fmt;
use core::hash::Hash;
use core::mem;
use std::sync::Arc;

use static_assertions::assert_impl_all;

use crate::cache::CacheMap;
use crate::error::SubmitError;
use crate::future::{Join, join};
use crate::loom::Mutex;
use crate::task::{LoadFuture, Task};

use batch_job::BatchJob;
pub use builder::Builder;

/// A user-supplied function that fetches a batch of keys in one round-trip.
///
/// The loader must complete **every** task it is given, exactly once, via
/// [`Task::complete`] or [`Task::fail`], before returning; completion order
/// within the batch is free. Tasks left pending are force-failed by the
/// dispatch machinery, and a second completion of the same task is an error.
///
/// Closures are adapted through [`loader_fn`].
pub trait BatchLoader<K, V>: Send + Sync {
    /// Loads every task in `batch`. Tasks arrive in the order their keys
    /// were first requested.
    fn load(&self, batch: &[Arc<Task<K, V>>]);
}

impl<K, V, L> BatchLoader<K, V> for Arc<L>
where
    L: BatchLoader<K, V> + ?Sized,
{
    fn load(&self, batch: &[Arc<Task<K, V>>]) {
        (**self).load(batch)
    }
}

/// Adapts a closure into a [`BatchLoader`].
pub fn loader_fn<K, V, F>(f: F) -> LoaderFn<F>
where
    F: Fn(&[Arc<Task<K, V>>]) + Send + Sync,
{
    LoaderFn(f)
}

/// [`BatchLoader`] returned by [`loader_fn`].
pub struct LoaderFn<F>(F);

impl<K, V, F> BatchLoader<K, V> for LoaderFn<F>
where
    F: Fn(&[Arc<Task<K, V>>]) + Send + Sync,
{
    fn load(&self, batch: &[Arc<Task<K, V>>]) {
        (self.0)(batch)
    }
}

impl<F> fmt::Debug for LoaderFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderFn").finish_non_exhaustive()
    }
}

/// An external executor that batches can be handed off to instead of running
/// them on the dispatching thread.
pub trait Runner: Send + Sync {
    /// Schedules `job` to run eventually.
    ///
    /// A runner either accepts the job, in which case it must run it exactly
    /// once, or refuses it without running it.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] if the job was refused; the loader then
    /// fails every task of the batch with
    /// [`Error::RunnerRefusal`][crate::Error::RunnerRefusal].
    fn submit(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), SubmitError>;
}

/// Request-coalescing, batching loader.
///
/// `load` hands out a future per key and accumulates new keys on a queue;
/// [`dispatch`][DataLoader::dispatch] drains the queue into batches of at
/// most [`max_batch_size`][Builder::max_batch_size] tasks and runs the
/// [`BatchLoader`] over each. With the cache enabled (the default), repeated
/// loads of one key share a single task, across dispatches, until the key is
/// [`clear`][DataLoader::clear]ed.
///
/// Nothing here triggers dispatch by itself: callers decide the batching
/// window, typically at a request boundary or whenever the dependent futures
/// stall.
pub struct DataLoader<K, V> {
    batch_loader: Arc<dyn BatchLoader<K, V>>,
    /// Type name of the batch loader, for attributing incomplete-task errors.
    loader_name: &'static str,
    runner: Option<Arc<dyn Runner>>,
    /// Cap on tasks per batch; 0 dispatches the whole queue as one batch.
    max_batch_size: usize,
    /// `None` disables deduplication entirely.
    cache: Option<Arc<dyn CacheMap<K, V>>>,
    /// The current queue. The lock guards the swap in `dispatch` and the
    /// dedup-or-enqueue decision in `load`; it is never held while a batch
    /// loader runs.
    queue: Mutex<Vec<Arc<Task<K, V>>>>,
}

assert_impl_all!(DataLoader<String, String>: Send, Sync);

// === impl DataLoader ===

impl<K, V> DataLoader<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Creates a loader with the default configuration: unbounded batches,
    /// deduplication through a [`ShardedCache`][crate::cache::ShardedCache],
    /// batches run on the dispatching thread.
    pub fn new<L>(batch_loader: L) -> Self
    where
        L: BatchLoader<K, V> + 'static,
    {
        Self::builder().build(batch_loader)
    }

    /// Starts building a loader, see [`Builder`].
    pub fn builder() -> Builder<K, V> {
        Builder::new()
    }

    /// Requests the value for `key`.
    ///
    /// If a task for `key` is cached its future is returned without touching
    /// the queue; otherwise a new task is enqueued for the next
    /// [`dispatch`][Self::dispatch]. The returned future resolves once that
    /// task completes.
    pub fn load(&self, key: K) -> LoadFuture<K, V> {
        if let Some(cache) = &self.cache {
            if let Some(task) = cache.get(&key) {
                tracing::trace!(key = ?key, "load served from cache");
                return LoadFuture::new(task);
            }
        }

        let mut queue = self.queue.lock();
        let task = Arc::new(Task::new(key));
        if let Some(cache) = &self.cache {
            let cached = cache.set(Arc::clone(&task));
            if !Arc::ptr_eq(&cached, &task) {
                // lost the cache slot to a racing load; that load already
                // enqueued the task
                return LoadFuture::new(cached);
            }
        }
        tracing::trace!(key = ?task.key(), "task enqueued");
        queue.push(Arc::clone(&task));
        LoadFuture::new(task)
    }

    /// Requests the values for all of `keys`, returning a future of the
    /// values in key order.
    pub fn load_many<I>(&self, keys: I) -> Join<LoadFuture<K, V>, V>
    where
        I: IntoIterator<Item = K>,
    {
        let keys = keys.into_iter();
        let mut futures = Vec::with_capacity(keys.size_hint().0);
        for key in keys {
            futures.push(self.load(key));
        }
        join(futures)
    }

    /// Drains the current queue and runs the batch loader over it.
    ///
    /// The queue is split into contiguous, insertion-ordered batches of at
    /// most `max_batch_size` tasks (one unbounded batch if the cap is 0);
    /// each batch runs on the configured [`Runner`], or inline on the
    /// calling thread without one. No loader-internal lock is held while
    /// batch loaders run. Dispatching an empty queue is a no-op.
    pub fn dispatch(&self) {
        let tasks = mem::take(&mut *self.queue.lock());
        if tasks.is_empty() {
            return;
        }
        tracing::debug!(
            loader = self.loader_name,
            tasks = tasks.len(),
            max_batch_size = self.max_batch_size,
            "dispatching queue"
        );

        let batches: Vec<Vec<Arc<Task<K, V>>>> = if self.max_batch_size == 0 {
            vec![tasks]
        } else {
            tasks
                .chunks(self.max_batch_size)
                .map(<[_]>::to_vec)
                .collect()
        };

        for batch in batches {
            let job = BatchJob::new(Arc::clone(&self.batch_loader), self.loader_name, batch);
            match &self.runner {
                Some(runner) => job.submit(runner.as_ref()),
                None => job.run(),
            }
        }
    }

    /// Pre-populates the cache so `key` resolves to `value` without a batch
    /// load.
    ///
    /// Priming never overwrites: if a task for `key` is already cached it
    /// stays, whatever its state. Use [`clear`][Self::clear] first to
    /// replace it. With the cache disabled this is a no-op.
    pub fn prime(&self, key: K, value: V) {
        self.prime_outcome(key, Ok(value));
    }

    /// Pre-populates the cache so `key` resolves to `error`, with the same
    /// keep-the-existing-entry semantics as [`prime`][Self::prime].
    pub fn prime_error(&self, key: K, error: crate::Error) {
        self.prime_outcome(key, Err(error));
    }

    /// [`prime`][Self::prime]s every `(key, value)` pair.
    pub fn prime_many<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.prime(key, value);
        }
    }

    fn prime_outcome(&self, key: K, outcome: Result<V, crate::Error>) {
        let Some(cache) = &self.cache else { return };
        tracing::trace!(key = ?key, "priming cache");
        // `set` keeps a previously cached task, so priming cannot clobber
        // loads already in flight
        cache.set(Arc::new(Task::completed(key, outcome)));
    }

    /// Drops the cached task for `key`, so the next load fetches it again.
    /// No-op with the cache disabled.
    pub fn clear(&self, key: &K) {
        if let Some(cache) = &self.cache {
            cache.delete(key);
        }
    }

    /// [`clear`][Self::clear]s every key in `keys`.
    pub fn clear_many<'k, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'k K>,
        K: 'k,
    {
        for key in keys {
            self.clear(key);
        }
    }

    /// Drops every cached task. No-op with the cache disabled.
    pub fn clear_all(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

impl<K, V> fmt::Debug for DataLoader<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("batch_loader", &self.loader_name)
            .field("max_batch_size", &self.max_batch_size)
            .field("cache_enabled", &self.cache.is_some())
            .field("queued", &self.queue.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::future::block_on;
    use crate::test_util::{RecordingLoader, TestError};

    #[test]
    fn identity_batch() {
        crate::test_util::init_tracing();
        let recorder = RecordingLoader::new();
        let loader = DataLoader::new(Arc::clone(&recorder));

        let one = loader.load(1);
        let two = loader.load(2);
        loader.dispatch();

        assert_eq!(block_on(join(vec![one, two])).unwrap(), vec![1, 2]);
        assert_eq!(recorder.calls(), vec![vec![1, 2]]);
    }

    #[test]
    fn concurrent_loads_of_one_key_coalesce() {
        let recorder = RecordingLoader::new();
        let loader = DataLoader::new(Arc::clone(&recorder));

        let futures: Vec<_> = (0..5).map(|_| loader.load(1)).collect();
        loader.dispatch();

        for future in futures {
            assert_eq!(block_on(future).unwrap(), 1);
        }
        // the batch loader saw the key exactly once
        assert_eq!(recorder.calls(), vec![vec![1]]);
    }

    #[test]
    fn batches_are_capped_and_ordered() {
        let recorder = RecordingLoader::new();
        let loader = DataLoader::builder()
            .max_batch_size(2)
            .build(Arc::clone(&recorder));

        let futures = loader.load_many(vec![1, 2, 3]);
        loader.dispatch();

        assert_eq!(block_on(futures).unwrap(), vec![1, 2, 3]);
        assert_eq!(recorder.calls(), vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn cache_spans_dispatches() {
        let recorder = RecordingLoader::new();
        let loader = DataLoader::new(Arc::clone(&recorder));

        let a1 = loader.load("A");
        let b = loader.load("B");
        loader.dispatch();

        let a2 = loader.load("A");
        let c = loader.load("C");
        loader.dispatch();

        assert_eq!(block_on(join(vec![a1, b, a2, c])).unwrap(), vec![
            "A", "B", "A", "C"
        ]);
        assert_eq!(recorder.calls(), vec![vec!["A", "B"], vec!["C"]]);
    }

    #[test]
    fn disabled_cache_repeats_keys() {
        let recorder = RecordingLoader::new();
        let loader = DataLoader::builder()
            .without_cache()
            .build(Arc::clone(&recorder));

        let head = join(vec![loader.load("A"), loader.load("C"), loader.load("D")]);
        let many = loader.load_many(vec!["C", "D", "A", "A", "B"]);
        loader.dispatch();

        assert_eq!(block_on(head).unwrap(), vec!["A", "C", "D"]);
        assert_eq!(block_on(many).unwrap(), vec!["C", "D", "A", "A", "B"]);
        assert_eq!(recorder.calls(), vec![vec![
            "A", "C", "D", "C", "D", "A", "A", "B"
        ]]);
    }

    #[test]
    fn primed_error_resolves_without_batch_load() {
        let recorder = RecordingLoader::new();
        let loader = DataLoader::new(Arc::clone(&recorder));

        loader.prime_error(1, Error::batch(TestError("primed")));
        let error = block_on(loader.load(1)).unwrap_err();

        assert!(matches!(error, Error::BatchLoad(_)));
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn priming_is_idempotent() {
        let recorder = RecordingLoader::new();
        let loader = DataLoader::new(Arc::clone(&recorder));

        loader.prime(1, 10);
        loader.prime(1, 20);
        loader.prime_error(1, Error::batch(TestError("ignored")));

        assert_eq!(block_on(loader.load(1)).unwrap(), 10);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn clear_then_prime_replaces() {
        let loader = DataLoader::new(RecordingLoader::new());

        loader.prime(1, 10);
        loader.clear(&1);
        loader.prime(1, 20);

        assert_eq!(block_on(loader.load(1)).unwrap(), 20);
    }

    #[test]
    fn prime_many_and_clear_many() {
        let recorder = RecordingLoader::new();
        let loader = DataLoader::new(Arc::clone(&recorder));

        loader.prime_many([(1, 10), (2, 20)]);
        assert_eq!(block_on(loader.load(1)).unwrap(), 10);
        assert_eq!(block_on(loader.load(2)).unwrap(), 20);
        assert!(recorder.calls().is_empty());

        loader.clear_many([&1, &2]);
        let futures = loader.load_many(vec![1, 2]);
        loader.dispatch();
        assert_eq!(block_on(futures).unwrap(), vec![1, 2]);
        assert_eq!(recorder.calls(), vec![vec![1, 2]]);
    }

    #[test]
    fn incomplete_tasks_are_force_failed() {
        struct Forgetful;

        impl BatchLoader<u32, u32> for Forgetful {
            fn load(&self, batch: &[Arc<Task<u32, u32>>]) {
                for task in batch {
                    // "forget" key 1
                    if *task.key() != 1 {
                        task.complete(*task.key()).unwrap();
                    }
                }
            }
        }

        let loader = DataLoader::new(Forgetful);
        let one = loader.load(1);
        let two = loader.load(2);
        loader.dispatch();

        assert_eq!(block_on(two).unwrap(), 2);

        let error = block_on(one).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("Forgetful"), "missing loader: {message}");
        assert!(message.contains('1'), "missing key: {message}");
    }

    #[test]
    fn empty_dispatch_is_a_noop() {
        let recorder = RecordingLoader::<u32>::new();
        let loader = DataLoader::new(Arc::clone(&recorder));

        loader.dispatch();
        loader.dispatch();
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn runner_runs_batches() {
        struct Inline;

        impl Runner for Inline {
            fn submit(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), SubmitError> {
                job();
                Ok(())
            }
        }

        let recorder = RecordingLoader::new();
        let loader = DataLoader::builder()
            .runner(Inline)
            .build(Arc::clone(&recorder));

        let future = loader.load(1);
        loader.dispatch();

        assert_eq!(block_on(future).unwrap(), 1);
        assert_eq!(recorder.calls(), vec![vec![1]]);
    }

    #[test]
    fn refused_batch_fails_its_tasks() {
        struct Refuse;

        impl Runner for Refuse {
            fn submit(&self, _job: Box<dyn FnOnce() + Send>) -> Result<(), SubmitError> {
                Err(SubmitError::Capacity)
            }
        }

        let recorder = RecordingLoader::new();
        let loader = DataLoader::builder()
            .runner(Refuse)
            .build(Arc::clone(&recorder));

        let future = loader.load(1);
        loader.dispatch();

        let error = block_on(future).unwrap_err();
        assert!(matches!(error, Error::RunnerRefusal {
            len: 1,
            source: SubmitError::Capacity,
        }));
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn chained_loaders_batch_independently() {
        let inner_recorder = RecordingLoader::new();
        let inner = Arc::new(DataLoader::new(Arc::clone(&inner_recorder)));

        let outer_recorder = Arc::new(std::sync::Mutex::new(Vec::new()));
        let outer = {
            let inner = Arc::clone(&inner);
            let calls = Arc::clone(&outer_recorder);
            DataLoader::new(loader_fn(move |batch: &[Arc<Task<u32, u32>>]| {
                calls
                    .lock()
                    .unwrap()
                    .push(batch.iter().map(|task| *task.key()).collect::<Vec<_>>());

                // resolve each outer key through the inner loader
                let futures: Vec<_> = batch.iter().map(|task| inner.load(*task.key())).collect();
                inner.dispatch();
                let values = block_on(join(futures)).unwrap();
                for (task, value) in batch.iter().zip(values) {
                    task.complete(value).unwrap();
                }
            }))
        };

        let one = outer.load(1);
        let two = outer.load(2);
        outer.dispatch();

        assert_eq!(block_on(join(vec![one, two])).unwrap(), vec![1, 2]);
        // each loader saw exactly one batch for its own dispatch
        assert_eq!(*outer_recorder.lock().unwrap(), vec![vec![1, 2]]);
        assert_eq!(inner_recorder.calls(), vec![vec![1, 2]]);
    }

    #[test]
    fn futures_run_on_a_foreign_executor() {
        let recorder = RecordingLoader::new();
        let loader = DataLoader::new(Arc::clone(&recorder));

        let future = loader.load(1);
        loader.dispatch();

        // plain `std` futures, so any external driver works too
        assert_eq!(futures::executor::block_on(future).unwrap(), 1);
    }

    #[test]
    fn parallel_loads_from_many_threads() {
        let recorder = RecordingLoader::new();
        let loader = Arc::new(DataLoader::new(Arc::clone(&recorder)));

        let handles: Vec<_> = (0u32..4)
            .map(|i| {
                let loader = Arc::clone(&loader);
                std::thread::spawn(move || loader.load(i % 2))
            })
            .collect();
        let futures: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        loader.dispatch();

        for future in futures {
            let value = block_on(future).unwrap();
            assert!(value == 0 || value == 1);
        }

        // both keys were loaded exactly once, in some order
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        let mut batch = calls[0].clone();
        batch.sort_unstable();
        assert_eq!(batch, vec![0, 1]);
    }
}
