// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;

/// Errors produced by loaders, tasks, and managers.
///
/// Errors are data in this crate: they travel through task result slots and
/// future outputs, fanning out to every dependent future of a task. That is
/// why the whole taxonomy is `Clone` (payloads are reference-counted) rather
/// than the more common single-owner error type.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An error surfaced by a batch loader through [`Task::fail`], passed
    /// through verbatim to every dependent future.
    ///
    /// [`Task::fail`]: crate::task::Task::fail
    #[error("batch load failed: {0}")]
    BatchLoad(Arc<dyn core::error::Error + Send + Sync>),

    /// [`Task::complete`] or [`Task::fail`] was called on a task that already
    /// holds a terminal outcome.
    ///
    /// [`Task::complete`]: crate::task::Task::complete
    /// [`Task::fail`]: crate::task::Task::fail
    #[error(
        "task for key `{key}` is already completed with {prior}; rejected attempt to complete it with {attempted}"
    )]
    AlreadyCompleted {
        /// The task's key.
        key: Arc<str>,
        /// The outcome the task already holds.
        prior: Arc<str>,
        /// The outcome the rejected call tried to store.
        attempted: Arc<str>,
    },

    /// A batch loader returned without completing one of the tasks it was
    /// given. The task is force-completed with this error so that its
    /// dependent futures still resolve.
    #[error("batch loader `{loader}` returned without completing the task for key `{key}`")]
    Incomplete {
        /// Type name of the offending batch loader.
        loader: &'static str,
        /// The key of the task that was left pending.
        key: Arc<str>,
    },

    /// A [`Runner`][crate::loader::Runner] refused to accept a batch; every
    /// task of that batch is failed with this error.
    #[error("runner refused a batch of {len} tasks")]
    RunnerRefusal {
        /// Number of tasks in the refused batch.
        len: usize,
        /// The runner's refusal.
        #[source]
        source: SubmitError,
    },

    /// Failure inside a caller-supplied [`CacheMap`][crate::cache::CacheMap]
    /// implementation. The default cache never produces this.
    #[error("cache error")]
    Cache(#[source] Arc<dyn core::error::Error + Send + Sync>),

    /// A loader factory handed to
    /// [`Manager::get_or_create`][crate::manager::Manager::get_or_create]
    /// failed.
    #[error("failed to create loader `{name}`")]
    Factory {
        /// The loader name the factory was registered under.
        name: Arc<str>,
        /// The factory's error.
        #[source]
        source: Arc<Error>,
    },
}

impl Error {
    /// Wraps an arbitrary error for [`Task::fail`], preserving it verbatim as
    /// the source of a [`BatchLoad`][Error::BatchLoad] error.
    ///
    /// [`Task::fail`]: crate::task::Task::fail
    pub fn batch<E>(error: E) -> Self
    where
        E: core::error::Error + Send + Sync + 'static,
    {
        Self::BatchLoad(Arc::new(error))
    }
}

/// Reasons a [`Runner`][crate::loader::Runner] can refuse a job.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum SubmitError {
    /// The runner has been shut down and accepts no further jobs.
    #[error("runner is shut down")]
    Closed,

    /// The runner is at capacity.
    #[error("runner is at capacity")]
    Capacity,
}
