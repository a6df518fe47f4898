// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::loader::{BatchLoader, Runner};
use crate::task::Task;

/// One batch of tasks on its way through a [`BatchLoader`].
///
/// The job owns the contract enforcement around the user's loader: after the
/// loader returns, any task it left pending is failed with
/// [`Error::Incomplete`] so that no dependent future hangs.
pub(crate) struct BatchJob<K, V> {
    batch_loader: Arc<dyn BatchLoader<K, V>>,
    loader_name: &'static str,
    tasks: Vec<Arc<Task<K, V>>>,
}

// === impl BatchJob ===

impl<K, V> BatchJob<K, V>
where
    K: fmt::Debug + Send + Sync + 'static,
    V: fmt::Debug + Send + Sync + 'static,
{
    pub(crate) fn new(
        batch_loader: Arc<dyn BatchLoader<K, V>>,
        loader_name: &'static str,
        tasks: Vec<Arc<Task<K, V>>>,
    ) -> Self {
        Self {
            batch_loader,
            loader_name,
            tasks,
        }
    }

    /// Runs the batch loader over the tasks, then enforces that every task
    /// was completed.
    pub(crate) fn run(self) {
        tracing::trace!(
            loader = self.loader_name,
            tasks = self.tasks.len(),
            "running batch"
        );
        self.batch_loader.load(&self.tasks);

        for task in &self.tasks {
            if task.is_complete() {
                continue;
            }
            let incomplete = Error::Incomplete {
                loader: self.loader_name,
                key: format!("{:?}", task.key()).into(),
            };
            if let Err(error) = task.fail(incomplete) {
                // a late completion raced the check above; the contract held
                // after all
                tracing::trace!(%error, "completion raced the incomplete-task check");
            }
        }
    }

    /// Hands the job to `runner`, failing the whole batch if the runner
    /// refuses it so no task is left pending forever.
    pub(crate) fn submit(self, runner: &dyn Runner) {
        let tasks = self.tasks.clone();
        if let Err(source) = runner.submit(Box::new(move || self.run())) {
            tracing::warn!(
                error = %source,
                tasks = tasks.len(),
                "runner refused batch, failing its tasks"
            );
            let refusal = Error::RunnerRefusal {
                len: tasks.len(),
                source,
            };
            for task in &tasks {
                if let Err(error) = task.fail(refusal.clone()) {
                    tracing::trace!(%error, "task completed before the refusal was recorded");
                }
            }
        }
    }
}
