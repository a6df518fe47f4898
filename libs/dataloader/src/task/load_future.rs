// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};

use crate::error::Error;
use crate::loom::sync::Arc;
use crate::task::Task;

/// Future observing the completion of one [`Task`].
///
/// Returned by [`DataLoader::load`]; resolves to the task's outcome once a
/// dispatch (or a prime) completes the task. Each instance owns exactly one
/// waker slot on its task and is single-consumer: it must not be polled from
/// two executors at once, though it may be polled again freely after
/// completion (the task keeps its outcome).
///
/// [`DataLoader::load`]: crate::loader::DataLoader::load
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct LoadFuture<K, V> {
    task: Arc<Task<K, V>>,
    /// Waker slot reserved on `task`, `None` if the task was already complete
    /// when this future was created.
    slot: Option<usize>,
}

// === impl LoadFuture ===

impl<K, V> LoadFuture<K, V> {
    pub(crate) fn new(task: Arc<Task<K, V>>) -> Self {
        let slot = task.reserve_slot();
        Self { task, slot }
    }

    /// The task this future is waiting on.
    pub fn task(&self) -> &Arc<Task<K, V>> {
        &self.task
    }
}

impl<K, V: Clone> Future for LoadFuture<K, V> {
    type Output = Result<V, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(outcome) = this.task.try_outcome() {
            return Poll::Ready(outcome);
        }

        let Some(slot) = this.slot else {
            unreachable!("a slotless LoadFuture implies an already-completed task")
        };

        this.task.register(slot, cx.waker());

        // Re-check: a completion racing the registration above may already
        // have drained the waker slots without ours in them.
        if let Some(outcome) = this.task.try_outcome() {
            return Poll::Ready(outcome);
        }
        Poll::Pending
    }
}

impl<K: fmt::Debug, V> fmt::Debug for LoadFuture<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFuture")
            .field("task", &self.task)
            .field("slot", &self.slot)
            .finish()
    }
}
