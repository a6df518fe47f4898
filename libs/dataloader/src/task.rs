// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! In-flight loads and the futures that observe them.

mod load_future;

use core::fmt;
use core::mem;
use core::task::Waker;

use bitflags::bitflags;
use static_assertions::{assert_impl_all, const_assert_eq};

use crate::error::Error;
use crate::loom::cell::UnsafeCell;
use crate::loom::sync::atomic::{AtomicUsize, Ordering};
use crate::loom::{Mutex, hint};

pub use load_future::LoadFuture;

/// An in-flight load of one key under one loader.
///
/// A task is shared between (at most one) cache entry and any number of
/// outstanding [`LoadFuture`]s. It starts out pending and moves to exactly one
/// terminal outcome through [`complete`] or [`fail`]; the transition wakes
/// every dependent future that was registered at that point.
///
/// # State protocol
///
/// The `state` word orders all access to the `outcome` slot:
///
/// - `PENDING`: `outcome` is empty and must not be touched.
/// - `COMPLETING`: the single thread that won the `PENDING → COMPLETING`
///   compare-exchange has exclusive access to `outcome`.
/// - `COMPLETE`: published with `Release` after the outcome was written;
///   everyone who observes it with `Acquire` may read `outcome`, which is
///   immutable from then on.
///
/// Waker slots live behind their own lock and carry no data, so completion
/// only holds that lock for the handoff `mem::take`.
pub struct Task<K, V> {
    key: K,
    /// Completion state word, see the state protocol above.
    state: AtomicUsize,
    /// One slot per dependent [`LoadFuture`]; the most recently registered
    /// waker wins within a slot.
    wakers: Mutex<Vec<Option<Waker>>>,
    outcome: UnsafeCell<Option<Result<V, Error>>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct State: usize {
        const PENDING = 0b00;
        const COMPLETING = 0b01;
        const COMPLETE = 0b10;
    }
}
// PENDING MUST be zero
const_assert_eq!(State::PENDING.bits(), 0);

// Safety: the state protocol synchronizes all access to the `outcome` cell;
// everything else is `Sync` on its own.
unsafe impl<K: Send + Sync, V: Send + Sync> Send for Task<K, V> {}
// Safety: see above
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Task<K, V> {}

assert_impl_all!(Task<String, String>: Send, Sync);
assert_impl_all!(LoadFuture<String, String>: Send, Sync, Unpin);

// === impl Task ===

impl<K, V> Task<K, V> {
    /// Creates a pending task for `key`.
    pub(crate) fn new(key: K) -> Self {
        Self {
            key,
            state: AtomicUsize::new(State::PENDING.bits()),
            wakers: Mutex::new(Vec::new()),
            outcome: UnsafeCell::new(None),
        }
    }

    /// Creates a task that is born with a terminal `outcome`, for priming
    /// caches without going through a batch load.
    pub(crate) fn completed(key: K, outcome: Result<V, Error>) -> Self {
        Self {
            key,
            state: AtomicUsize::new(State::COMPLETE.bits()),
            wakers: Mutex::new(Vec::new()),
            outcome: UnsafeCell::new(Some(outcome)),
        }
    }

    /// The key this task is loading.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns `true` once the task holds a terminal outcome.
    pub fn is_complete(&self) -> bool {
        self.current_state().contains(State::COMPLETE)
    }

    /// Reserves a fresh waker slot, or `None` if the task is already
    /// terminal (the caller reads the outcome directly instead).
    pub(crate) fn reserve_slot(&self) -> Option<usize> {
        if self.is_complete() {
            return None;
        }
        let mut wakers = self.wakers.lock();
        let slot = wakers.len();
        wakers.push(None);
        Some(slot)
    }

    /// Stores `waker` in `slot`, unless the slot already holds a waker that
    /// would wake the same task.
    ///
    /// A completion may have drained the slots between the reservation and
    /// this call; callers must re-check [`is_complete`][Self::is_complete]
    /// after registering, or the wakeup is lost.
    pub(crate) fn register(&self, slot: usize, waker: &Waker) {
        let mut wakers = self.wakers.lock();
        if let Some(entry) = wakers.get_mut(slot) {
            match entry {
                Some(current) if current.will_wake(waker) => {}
                _ => *entry = Some(waker.clone()),
            }
        }
    }

    #[inline(always)]
    fn current_state(&self) -> State {
        State::from_bits_retain(self.state.load(Ordering::Acquire))
    }

    #[inline(always)]
    fn compare_exchange(&self, curr: State, new: State) -> Result<State, State> {
        self.state
            .compare_exchange(curr.bits(), new.bits(), Ordering::AcqRel, Ordering::Acquire)
            .map(State::from_bits_retain)
            .map_err(State::from_bits_retain)
    }
}

impl<K, V: Clone> Task<K, V> {
    /// Clones out the terminal outcome, or `None` while the task is pending.
    pub(crate) fn try_outcome(&self) -> Option<Result<V, Error>> {
        if !self.is_complete() {
            return None;
        }
        Some(self.outcome.with(|outcome| {
            // Safety: COMPLETE was published with `Release` after the outcome
            // was written and observed with `Acquire` above; the slot is
            // immutable from then on.
            unsafe { (*outcome).clone().expect("completed task has an outcome") }
        }))
    }
}

impl<K: fmt::Debug, V: fmt::Debug> Task<K, V> {
    /// Completes the task with `value` and wakes every dependent future.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyCompleted`] if the task already holds a
    /// terminal outcome; at most one completion attempt ever succeeds.
    pub fn complete(&self, value: V) -> Result<(), Error> {
        self.transition(Ok(value))
    }

    /// Completes the task with `error` and wakes every dependent future.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyCompleted`] if the task already holds a
    /// terminal outcome; at most one completion attempt ever succeeds.
    pub fn fail(&self, error: Error) -> Result<(), Error> {
        self.transition(Err(error))
    }

    fn transition(&self, outcome: Result<V, Error>) -> Result<(), Error> {
        if self
            .compare_exchange(State::PENDING, State::COMPLETING)
            .is_err()
        {
            return Err(self.already_completed(&outcome));
        }

        self.outcome.with_mut(|slot| {
            // Safety: winning the PENDING → COMPLETING exchange grants this
            // thread exclusive access to the slot until COMPLETE is
            // published.
            unsafe { *slot = Some(outcome) }
        });
        self.state.store(State::COMPLETE.bits(), Ordering::Release);

        // Wake everyone registered at the instant the outcome was published.
        // A future that registers after this drain observes COMPLETE on its
        // next poll and never parks on this task.
        let wakers = mem::take(&mut *self.wakers.lock());
        tracing::trace!(
            key = ?self.key,
            wakers = wakers.len(),
            "task completed, waking dependents"
        );
        for waker in wakers.into_iter().flatten() {
            waker.wake();
        }

        Ok(())
    }

    fn already_completed(&self, attempted: &Result<V, Error>) -> Error {
        // The winning completion may still be writing the outcome; wait for
        // the publish so the error can name the prior result.
        while !self.is_complete() {
            hint::spin_loop();
        }
        let prior = self.outcome.with(|outcome| {
            // Safety: COMPLETE has been published, the slot is immutable now.
            unsafe { format!("{:?}", (*outcome).as_ref().expect("completed task has an outcome")) }
        });

        Error::AlreadyCompleted {
            key: format!("{:?}", self.key).into(),
            prior: prior.into(),
            attempted: format!("{attempted:?}").into(),
        }
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Task<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}
