// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Thread parking and the one-shot notification [`Waker`] used by
//! [`future::block_on`][crate::future::block_on].

use core::fmt;
use core::task::{RawWaker, RawWakerVTable, Waker};

use static_assertions::assert_impl_all;

use crate::loom::sync::atomic::{AtomicUsize, Ordering};
use crate::loom::sync::Arc;
use crate::loom::thread;

const STATE_EMPTY: usize = 0;
const STATE_PARKED: usize = 1;
const STATE_NOTIFIED: usize = 2;

/// A suspendable execution context.
///
/// Implementations must have `std::thread` token semantics: a call to
/// [`unpark`][Park::unpark] that races or precedes [`park`][Park::park] must
/// not be lost. [`park`][Park::park] may wake spuriously, the [`Parker`] on
/// top filters those out.
pub trait Park {
    /// Suspends the current execution context.
    fn park(&self);
    /// Resumes the suspended execution context.
    fn unpark(&self);
}

/// [`Park`] for the calling OS thread.
pub struct StdPark(thread::Thread);

impl StdPark {
    /// Creates a `StdPark` that parks and unparks the calling thread.
    pub fn for_current() -> Self {
        Self(thread::current())
    }
}

impl Park for StdPark {
    fn park(&self) {
        tracing::trace!("parking current thread ({:?})...", self.0);
        thread::park();
    }

    fn unpark(&self) {
        tracing::trace!("unparking thread {:?}...", self.0);
        self.0.unpark();
    }
}

/// A one-shot notification handle over a [`Park`] implementation.
///
/// The parker is the bridge between the waker protocol and a blocked driver
/// thread: [`Parker::into_waker`] produces a [`Waker`] whose wake call
/// notifies the parker, and [`Parker::park`] suspends the caller until that
/// notification arrives. A notification delivered while the caller is not
/// parked is buffered, the next `park` consumes it and returns immediately.
pub struct Parker<P>(Arc<Inner<P>>);

struct Inner<P> {
    state: AtomicUsize,
    park_impl: P,
}

assert_impl_all!(Parker<StdPark>: Send, Sync);

// === impl Parker ===

impl<P> Clone for Parker<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> fmt::Debug for Parker<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parker")
            .field("state", &self.0.describe_state())
            .finish_non_exhaustive()
    }
}

impl<P: Park> Parker<P> {
    pub fn new(park_impl: P) -> Self {
        Self(Arc::new(Inner {
            state: AtomicUsize::new(STATE_EMPTY),
            park_impl,
        }))
    }

    /// Suspends the caller until [`notify`][Self::notify] is called, consuming
    /// a buffered notification if one is already present.
    #[inline]
    pub fn park(&self) {
        self.0.park();
    }

    /// Notifies the parker, resuming a parked caller or buffering the
    /// notification for the next [`park`][Self::park]. Idempotent.
    #[inline]
    pub fn notify(&self) {
        self.0.notify();
    }

    /// Converts self into a [`Waker`] that notifies this parker when woken.
    #[inline]
    pub fn into_waker(self) -> Waker {
        // Safety: the vtable functions uphold the RawWaker contract; they only
        // manipulate the strong count of the Arc they were derived from.
        unsafe { Waker::from_raw(Inner::into_raw_waker(self.0)) }
    }
}

// === impl Inner ===

impl<P> Inner<P> {
    fn describe_state(&self) -> &'static str {
        match self.state.load(Ordering::Acquire) {
            STATE_EMPTY => "<empty>",
            STATE_PARKED => "<parked>",
            STATE_NOTIFIED => "<notified>",
            _ => "<unknown>",
        }
    }
}

impl<P: Park> Inner<P> {
    fn park(&self) {
        // If we were previously notified then we consume this notification and
        // return quickly.
        if self
            .state
            .compare_exchange(
                STATE_NOTIFIED,
                STATE_EMPTY,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            return;
        }

        match self.state.compare_exchange(
            STATE_EMPTY,
            STATE_PARKED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(STATE_NOTIFIED) => {
                // We must read here, even though we know it will be `NOTIFIED`:
                // `notify` may have been called again since the
                // `compare_exchange` above read `NOTIFIED`, and we must
                // synchronize with that call by reading from its write.
                let old = self.state.swap(STATE_EMPTY, Ordering::SeqCst);
                debug_assert_eq!(old, STATE_NOTIFIED, "park state changed unexpectedly");
                return;
            }
            Err(actual) => panic!("inconsistent park state; actual = {actual}"),
        }

        loop {
            self.park_impl.park();

            if self
                .state
                .compare_exchange(
                    STATE_NOTIFIED,
                    STATE_EMPTY,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                // we got notified
                return;
            }

            tracing::trace!("spurious wakeup, going back to sleep...");
        }
    }

    fn notify(&self) {
        match self.state.swap(STATE_NOTIFIED, Ordering::SeqCst) {
            // Not parked yet; the buffered NOTIFIED is consumed by the next
            // `park`. Or already notified, in which case there is nothing to
            // do.
            STATE_EMPTY | STATE_NOTIFIED => {}
            STATE_PARKED => self.park_impl.unpark(),
            actual => panic!("inconsistent park state; actual = {actual}"),
        }
    }

    fn into_raw(this: Arc<Self>) -> *const () {
        Arc::into_raw(this).cast::<()>()
    }

    unsafe fn from_raw(ptr: *const ()) -> Arc<Self> {
        // Safety: ensured by caller
        unsafe { Arc::from_raw(ptr.cast::<Self>()) }
    }

    const WAKER_VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::waker_clone,
        Self::waker_wake,
        Self::waker_wake_by_ref,
        Self::waker_drop,
    );

    unsafe fn waker_clone(raw: *const ()) -> RawWaker {
        // Safety: ensured by the RawWaker contract
        unsafe {
            Arc::increment_strong_count(raw.cast::<Self>());
            Self::into_raw_waker(Self::from_raw(raw))
        }
    }

    unsafe fn waker_wake(raw: *const ()) {
        // Safety: ensured by the RawWaker contract
        let inner = unsafe { Self::from_raw(raw) };
        inner.notify();
    }

    unsafe fn waker_wake_by_ref(raw: *const ()) {
        let inner = raw.cast::<Self>();
        // Safety: ensured by the RawWaker contract
        unsafe {
            (*inner).notify();
        }
    }

    unsafe fn waker_drop(raw: *const ()) {
        // Safety: ensured by the RawWaker contract
        unsafe {
            drop(Self::from_raw(raw));
        }
    }

    // `Waker::will_wake` is pointer equality, and an inlined `WAKER_VTABLE`
    // would get a distinct address per instantiation site, making a cloned
    // waker compare unequal to its original and defeating the
    // only-replace-a-different-waker optimization in `Task`. The
    // `inline(never)` is therefore quite load-bearing.
    #[inline(never)]
    fn into_raw_waker(this: Arc<Self>) -> RawWaker {
        RawWaker::new(Self::into_raw(this), &Self::WAKER_VTABLE)
    }
}
