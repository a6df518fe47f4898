// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::pin::pin;
use core::task::{Context, Poll};

use crate::park::{Parker, StdPark};

/// Runs `future` to completion on the calling thread.
///
/// The thread is parked between polls and unparked by the future's waker, so
/// a pending future costs no CPU. Note that a [`LoadFuture`] only completes
/// once its loader is dispatched; blocking on one before calling
/// [`DataLoader::dispatch`] (from this thread or another) parks forever.
///
/// [`LoadFuture`]: crate::task::LoadFuture
/// [`DataLoader::dispatch`]: crate::loader::DataLoader::dispatch
pub fn block_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);

    let parker = Parker::new(StdPark::for_current());
    let waker = parker.clone().into_waker();
    let mut cx = Context::from_waker(&waker);

    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => return output,
            Poll::Pending => parker.park(),
        }
    }
}
