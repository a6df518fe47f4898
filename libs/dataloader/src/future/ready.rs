// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::pin::Pin;
use core::task::{Context, Poll};

use crate::error::Error;

/// Creates a future that is immediately ready with `value`.
pub fn ok<T>(value: T) -> Ready<T> {
    Ready(Some(Ok(value)))
}

/// Creates a future that is immediately ready with `error`.
pub fn err<T>(error: Error) -> Ready<T> {
    Ready(Some(Err(error)))
}

/// Future returned by [`ok`] and [`err`].
///
/// The outcome is handed out on the first poll; polling a second time is a
/// programmer error and panics.
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Ready<T>(Option<Result<T, Error>>);

// The inner value is moved out on completion, it is never pinned.
impl<T> Unpin for Ready<T> {}

impl<T> Future for Ready<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(self.get_mut().0.take().expect("`Ready` polled after completion"))
    }
}
