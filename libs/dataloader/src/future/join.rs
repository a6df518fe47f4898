// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::pin::Pin;
use core::task::{Context, Poll};

use crate::error::Error;

/// Aggregates `futures` into a future of their outputs, in input order.
///
/// The result sequence has the value of the i-th input at index i regardless
/// of the order in which the inputs complete. The first input error is
/// returned immediately, without waiting for the remaining inputs. Joining an
/// empty iterator completes on the first poll with an empty sequence.
pub fn join<F, T>(futures: impl IntoIterator<Item = F>) -> Join<F, T>
where
    F: Future<Output = Result<T, Error>> + Unpin,
{
    let children: Vec<Option<F>> = futures.into_iter().map(Some).collect();
    let outputs = children.iter().map(|_| None).collect();
    Join { children, outputs }
}

/// Future returned by [`join`].
///
/// Every still-pending child is polled with the outer context, so a child
/// completion wakes the join exactly once and the join never wakes itself.
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Join<F, T> {
    /// Pending children; a slot is cleared once its output is taken.
    children: Vec<Option<F>>,
    /// Outputs, index-aligned with `children`.
    outputs: Vec<Option<T>>,
}

// Children are only ever polled through `Pin::new` (they are `Unpin` by
// bound), outputs are moved, nothing is structurally pinned.
impl<F: Unpin, T> Unpin for Join<F, T> {}

impl<F, T> Future for Join<F, T>
where
    F: Future<Output = Result<T, Error>> + Unpin,
{
    type Output = Result<Vec<T>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let mut pending = false;
        for (child, output) in this.children.iter_mut().zip(this.outputs.iter_mut()) {
            let Some(future) = child else { continue };

            match Pin::new(future).poll(cx) {
                Poll::Ready(Ok(value)) => {
                    *output = Some(value);
                    *child = None;
                }
                Poll::Ready(Err(error)) => return Poll::Ready(Err(error)),
                Poll::Pending => pending = true,
            }
        }

        if pending {
            return Poll::Pending;
        }

        let values = this
            .outputs
            .iter_mut()
            .map(|slot| slot.take().expect("child completed without an output"))
            .collect();
        Poll::Ready(Ok(values))
    }
}
