// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Request-coalescing, batching data loader.
//!
//! A [`DataLoader`] wraps a user-supplied [`BatchLoader`] that can fetch many
//! keys in one round-trip. Concurrent [`load`][DataLoader::load] calls for the
//! same key are deduplicated through a pluggable [`CacheMap`], accumulated on a
//! queue, and handed to the batch loader in insertion order when
//! [`dispatch`][DataLoader::dispatch] is triggered. Each individual request is
//! exposed as a plain [`Future`][core::future::Future] that any driver can
//! poll; [`future::block_on`] is the built-in single-threaded one.
//!
//! A [`Manager`] multiplexes many named loaders behind a single
//! [`dispatch_all`][Manager::dispatch_all] trigger, which is how
//! request-boundary hooks (e.g. a GraphQL executor) typically drive this
//! crate.

mod error;
mod loom;

pub mod cache;
pub mod future;
pub mod loader;
pub mod manager;
pub mod park;
pub mod task;

pub use error::{Error, SubmitError};

pub use cache::{CacheMap, ShardedCache};
pub use loader::{BatchLoader, Builder, DataLoader, LoaderFn, Runner, loader_fn};
pub use manager::Manager;
pub use task::{LoadFuture, Task};

#[cfg(test)]
mod test_util;
