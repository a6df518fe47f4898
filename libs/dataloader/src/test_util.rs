// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use std::sync::{Arc, Mutex};

use crate::loader::BatchLoader;
use crate::task::Task;

/// Installs the fmt subscriber so `RUST_LOG` filtering works in test runs.
/// Safe to call from every test; only the first call wins.
#[cfg(not(loom))]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Stand-in error for batch loaders and factories under test.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub(crate) struct TestError(pub(crate) &'static str);

/// Batch loader that echoes every key back as its value and records the
/// batches it was called with, so tests can assert on the exact call log.
pub(crate) struct RecordingLoader<K> {
    calls: Mutex<Vec<Vec<K>>>,
}

impl<K> RecordingLoader<K> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    /// The batches seen so far, in dispatch order.
    pub(crate) fn calls(&self) -> Vec<Vec<K>>
    where
        K: Clone,
    {
        self.calls.lock().unwrap().clone()
    }
}

impl<K> BatchLoader<K, K> for RecordingLoader<K>
where
    K: Clone + fmt::Debug + Send + Sync,
{
    fn load(&self, batch: &[Arc<Task<K, K>>]) {
        self.calls
            .lock()
            .unwrap()
            .push(batch.iter().map(|task| task.key().clone()).collect());

        for task in batch {
            task.complete(task.key().clone())
                .expect("recording loader saw a task twice");
        }
    }
}
