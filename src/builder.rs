//! Parallel dataset construction.
//!
//! Dataset derivation is embarrassingly parallel over the item index, so
//! the fast path splits `[0, item_count)` into contiguous disjoint ranges
//! and dispatches one worker thread per range. All workers share the
//! cache read-only and write disjoint item ranges of the same dataset.
//!
//! The build always waits for every worker before returning, even when
//! one fails: the caller releases the cache right after the build, and a
//! worker still reading it at that point would be a use-after-free.

use std::sync::Mutex;
use std::thread;

use log::debug;

use crate::engine::{CacheHandle, DatasetHandle, EngineError, HashingEngine};
use crate::error::{ContextError, HostResult};

/// Fans dataset construction out across a configurable number of workers.
#[derive(Debug, Clone, Copy)]
pub struct DatasetBuilder {
    workers: usize,
}

impl DatasetBuilder {
    /// Builder with an explicit worker count (clamped to at least 1).
    pub fn new(workers: usize) -> Self {
        DatasetBuilder {
            workers: workers.max(1),
        }
    }

    /// Builder sized to the host's available parallelism.
    pub fn for_host() -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        DatasetBuilder { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Populate `dataset` from an initialized `cache`.
    ///
    /// With `fast` unset the whole range is one unit of work. With `fast`
    /// set, one worker runs per non-empty partition; the first worker
    /// error is captured and returned, but only after every worker has
    /// joined.
    pub fn build(
        &self,
        engine: &dyn HashingEngine,
        dataset: DatasetHandle,
        cache: CacheHandle,
        item_count: u64,
        fast: bool,
    ) -> HostResult<()> {
        if !fast {
            return engine
                .init_dataset(dataset, cache, 0, item_count)
                .map_err(ContextError::WorkerFailed);
        }

        let parts = partitions(item_count, self.workers);
        debug!(
            "building dataset: {} items across {} workers",
            item_count, self.workers
        );

        let first_error: Mutex<Option<EngineError>> = Mutex::new(None);
        thread::scope(|scope| {
            for &(start, count) in &parts {
                if count == 0 {
                    continue;
                }
                let first_error = &first_error;
                scope.spawn(move || {
                    if let Err(e) = engine.init_dataset(dataset, cache, start, count) {
                        let mut slot = first_error.lock().unwrap_or_else(|p| p.into_inner());
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                });
            }
            // scope exit joins every worker before the error is inspected
        });

        let failed = first_error
            .into_inner()
            .unwrap_or_else(|p| p.into_inner());
        match failed {
            Some(e) => Err(ContextError::WorkerFailed(e)),
            None => Ok(()),
        }
    }
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::for_host()
    }
}

/// Split `[0, item_count)` into exactly `workers` contiguous ranges.
///
/// Each range gets `item_count / workers` items; the remainder goes to
/// the last range, so the union is exact and the ranges are pairwise
/// disjoint. Ranges may be empty when `item_count < workers`.
pub(crate) fn partitions(item_count: u64, workers: usize) -> Vec<(u64, u64)> {
    let workers = workers.max(1);
    let per_worker = item_count / workers as u64;
    let remainder = item_count % workers as u64;

    let mut parts = Vec::with_capacity(workers);
    let mut start = 0;
    for i in 0..workers {
        let count = if i == workers - 1 {
            per_worker + remainder
        } else {
            per_worker
        };
        parts.push((start, count));
        start += count;
    }
    parts
}
