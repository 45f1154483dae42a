//! Keyed ownership of the cache or dataset.
//!
//! [`KeyedResource`] is the single owner of whichever native resource the
//! mode calls for: the cache in light mode, the dataset in full mode.
//! Re-keying with the byte-identical key is a no-op — the central
//! optimization that avoids redundant multi-second dataset rebuilds.
//!
//! Replacement order is fixed: allocate the new resource, verify it is
//! fully initialized, release the old one, store the new one. A failure
//! anywhere leaves the previous resource valid and current.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;
use zeroize::Zeroizing;

use crate::builder::DatasetBuilder;
use crate::engine::{CacheHandle, DatasetHandle, HashingEngine, ResourceHandle};
use crate::error::{ContextError, HostResult};
use crate::flags::FlagSet;
use crate::metrics::RekeyMetrics;

/// Outcome of an [`ensure_key`](KeyedResource::ensure_key) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RekeyOutcome {
    /// The key was already materialized; nothing was touched.
    Unchanged,
    /// A new cache or dataset was derived and is now current.
    Rekeyed,
}

pub(crate) struct KeyedResource {
    engine: Arc<dyn HashingEngine>,
    flags: FlagSet,
    builder: DatasetBuilder,
    fast_init: bool,
    cache: Option<CacheHandle>,
    dataset: Option<DatasetHandle>,
    current_key: Option<Zeroizing<Vec<u8>>>,
    last_metrics: Option<RekeyMetrics>,
}

impl KeyedResource {
    pub(crate) fn new(
        engine: Arc<dyn HashingEngine>,
        flags: FlagSet,
        builder: DatasetBuilder,
        fast_init: bool,
    ) -> Self {
        KeyedResource {
            engine,
            flags,
            builder,
            fast_init,
            cache: None,
            dataset: None,
            current_key: None,
            last_metrics: None,
        }
    }

    /// Materialize the resource for `key`, unless it already is.
    pub(crate) fn ensure_key(&mut self, key: &[u8]) -> HostResult<RekeyOutcome> {
        let fingerprint = xxh3_64(key);
        if self
            .current_key
            .as_ref()
            .is_some_and(|current| current.as_slice() == key)
        {
            debug!("key {:016x} already materialized, skipping rekey", fingerprint);
            return Ok(RekeyOutcome::Unchanged);
        }

        let metrics = if self.flags.full_mem() {
            self.rekey_dataset(key, fingerprint)?
        } else {
            self.rekey_cache(key, fingerprint)?
        };
        info!(
            "rekeyed to {:016x} in {}us (full_mem={})",
            fingerprint,
            metrics.total_micros(),
            metrics.full_mem
        );
        self.last_metrics = Some(metrics);
        self.current_key = Some(Zeroizing::new(key.to_vec()));
        Ok(RekeyOutcome::Rekeyed)
    }

    /// The handle VMs bind to: dataset in full mode, cache otherwise.
    pub(crate) fn current_handle(&self) -> Option<ResourceHandle> {
        match (self.cache, self.dataset) {
            (_, Some(dataset)) => Some(ResourceHandle::Dataset(dataset)),
            (Some(cache), None) => Some(ResourceHandle::Cache(cache)),
            (None, None) => None,
        }
    }

    pub(crate) fn last_metrics(&self) -> Option<RekeyMetrics> {
        self.last_metrics.clone()
    }

    /// Release whichever resource is held. Best-effort; failures are
    /// reported but do not stop teardown.
    pub(crate) fn release_all(&mut self) {
        if let Some(cache) = self.cache.take() {
            if let Err(e) = self.engine.release_cache(cache) {
                warn!("cache release failed during teardown: {e}");
            }
        }
        if let Some(dataset) = self.dataset.take() {
            if let Err(e) = self.engine.release_dataset(dataset) {
                warn!("dataset release failed during teardown: {e}");
            }
        }
        self.current_key = None;
    }

    /// Allocate and initialize a cache for `key`. On init failure the
    /// fresh allocation is released before the error propagates.
    fn derive_cache(&self, key: &[u8]) -> HostResult<CacheHandle> {
        let cache = self
            .engine
            .alloc_cache(self.flags)
            .map_err(ContextError::Allocation)?;
        if let Err(e) = self.engine.init_cache(cache, key) {
            if let Err(release_err) = self.engine.release_cache(cache) {
                warn!("cache release failed after init failure: {release_err}");
            }
            return Err(ContextError::Allocation(e));
        }
        Ok(cache)
    }

    fn rekey_cache(&mut self, key: &[u8], fingerprint: u64) -> HostResult<RekeyMetrics> {
        let started = Instant::now();
        let new_cache = self.derive_cache(key)?;
        let cache_micros = started.elapsed().as_micros() as u64;

        // The new cache is fully initialized; only now may the old one go.
        if let Some(old) = self.cache.take() {
            if let Err(e) = self.engine.release_cache(old) {
                warn!("stale cache release failed: {e}");
            }
        }
        self.cache = Some(new_cache);

        Ok(RekeyMetrics::new(fingerprint, false).with_cache_init(cache_micros))
    }

    fn rekey_dataset(&mut self, key: &[u8], fingerprint: u64) -> HostResult<RekeyMetrics> {
        // The cache here is a private intermediate: full mode never
        // exposes a standalone cache to callers.
        let started = Instant::now();
        let cache = self.derive_cache(key)?;
        let cache_micros = started.elapsed().as_micros() as u64;

        let dataset = match self.engine.alloc_dataset(self.flags.dataset_alloc_bits()) {
            Ok(dataset) => dataset,
            Err(e) => {
                self.release_transient_cache(cache);
                return Err(ContextError::Allocation(e));
            }
        };

        let item_count = self.engine.dataset_item_count();
        let build_started = Instant::now();
        if let Err(e) = self
            .builder
            .build(&*self.engine, dataset, cache, item_count, self.fast_init)
        {
            // Every worker has joined by now, so the cache is safe to free.
            if let Err(release_err) = self.engine.release_dataset(dataset) {
                warn!("dataset release failed after build failure: {release_err}");
            }
            self.release_transient_cache(cache);
            return Err(e);
        }
        let build_micros = build_started.elapsed().as_micros() as u64;

        // Dataset is fully built; the intermediate cache is done for.
        self.release_transient_cache(cache);

        if let Some(old) = self.dataset.take() {
            if let Err(e) = self.engine.release_dataset(old) {
                warn!("stale dataset release failed: {e}");
            }
        }
        self.dataset = Some(dataset);

        Ok(RekeyMetrics::new(fingerprint, true)
            .with_cache_init(cache_micros)
            .with_dataset_build(
                build_micros,
                self.builder.workers(),
                item_count,
                self.fast_init,
            ))
    }

    fn release_transient_cache(&self, cache: CacheHandle) {
        if let Err(e) = self.engine.release_cache(cache) {
            warn!("intermediate cache release failed: {e}");
        }
    }
}
