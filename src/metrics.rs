//! Observability metrics for rekey operations.
//!
//! A rekey can take multiple seconds in full-memory mode, so the shape and
//! timing of the last one is worth exposing. Snapshots are plain serde
//! structs so hosts can ship them to whatever telemetry layer they run.

use serde::{Deserialize, Serialize};

/// Snapshot of the most recent completed rekey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RekeyMetrics {
    /// xxHash3-64 fingerprint of the key (label only, not an identity).
    pub key_fingerprint: u64,

    /// Whether the rekey materialized a dataset (full mode) or a cache.
    pub full_mem: bool,

    /// Cache derivation time in microseconds.
    pub cache_init_micros: u64,

    /// Dataset build time in microseconds (None in light mode).
    pub dataset_build_micros: Option<u64>,

    /// Worker count used for the dataset build (None in light mode).
    pub worker_count: Option<usize>,

    /// Dataset item count (None in light mode).
    pub item_count: Option<u64>,

    /// Whether the dataset build used the parallel fast path.
    pub fast_build: bool,
}

impl RekeyMetrics {
    pub fn new(key_fingerprint: u64, full_mem: bool) -> Self {
        RekeyMetrics {
            key_fingerprint,
            full_mem,
            cache_init_micros: 0,
            dataset_build_micros: None,
            worker_count: None,
            item_count: None,
            fast_build: false,
        }
    }

    /// Set cache derivation timing.
    pub fn with_cache_init(mut self, micros: u64) -> Self {
        self.cache_init_micros = micros;
        self
    }

    /// Set dataset build timing and shape.
    pub fn with_dataset_build(
        mut self,
        micros: u64,
        workers: usize,
        items: u64,
        fast: bool,
    ) -> Self {
        self.dataset_build_micros = Some(micros);
        self.worker_count = Some(workers);
        self.item_count = Some(items);
        self.fast_build = fast;
        self
    }

    /// Total rekey time in microseconds.
    pub fn total_micros(&self) -> u64 {
        self.cache_init_micros + self.dataset_build_micros.unwrap_or(0)
    }
}
