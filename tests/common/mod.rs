//! Shared test engine and fixtures.
//!
//! `CountingEngine` is an in-memory stand-in for the native hashing
//! engine. It mints opaque handle tokens, tracks which of them are live in
//! registries (so double-release and use-after-release show up as hard
//! test failures), counts every call for no-op-rekey assertions, and can
//! inject failures on demand.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use randomx_host::{
    CacheHandle, DatasetHandle, EngineError, FlagSet, HashingEngine, RawVmHandle, ResourceHandle,
};

/// Typical keys: hash digests.
pub const KEY_A: &[u8] = &[1, 2, 3];
pub const KEY_B: &[u8] = &[9, 8, 7, 6];

/// Default dataset item count reported by the test engine.
pub const ITEM_COUNT: u64 = 1000;

#[derive(Default)]
pub struct CallCounts {
    pub alloc_cache: AtomicUsize,
    pub init_cache: AtomicUsize,
    pub release_cache: AtomicUsize,
    pub alloc_dataset: AtomicUsize,
    pub init_dataset: AtomicUsize,
    pub release_dataset: AtomicUsize,
    pub create_vm: AtomicUsize,
    pub vm_set_cache: AtomicUsize,
    pub vm_set_dataset: AtomicUsize,
    pub destroy_vm: AtomicUsize,
}

impl CallCounts {
    /// Every engine call made so far, summed.
    pub fn total(&self) -> usize {
        self.alloc_cache.load(Ordering::SeqCst)
            + self.init_cache.load(Ordering::SeqCst)
            + self.release_cache.load(Ordering::SeqCst)
            + self.alloc_dataset.load(Ordering::SeqCst)
            + self.init_dataset.load(Ordering::SeqCst)
            + self.release_dataset.load(Ordering::SeqCst)
            + self.create_vm.load(Ordering::SeqCst)
            + self.vm_set_cache.load(Ordering::SeqCst)
            + self.vm_set_dataset.load(Ordering::SeqCst)
            + self.destroy_vm.load(Ordering::SeqCst)
    }
}

pub struct CountingEngine {
    next_handle: AtomicUsize,
    pub item_count: AtomicU64,
    pub counts: CallCounts,

    /// Live handle registries. A release of an unregistered handle panics
    /// the test: that is exactly the double-free we are guarding against.
    pub live_caches: Mutex<HashSet<usize>>,
    pub live_datasets: Mutex<HashSet<usize>>,
    pub live_vms: Mutex<HashSet<usize>>,

    /// Key bytes each live cache was initialized with.
    pub cache_keys: Mutex<HashMap<usize, Vec<u8>>>,
    /// `(dataset, start_item, item_count)` per init_dataset call.
    pub init_ranges: Mutex<Vec<(usize, u64, u64)>>,
    /// Last resource each live VM was pointed at.
    pub vm_bindings: Mutex<HashMap<usize, ResourceHandle>>,

    pub fail_alloc_cache: AtomicBool,
    pub fail_alloc_dataset: AtomicBool,
    /// Fail the init_dataset call covering this start item.
    pub fail_init_at_start: Mutex<Option<u64>>,
}

impl CountingEngine {
    pub fn new() -> Self {
        Self::with_item_count(ITEM_COUNT)
    }

    pub fn with_item_count(item_count: u64) -> Self {
        CountingEngine {
            next_handle: AtomicUsize::new(1),
            item_count: AtomicU64::new(item_count),
            counts: CallCounts::default(),
            live_caches: Mutex::new(HashSet::new()),
            live_datasets: Mutex::new(HashSet::new()),
            live_vms: Mutex::new(HashSet::new()),
            cache_keys: Mutex::new(HashMap::new()),
            init_ranges: Mutex::new(Vec::new()),
            vm_bindings: Mutex::new(HashMap::new()),
            fail_alloc_cache: AtomicBool::new(false),
            fail_alloc_dataset: AtomicBool::new(false),
            fail_init_at_start: Mutex::new(None),
        }
    }

    fn mint(&self) -> usize {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    pub fn live_cache_count(&self) -> usize {
        self.live_caches.lock().unwrap().len()
    }

    pub fn live_dataset_count(&self) -> usize {
        self.live_datasets.lock().unwrap().len()
    }

    pub fn live_vm_count(&self) -> usize {
        self.live_vms.lock().unwrap().len()
    }

    /// Asserts every handle ever minted has been released.
    pub fn assert_no_leaks(&self) {
        assert_eq!(self.live_cache_count(), 0, "leaked caches");
        assert_eq!(self.live_dataset_count(), 0, "leaked datasets");
        assert_eq!(self.live_vm_count(), 0, "leaked vms");
    }

    /// The resource the engine last bound `vm` to.
    pub fn binding_of(&self, vm: RawVmHandle) -> Option<ResourceHandle> {
        self.vm_bindings.lock().unwrap().get(&vm.0).copied()
    }
}

impl Default for CountingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HashingEngine for CountingEngine {
    fn alloc_cache(&self, _flags: FlagSet) -> Result<CacheHandle, EngineError> {
        self.counts.alloc_cache.fetch_add(1, Ordering::SeqCst);
        if self.fail_alloc_cache.load(Ordering::SeqCst) {
            return Err(EngineError::AllocationFailed("cache alloc rejected".into()));
        }
        let handle = self.mint();
        self.live_caches.lock().unwrap().insert(handle);
        Ok(CacheHandle(handle))
    }

    fn init_cache(&self, cache: CacheHandle, key: &[u8]) -> Result<(), EngineError> {
        self.counts.init_cache.fetch_add(1, Ordering::SeqCst);
        assert!(
            self.live_caches.lock().unwrap().contains(&cache.0),
            "init_cache on a dead cache handle"
        );
        self.cache_keys.lock().unwrap().insert(cache.0, key.to_vec());
        Ok(())
    }

    fn release_cache(&self, cache: CacheHandle) -> Result<(), EngineError> {
        self.counts.release_cache.fetch_add(1, Ordering::SeqCst);
        assert!(
            self.live_caches.lock().unwrap().remove(&cache.0),
            "double release of cache handle"
        );
        self.cache_keys.lock().unwrap().remove(&cache.0);
        Ok(())
    }

    fn alloc_dataset(&self, _alloc_bits: u32) -> Result<DatasetHandle, EngineError> {
        self.counts.alloc_dataset.fetch_add(1, Ordering::SeqCst);
        if self.fail_alloc_dataset.load(Ordering::SeqCst) {
            return Err(EngineError::AllocationFailed(
                "dataset alloc rejected".into(),
            ));
        }
        let handle = self.mint();
        self.live_datasets.lock().unwrap().insert(handle);
        Ok(DatasetHandle(handle))
    }

    fn dataset_item_count(&self) -> u64 {
        self.item_count.load(Ordering::SeqCst)
    }

    fn init_dataset(
        &self,
        dataset: DatasetHandle,
        cache: CacheHandle,
        start_item: u64,
        item_count: u64,
    ) -> Result<(), EngineError> {
        self.counts.init_dataset.fetch_add(1, Ordering::SeqCst);
        // The shared-cache lifetime invariant: a worker must never run
        // against a cache that has already been released.
        assert!(
            self.live_caches.lock().unwrap().contains(&cache.0),
            "init_dataset reading a released cache"
        );
        assert!(
            self.live_datasets.lock().unwrap().contains(&dataset.0),
            "init_dataset writing a released dataset"
        );
        self.init_ranges
            .lock()
            .unwrap()
            .push((dataset.0, start_item, item_count));
        if *self.fail_init_at_start.lock().unwrap() == Some(start_item) {
            return Err(EngineError::InitFailed(format!(
                "injected failure at item {start_item}"
            )));
        }
        Ok(())
    }

    fn release_dataset(&self, dataset: DatasetHandle) -> Result<(), EngineError> {
        self.counts.release_dataset.fetch_add(1, Ordering::SeqCst);
        assert!(
            self.live_datasets.lock().unwrap().remove(&dataset.0),
            "double release of dataset handle"
        );
        Ok(())
    }

    fn create_vm(
        &self,
        flags: FlagSet,
        cache: Option<CacheHandle>,
        dataset: Option<DatasetHandle>,
    ) -> Result<RawVmHandle, EngineError> {
        self.counts.create_vm.fetch_add(1, Ordering::SeqCst);
        let bound = match (flags.full_mem(), cache, dataset) {
            (true, None, Some(d)) => ResourceHandle::Dataset(d),
            (false, Some(c), None) => ResourceHandle::Cache(c),
            _ => {
                return Err(EngineError::AllocationFailed(
                    "vm requested with handles not matching the mode".into(),
                ))
            }
        };
        let handle = self.mint();
        self.live_vms.lock().unwrap().insert(handle);
        self.vm_bindings.lock().unwrap().insert(handle, bound);
        Ok(RawVmHandle(handle))
    }

    fn vm_set_cache(&self, vm: RawVmHandle, cache: CacheHandle) {
        self.counts.vm_set_cache.fetch_add(1, Ordering::SeqCst);
        assert!(
            self.live_vms.lock().unwrap().contains(&vm.0),
            "vm_set_cache on a destroyed vm"
        );
        assert!(
            self.live_caches.lock().unwrap().contains(&cache.0),
            "vm_set_cache to a released cache"
        );
        self.vm_bindings
            .lock()
            .unwrap()
            .insert(vm.0, ResourceHandle::Cache(cache));
    }

    fn vm_set_dataset(&self, vm: RawVmHandle, dataset: DatasetHandle) {
        self.counts.vm_set_dataset.fetch_add(1, Ordering::SeqCst);
        assert!(
            self.live_vms.lock().unwrap().contains(&vm.0),
            "vm_set_dataset on a destroyed vm"
        );
        assert!(
            self.live_datasets.lock().unwrap().contains(&dataset.0),
            "vm_set_dataset to a released dataset"
        );
        self.vm_bindings
            .lock()
            .unwrap()
            .insert(vm.0, ResourceHandle::Dataset(dataset));
    }

    fn destroy_vm(&self, vm: RawVmHandle) -> Result<(), EngineError> {
        self.counts.destroy_vm.fetch_add(1, Ordering::SeqCst);
        assert!(
            self.live_vms.lock().unwrap().remove(&vm.0),
            "double destroy of vm handle"
        );
        self.vm_bindings.lock().unwrap().remove(&vm.0);
        Ok(())
    }
}
