//! The hashing-engine seam.
//!
//! The engine is an external collaborator: it owns all native memory and
//! performs the actual cache derivation, dataset item construction, and VM
//! execution. This crate only orchestrates it. Handles crossing the seam
//! are opaque pointer-width tokens minted by the engine — consumers never
//! dereference them, and validity is entirely the engine's business.
//!
//! Production deployments implement [`HashingEngine`] over their native
//! binding (FFI to librandomx or equivalent); tests implement it over
//! plain in-memory bookkeeping.

use thiserror::Error;

use crate::flags::FlagSet;

/// Error surfaced by a [`HashingEngine`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    #[error("initialization failed: {0}")]
    InitFailed(String),

    #[error("release failed: {0}")]
    ReleaseFailed(String),
}

/// Opaque token for an engine-owned cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheHandle(pub usize);

/// Opaque token for an engine-owned dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetHandle(pub usize);

/// Opaque token for an engine-owned VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawVmHandle(pub usize);

/// Whichever backing resource is currently materialized: the cache in
/// light mode, the dataset in full mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceHandle {
    Cache(CacheHandle),
    Dataset(DatasetHandle),
}

/// The external hashing engine.
///
/// Implementations must be callable from multiple threads: dataset
/// construction invokes [`init_dataset`](HashingEngine::init_dataset)
/// concurrently from several workers against the same cache handle
/// (read-only) and the same dataset handle (disjoint item ranges).
///
/// Release and destroy operations are fallible so teardown paths can
/// report failures; callers treat them as best-effort.
pub trait HashingEngine: Send + Sync {
    /// Allocate an uninitialized cache.
    fn alloc_cache(&self, flags: FlagSet) -> Result<CacheHandle, EngineError>;

    /// Derive cache contents from `key`.
    fn init_cache(&self, cache: CacheHandle, key: &[u8]) -> Result<(), EngineError>;

    /// Release a cache. The handle is dead afterwards.
    fn release_cache(&self, cache: CacheHandle) -> Result<(), EngineError>;

    /// Allocate an uninitialized dataset. `alloc_bits` carries only the
    /// bits dataset allocation honors (see [`FlagSet::dataset_alloc_bits`]).
    fn alloc_dataset(&self, alloc_bits: u32) -> Result<DatasetHandle, EngineError>;

    /// Number of items in a dataset; a fixed constant of the engine.
    fn dataset_item_count(&self) -> u64;

    /// Construct dataset items `[start_item, start_item + item_count)`
    /// from an initialized cache.
    fn init_dataset(
        &self,
        dataset: DatasetHandle,
        cache: CacheHandle,
        start_item: u64,
        item_count: u64,
    ) -> Result<(), EngineError>;

    /// Release a dataset. The handle is dead afterwards.
    fn release_dataset(&self, dataset: DatasetHandle) -> Result<(), EngineError>;

    /// Create a VM bound to the given cache and/or dataset. At least one
    /// must be present, matching the mode selected by `flags`.
    fn create_vm(
        &self,
        flags: FlagSet,
        cache: Option<CacheHandle>,
        dataset: Option<DatasetHandle>,
    ) -> Result<RawVmHandle, EngineError>;

    /// Repoint an existing VM at a new cache. Infallible at the engine
    /// level; the handles are required to be live.
    fn vm_set_cache(&self, vm: RawVmHandle, cache: CacheHandle);

    /// Repoint an existing VM at a new dataset. Infallible at the engine
    /// level; the handles are required to be live.
    fn vm_set_dataset(&self, vm: RawVmHandle, dataset: DatasetHandle);

    /// Destroy a VM. The handle is dead afterwards.
    fn destroy_vm(&self, vm: RawVmHandle) -> Result<(), EngineError>;
}
