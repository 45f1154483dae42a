//! Top-level orchestration.
//!
//! [`RandomXContext`] owns the flag set, the keyed resource, and the
//! registry of live VMs. One mutex guards the interior, which gives every
//! rekey the single-writer discipline the resource needs: no caller can
//! observe a handle mid-replacement, and `create_vm` always binds against
//! a settled resource.
//!
//! What the mutex does *not* cover is hashing through a VM handle obtained
//! before a rekey. A caller that rekeys while other threads are actively
//! hashing must quiesce those threads first, or treat every outstanding
//! binding as invalidated by the rekey. That is a documented contract,
//! not something this crate enforces on the hash hot path.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::debug;

use crate::builder::DatasetBuilder;
use crate::engine::{HashingEngine, ResourceHandle};
use crate::error::{ContextError, HostResult};
use crate::flags::FlagSet;
use crate::metrics::RekeyMetrics;
use crate::resource::{KeyedResource, RekeyOutcome};
use crate::vm::{destroy_in_cell, VmHandle, VmState};

/// Construction surface for [`RandomXContext`].
pub struct ContextBuilder {
    engine: Arc<dyn HashingEngine>,
    flags: FlagSet,
    fast_init: bool,
    workers: Option<usize>,
}

impl ContextBuilder {
    pub fn new(engine: Arc<dyn HashingEngine>) -> Self {
        ContextBuilder {
            engine,
            flags: FlagSet::empty(),
            fast_init: false,
            workers: None,
        }
    }

    /// Capability flags; immutable once the context is built.
    pub fn flags(mut self, flags: FlagSet) -> Self {
        self.flags = flags;
        self
    }

    /// Use the parallel fast path for dataset builds.
    pub fn fast_init(mut self, fast_init: bool) -> Self {
        self.fast_init = fast_init;
        self
    }

    /// Dataset-build worker count. Defaults to the host's available
    /// parallelism.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn build(self) -> RandomXContext {
        let builder = match self.workers {
            Some(n) => DatasetBuilder::new(n),
            None => DatasetBuilder::for_host(),
        };
        RandomXContext {
            flags: self.flags,
            engine: self.engine.clone(),
            inner: Mutex::new(Inner {
                resource: KeyedResource::new(self.engine, self.flags, builder, self.fast_init),
                vms: Vec::new(),
                destroyed: false,
            }),
        }
    }
}

struct Inner {
    resource: KeyedResource,
    vms: Vec<Weak<Mutex<VmState>>>,
    destroyed: bool,
}

/// Orchestrates cache/dataset lifecycle and the pool of VMs over an
/// injected hashing engine.
pub struct RandomXContext {
    flags: FlagSet,
    engine: Arc<dyn HashingEngine>,
    inner: Mutex<Inner>,
}

impl RandomXContext {
    pub fn builder(engine: Arc<dyn HashingEngine>) -> ContextBuilder {
        ContextBuilder::new(engine)
    }

    /// Context with default worker count, no builder ceremony.
    pub fn new(engine: Arc<dyn HashingEngine>, flags: FlagSet, fast_init: bool) -> Self {
        ContextBuilder::new(engine)
            .flags(flags)
            .fast_init(fast_init)
            .build()
    }

    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    /// Materialize the cache (or, in full mode, the dataset) for `key`.
    ///
    /// Blocks until derivation completes, including all dataset-build
    /// workers. A byte-identical key is a no-op.
    pub fn init(&self, key: &[u8]) -> HostResult<()> {
        let mut inner = self.lock();
        if inner.destroyed {
            return Err(ContextError::Destroyed);
        }
        inner.resource.ensure_key(key).map(|_| ())
    }

    /// Create a VM bound to the current resource and register it for
    /// future rebinding. Requires a successful [`init`](Self::init).
    pub fn create_vm(&self) -> HostResult<VmHandle> {
        let mut inner = self.lock();
        if inner.destroyed {
            return Err(ContextError::Destroyed);
        }
        let resource = inner
            .resource
            .current_handle()
            .ok_or(ContextError::NotInitialized)?;
        let vm = VmHandle::create(self.engine.clone(), self.flags, resource)?;
        inner.vms.push(vm.registry_cell());
        Ok(vm)
    }

    /// Re-derive the resource for `key` and, if the key actually changed,
    /// repoint every registered VM at the new resource. The rekey and the
    /// rebind happen under one guard, so no caller can slip a `create_vm`
    /// or another rekey between them.
    pub fn change_key(&self, key: &[u8]) -> HostResult<()> {
        let mut inner = self.lock();
        if inner.destroyed {
            return Err(ContextError::Destroyed);
        }
        if inner.resource.ensure_key(key)? == RekeyOutcome::Unchanged {
            return Ok(());
        }
        let resource = inner
            .resource
            .current_handle()
            .ok_or(ContextError::NotInitialized)?;

        debug!("rebinding vm pool to the new resource");
        let engine = &self.engine;
        // Exhaustive by construction: a VM left on the released handle
        // would be a use-after-free. Dead cells are pruned.
        inner.vms.retain(|cell| match cell.upgrade() {
            Some(cell) => {
                let mut state = cell.lock().unwrap_or_else(|p| p.into_inner());
                if !state.alive {
                    return false;
                }
                match resource {
                    ResourceHandle::Cache(c) => engine.vm_set_cache(state.raw, c),
                    ResourceHandle::Dataset(d) => engine.vm_set_dataset(state.raw, d),
                }
                state.bound = resource;
                true
            }
            None => false,
        });
        Ok(())
    }

    /// Destroy every registered VM, release the current resource, and
    /// mark the context terminal. Idempotent; releases are best-effort.
    pub fn destroy(&self) {
        let mut inner = self.lock();
        if inner.destroyed {
            return;
        }
        for cell in inner.vms.drain(..) {
            if let Some(cell) = cell.upgrade() {
                let mut state = cell.lock().unwrap_or_else(|p| p.into_inner());
                destroy_in_cell(&self.engine, &mut state);
            }
        }
        inner.resource.release_all();
        inner.destroyed = true;
    }

    /// The currently materialized resource, if any.
    pub fn current_resource(&self) -> Option<ResourceHandle> {
        let inner = self.lock();
        if inner.destroyed {
            return None;
        }
        inner.resource.current_handle()
    }

    /// Snapshot of the last completed rekey.
    pub fn last_rekey_metrics(&self) -> Option<RekeyMetrics> {
        self.lock().resource.last_metrics()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RandomXContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
