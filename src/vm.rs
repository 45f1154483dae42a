//! VM handles.
//!
//! A [`VmHandle`] is a computation context bound to the current cache or
//! dataset. The caller is the primary owner; the context keeps only a weak
//! reference so it can repoint every live VM when the key changes. The VM
//! state sits behind a shared cell so both sides observe the same binding
//! and liveness.
//!
//! Use after [`destroy`](VmHandle::destroy) is a programming error; it is
//! surfaced as [`ContextError::VmDestroyed`] rather than undefined
//! behavior.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use log::warn;

use crate::engine::{HashingEngine, RawVmHandle, ResourceHandle};
use crate::error::{ContextError, HostResult};
use crate::flags::FlagSet;

pub(crate) struct VmState {
    pub(crate) raw: RawVmHandle,
    pub(crate) bound: ResourceHandle,
    pub(crate) alive: bool,
}

/// A single VM, bound to its owning context's current resource.
pub struct VmHandle {
    engine: Arc<dyn HashingEngine>,
    state: Arc<Mutex<VmState>>,
}

impl fmt::Debug for VmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmHandle").finish_non_exhaustive()
    }
}

impl VmHandle {
    /// Create a VM bound to `resource`. The resource must match the mode
    /// fixed by `flags`: a dataset under `FULL_MEM`, a cache otherwise.
    pub(crate) fn create(
        engine: Arc<dyn HashingEngine>,
        flags: FlagSet,
        resource: ResourceHandle,
    ) -> HostResult<Self> {
        let (cache, dataset) = match resource {
            ResourceHandle::Cache(c) if !flags.full_mem() => (Some(c), None),
            ResourceHandle::Dataset(d) if flags.full_mem() => (None, Some(d)),
            _ => return Err(ContextError::ModeMismatch),
        };
        let raw = engine
            .create_vm(flags, cache, dataset)
            .map_err(ContextError::Allocation)?;
        Ok(VmHandle {
            engine,
            state: Arc::new(Mutex::new(VmState {
                raw,
                bound: resource,
                alive: true,
            })),
        })
    }

    /// Weak cell handed to the context registry for rebinding.
    pub(crate) fn registry_cell(&self) -> Weak<Mutex<VmState>> {
        Arc::downgrade(&self.state)
    }

    /// Repoint this VM at `resource` without reallocating it.
    pub fn bind(&self, resource: ResourceHandle) -> HostResult<()> {
        let mut state = lock(&self.state);
        if !state.alive {
            return Err(ContextError::VmDestroyed);
        }
        match resource {
            ResourceHandle::Cache(c) => self.engine.vm_set_cache(state.raw, c),
            ResourceHandle::Dataset(d) => self.engine.vm_set_dataset(state.raw, d),
        }
        state.bound = resource;
        Ok(())
    }

    /// The resource this VM currently points at, or `None` once destroyed.
    pub fn bound_resource(&self) -> Option<ResourceHandle> {
        let state = lock(&self.state);
        state.alive.then_some(state.bound)
    }

    /// Raw engine token, for callers driving the engine's hash calls
    /// directly. `None` once destroyed.
    pub fn raw(&self) -> Option<RawVmHandle> {
        let state = lock(&self.state);
        state.alive.then_some(state.raw)
    }

    pub fn is_alive(&self) -> bool {
        lock(&self.state).alive
    }

    /// Release the native VM. Idempotent; a failed engine release is
    /// reported but the handle is dead either way.
    pub fn destroy(&self) {
        destroy_in_cell(&self.engine, &mut lock(&self.state));
    }
}

impl Drop for VmHandle {
    fn drop(&mut self) {
        // The handle is the caller's only owner, so dropping it always
        // relinquishes the VM. The alive flag keeps this from racing a
        // context-side destroy; the registry prunes the dead cell later.
        destroy_in_cell(&self.engine, &mut lock(&self.state));
    }
}

/// Destroy the native VM behind a state cell, if still alive.
pub(crate) fn destroy_in_cell(engine: &Arc<dyn HashingEngine>, state: &mut VmState) {
    if !state.alive {
        return;
    }
    state.alive = false;
    if let Err(e) = engine.destroy_vm(state.raw) {
        warn!("vm destroy failed: {e}");
    }
}

fn lock(state: &Arc<Mutex<VmState>>) -> std::sync::MutexGuard<'_, VmState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
