//! # randomx-host
//!
//! Lifecycle orchestration for RandomX execution state: the key-derived
//! cache, the gigabyte-scale dataset built from it, and the pool of VM
//! handles that hash against whichever of the two is current.
//!
//! This crate computes no hashes. It drives an injected [`HashingEngine`]
//! — the native binding that owns all memory and does the actual work —
//! and takes care of the part that is easy to get wrong: allocating,
//! re-keying, and tearing down large native resources without ever leaving
//! a VM pointed at released memory.
//!
//! ## Modes
//!
//! | Mode | Flag | Backing resource |
//! |:-----|:-----|:-----------------|
//! | Light | (default) | cache only — low memory, slower per hash |
//! | Full | [`Flag::FullMem`] | dataset — gigabytes, faster per hash |
//!
//! In full mode the cache is a private intermediate: it exists only long
//! enough to build the dataset and is released as soon as the build
//! finishes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use randomx_host::{Flag, RandomXContext};
//!
//! let context = RandomXContext::builder(engine)
//!     .flags(Flag::FullMem | Flag::Jit)
//!     .fast_init(true)
//!     .build();
//!
//! context.init(b"block-hash-key")?;
//! let vm = context.create_vm()?;
//!
//! // ... hash through vm.raw() via your engine binding ...
//!
//! // A new key rebuilds the dataset and repoints every live VM.
//! context.change_key(b"next-block-hash-key")?;
//! ```
//!
//! ## Guarantees
//!
//! - **Idempotent rekey**: a byte-identical key is a pure no-op — no
//!   engine calls, no multi-second dataset rebuild.
//! - **Atomic replacement**: allocate-new, verify, release-old, store-new.
//!   A failed rekey leaves the previous resource valid and current.
//! - **Exhaustive rebinding**: after a real key change, every registered
//!   VM points at the new resource before `change_key` returns.
//! - **Join-all builds**: dataset workers are always joined before the
//!   shared cache is released, even when one of them fails.
//!
//! ## What is not guaranteed
//!
//! Hashing through an already-bound VM is not synchronized against
//! rekeying. Quiesce hashing before `change_key`, or treat outstanding
//! VM bindings as invalidated by any rekey.

pub mod builder;
pub mod context;
pub mod engine;
pub mod error;
pub mod flags;
pub mod metrics;
mod resource;
pub mod vm;

pub use builder::DatasetBuilder;
pub use context::{ContextBuilder, RandomXContext};
pub use engine::{
    CacheHandle, DatasetHandle, EngineError, HashingEngine, RawVmHandle, ResourceHandle,
};
pub use error::{ContextError, HostResult};
pub use flags::{Flag, FlagSet};
pub use metrics::RekeyMetrics;
pub use vm::VmHandle;
