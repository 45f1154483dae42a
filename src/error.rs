//! Orchestration-level error types.

use thiserror::Error;

use crate::engine::EngineError;

pub type HostResult<T> = Result<T, ContextError>;

/// Errors returned by the caller-facing orchestration API.
///
/// Failures never leave a partially-initialized resource current: an
/// allocation or build failure rolls back to the previous valid state.
/// This crate never retries internally; re-attempting after a transient
/// native failure is caller policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The engine could not allocate a cache, dataset, or VM.
    #[error("engine allocation failed")]
    Allocation(#[source] EngineError),

    /// A dataset-build partition failed. Surfaced only after every
    /// worker has finished.
    #[error("dataset build worker failed")]
    WorkerFailed(#[source] EngineError),

    /// An operation that needs a materialized cache or dataset was called
    /// before any successful init.
    #[error("no cache or dataset has been initialized")]
    NotInitialized,

    /// A VM was requested with a resource handle that does not match the
    /// mode fixed by the flag set.
    #[error("resource handle does not match the active mode")]
    ModeMismatch,

    /// The context was destroyed and is terminal.
    #[error("context has been destroyed")]
    Destroyed,

    /// A VM handle was used after its native VM was destroyed.
    /// Programming error on the caller's side.
    #[error("vm has been destroyed")]
    VmDestroyed,
}
