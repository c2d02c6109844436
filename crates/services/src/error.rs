//! Shared error types for the services crate.

use thiserror::Error;

use annales_core::model::WipError;
use storage::StorageError;

/// Errors emitted by reactive values while loading or persisting.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("initial load from the local store failed: {0}")]
    LoadFailed(String),
    #[error("persistence worker is no longer running")]
    WorkerStopped,
    #[error("{0} background write(s) failed since the last flush")]
    WritesFailed(usize),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for session")]
    Empty,
    #[error("no session is ongoing")]
    NoSession,
    #[error(transparent)]
    Wip(#[from] WipError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Errors emitted while bootstrapping or resetting app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    State(#[from] StateError),
}
