//! Shared error types for the services crate.

use thiserror::Error;

use funnel_core::model::EntryId;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ChatSession`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChatError {
    #[error("no step machine registered for {0}")]
    NoMachine(funnel_core::model::ModuleId),
    #[error("unknown chat entry {0}")]
    UnknownEntry(EntryId),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Content(#[from] funnel_core::Error),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}
