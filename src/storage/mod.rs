//! Pluggable persistence backends.
//!
//! The log and state-store cores are storage-agnostic: the log appends lines
//! through a [`LogBackend`] and a state store mirrors one JSON document
//! through a [`SnapshotBackend`].
//!
//! ## Backends
//!
//! - [`FileLogBackend`] / [`FileSnapshotBackend`] - local files
//! - [`MockLogBackend`] / [`MockSnapshotBackend`] - in-memory backends with
//!   failure injection, for tests

mod log_backend;
mod snapshot_backend;

pub mod file;
pub mod mock;

pub use file::{FileLogBackend, FileSnapshotBackend};
pub use log_backend::LogBackend;
pub use mock::{MockLogBackend, MockSnapshotBackend};
pub use snapshot_backend::SnapshotBackend;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{LogConfig, SnapshotConfig};

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read from backend: {0}")]
    ReadFailed(String),

    #[error("Failed to append to backend: {0}")]
    AppendFailed(String),

    #[error("Failed to write document: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Factory
// ============================================================================

/// Open the file-backed log backend described by `config`.
///
/// Creates parent directories if they don't exist.
pub async fn open_log_backend(config: &LogConfig) -> Result<Arc<dyn LogBackend>> {
    info!(path = %config.path.display(), "Log backend: file");
    let backend = FileLogBackend::open(&config.path).await?;
    Ok(Arc::new(backend))
}

/// Open the file-backed snapshot backend for the store named `store`.
///
/// The document lives at `<config.dir>/<store>.json`.
pub async fn open_snapshot_backend(
    config: &SnapshotConfig,
    store: &str,
) -> Result<Arc<dyn SnapshotBackend>> {
    let path = config.document_path(store);
    info!(store = %store, path = %path.display(), "Snapshot backend: file");
    let backend = FileSnapshotBackend::open(path).await?;
    Ok(Arc::new(backend))
}
