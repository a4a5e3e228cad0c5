//! Single-document storage behind a state store.

use async_trait::async_trait;

use super::Result;

/// Storage for one read model's snapshot document.
///
/// The document is replaced wholesale on every write; readers must never
/// observe a partial document.
///
/// Implementations:
/// - [`FileSnapshotBackend`](super::FileSnapshotBackend) - local file,
///   atomic replace via temp file + rename
/// - [`MockSnapshotBackend`](super::MockSnapshotBackend) - in-memory, for
///   tests
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Load the stored document, or `None` if none was ever written.
    async fn load(&self) -> Result<Option<String>>;

    /// Atomically replace the stored document.
    async fn store(&self, document: &str) -> Result<()>;
}
