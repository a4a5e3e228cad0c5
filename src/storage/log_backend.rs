//! Append-only line storage behind the event log.

use async_trait::async_trait;

use super::Result;

/// Durable line-oriented storage for the event log.
///
/// One line is one serialized event. Lines are appended only; a backend
/// never rewrites or truncates existing lines.
///
/// Implementations:
/// - [`FileLogBackend`](super::FileLogBackend) - append-only local file,
///   fsynced per append
/// - [`MockLogBackend`](super::MockLogBackend) - in-memory, for tests
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Read every stored line in append order.
    ///
    /// A backend with no prior data returns an empty vector, not an error.
    async fn read_lines(&self) -> Result<Vec<String>>;

    /// Durably append one line.
    ///
    /// The line must survive a process crash once this returns `Ok`.
    async fn append_line(&self, line: &str) -> Result<()>;
}
