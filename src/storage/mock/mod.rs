//! Mock storage backends for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LogBackend, Result, SnapshotBackend, StorageError};

/// Mock log backend that keeps lines in memory.
///
/// The `fail_on_*` toggles make subsequent operations fail, for exercising
/// error paths.
#[derive(Default)]
pub struct MockLogBackend {
    lines: RwLock<Vec<String>>,
    fail_on_append: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl MockLogBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `lines`, as if written by a prior run.
    pub fn seeded(lines: Vec<String>) -> Self {
        Self {
            lines: RwLock::new(lines),
            ..Self::default()
        }
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Lines currently held, for assertions.
    pub async fn lines(&self) -> Vec<String> {
        self.lines.read().await.clone()
    }
}

#[async_trait]
impl LogBackend for MockLogBackend {
    async fn read_lines(&self) -> Result<Vec<String>> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::ReadFailed("simulated read failure".to_string()));
        }
        Ok(self.lines.read().await.clone())
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        if *self.fail_on_append.read().await {
            return Err(StorageError::AppendFailed(
                "simulated append failure".to_string(),
            ));
        }
        self.lines.write().await.push(line.to_string());
        Ok(())
    }
}

/// Mock snapshot backend holding one document in memory.
#[derive(Default)]
pub struct MockSnapshotBackend {
    document: RwLock<Option<String>>,
    store_calls: RwLock<u32>,
    fail_on_load: RwLock<bool>,
    fail_on_store: RwLock<bool>,
}

impl MockSnapshotBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `document`, as if written by a prior run.
    pub fn seeded(document: impl Into<String>) -> Self {
        Self {
            document: RwLock::new(Some(document.into())),
            ..Self::default()
        }
    }

    pub async fn set_fail_on_load(&self, fail: bool) {
        *self.fail_on_load.write().await = fail;
    }

    pub async fn set_fail_on_store(&self, fail: bool) {
        *self.fail_on_store.write().await = fail;
    }

    /// The stored document, for assertions.
    pub async fn document(&self) -> Option<String> {
        self.document.read().await.clone()
    }

    /// How many times `store` has been attempted (including failures).
    pub async fn store_calls(&self) -> u32 {
        *self.store_calls.read().await
    }
}

#[async_trait]
impl SnapshotBackend for MockSnapshotBackend {
    async fn load(&self) -> Result<Option<String>> {
        if *self.fail_on_load.read().await {
            return Err(StorageError::ReadFailed("simulated load failure".to_string()));
        }
        Ok(self.document.read().await.clone())
    }

    async fn store(&self, document: &str) -> Result<()> {
        *self.store_calls.write().await += 1;
        if *self.fail_on_store.read().await {
            return Err(StorageError::WriteFailed(
                "simulated store failure".to_string(),
            ));
        }
        *self.document.write().await = Some(document.to_string());
        Ok(())
    }
}
