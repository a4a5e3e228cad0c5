//! File-backed persistence.
//!
//! The log backend owns an append-mode handle to a newline-delimited file
//! and fsyncs after every append. The snapshot backend replaces its document
//! atomically by writing a temp file and renaming it over the target.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{LogBackend, Result, SnapshotBackend};

/// Append-only file store for event log lines.
pub struct FileLogBackend {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogBackend {
    /// Open (or create) the backing file.
    ///
    /// Creates parent directories if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl LogBackend for FileLogBackend {
    async fn read_lines(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents.lines().map(str::to_owned).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        // Single buffer so the line and its terminator land in one write.
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        // The line must survive a crash once we return Ok.
        file.sync_data().await?;
        debug!(path = %self.path.display(), bytes = line.len(), "Appended log line");
        Ok(())
    }
}

/// Single-document file store for one read model's snapshot.
pub struct FileSnapshotBackend {
    path: PathBuf,
}

impl FileSnapshotBackend {
    /// Open a snapshot document store at `path`.
    ///
    /// Creates parent directories if they don't exist; the document itself
    /// appears on first store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl SnapshotBackend for FileSnapshotBackend {
    async fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, document: &str) -> Result<()> {
        // Write atomically using temp file + rename
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, document).await?;
        fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), bytes = document.len(), "Stored snapshot document");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
