//! Versioned read-model state stores.
//!
//! A [`StateStore`] owns one read model's current state in memory and mirrors
//! it to a single JSON snapshot document. The in-memory value is authoritative
//! at all times; the persisted copy may lag behind it.
//!
//! Every accepted update carries a version, the index of the last event folded
//! into the state. Versions must strictly increase, which makes replay after a
//! crash idempotent: a consumer resumes from the log's beginning and skips
//! events at or below the version it finds persisted. Whether to skip is the
//! consumer's call; the store only enforces the ordering.
//!
//! Persistence is throttled to at most one backend write per interval. The
//! most recent accepted state always reaches the backend eventually, but
//! intermediate states inside a throttle window may never be written. Call
//! [`StateStore::close`] on shutdown so the final state is not lost to the
//! throttle.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SnapshotConfig;
use crate::storage::{self, SnapshotBackend, StorageError};

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Version conflict in store '{store}': new version {rejected} must exceed current {current}")]
    InvalidVersion {
        store: String,
        rejected: i64,
        current: i64,
    },

    #[error("Failed to open store '{store}': {source}")]
    Init { store: String, source: StorageError },

    #[error("Malformed snapshot for store '{store}': {source}")]
    Malformed {
        store: String,
        source: serde_json::Error,
    },

    #[error("Failed to encode snapshot for store '{store}': {source}")]
    Encode {
        store: String,
        source: serde_json::Error,
    },

    #[error("Failed to persist snapshot for store '{store}': {source}")]
    Persist { store: String, source: StorageError },
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Version of a store that has never applied an update.
pub const INITIAL_VERSION: i64 = -1;

/// A state value paired with the version that produced it.
///
/// Persisted as a single JSON document with a `version` key, so a restarted
/// process knows exactly which events its state already reflects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot<S> {
    /// Index of the last event folded into `state`, or [`INITIAL_VERSION`].
    pub version: i64,
    /// The read model's current state.
    pub state: S,
}

struct StoreInner<S> {
    name: String,
    backend: Arc<dyn SnapshotBackend>,
    snapshot: RwLock<StateSnapshot<S>>,
    /// Version most recently written to the backend.
    persisted: AtomicI64,
    /// Wakes the persister when the in-memory snapshot moves ahead.
    dirty: Notify,
    /// Serializes backend writes; flush and the persister can race.
    write_gate: Mutex<()>,
}

/// Versioned, persisted container for one read model's state.
///
/// Share across tasks with `Arc`; all operations take `&self`.
pub struct StateStore<S> {
    inner: Arc<StoreInner<S>>,
    shutdown: watch::Sender<bool>,
    persister: Mutex<Option<JoinHandle<()>>>,
}

impl<S> StateStore<S>
where
    S: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open the store named `name`, hydrating from its snapshot document and
    /// starting the background persister.
    ///
    /// A missing document is a fresh store: `initial` state at
    /// [`INITIAL_VERSION`]. Any other load failure is fatal.
    pub async fn open(
        name: impl Into<String>,
        initial: S,
        config: &SnapshotConfig,
    ) -> Result<Self> {
        let name = name.into();
        let backend = storage::open_snapshot_backend(config, &name)
            .await
            .map_err(|e| StoreError::Init {
                store: name.clone(),
                source: e,
            })?;
        Self::with_backend(name, initial, backend, config.write_interval()).await
    }

    /// Open a store over an explicit backend.
    pub async fn with_backend(
        name: impl Into<String>,
        initial: S,
        backend: Arc<dyn SnapshotBackend>,
        write_interval: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let snapshot: StateSnapshot<S> = match backend.load().await {
            Ok(Some(document)) => {
                serde_json::from_str(&document).map_err(|e| StoreError::Malformed {
                    store: name.clone(),
                    source: e,
                })?
            }
            Ok(None) => StateSnapshot {
                version: INITIAL_VERSION,
                state: initial,
            },
            Err(e) => {
                return Err(StoreError::Init {
                    store: name.clone(),
                    source: e,
                })
            }
        };

        info!(store = %name, version = snapshot.version, "State store hydrated");

        let inner = Arc::new(StoreInner {
            name,
            backend,
            persisted: AtomicI64::new(snapshot.version),
            snapshot: RwLock::new(snapshot),
            dirty: Notify::new(),
            write_gate: Mutex::new(()),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let persister = tokio::spawn(run_persister(inner.clone(), write_interval, shutdown_rx));

        Ok(Self {
            inner,
            shutdown: shutdown_tx,
            persister: Mutex::new(Some(persister)),
        })
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current state.
    pub async fn state(&self) -> S {
        self.inner.snapshot.read().await.state.clone()
    }

    /// Version of the last accepted update, or [`INITIAL_VERSION`].
    pub async fn version(&self) -> i64 {
        self.inner.snapshot.read().await.version
    }

    /// Current state together with its version, read atomically.
    pub async fn snapshot(&self) -> StateSnapshot<S> {
        self.inner.snapshot.read().await.clone()
    }

    /// Replace the state, tagging it with `new_version`.
    ///
    /// `new_version` must be strictly greater than the current version; a
    /// stale or duplicate version is rejected and the state is untouched.
    /// The new state is immediately visible to readers, while the backend
    /// write happens in the background, subject to the throttle.
    #[tracing::instrument(name = "store.update", skip_all, fields(store = %self.inner.name, version = new_version))]
    pub async fn update(&self, state: S, new_version: i64) -> Result<()> {
        {
            let mut snapshot = self.inner.snapshot.write().await;
            if new_version <= snapshot.version {
                return Err(StoreError::InvalidVersion {
                    store: self.inner.name.clone(),
                    rejected: new_version,
                    current: snapshot.version,
                });
            }
            *snapshot = StateSnapshot {
                version: new_version,
                state,
            };
        }

        debug!("State updated");
        self.inner.dirty.notify_one();
        Ok(())
    }

    /// Write the current snapshot to the backend immediately.
    ///
    /// Bypasses the throttle. No-op when the persisted document is already
    /// current.
    pub async fn flush(&self) -> Result<()> {
        persist_current(&self.inner).await
    }

    /// Stop the background persister and write the final snapshot.
    ///
    /// Call this on shutdown; otherwise the last accepted update may still be
    /// waiting out a throttle window when the process exits.
    pub async fn close(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.persister.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(store = %self.inner.name, error = %e, "Persister task failed");
            }
        }
        persist_current(&self.inner).await?;
        info!(store = %self.inner.name, "State store closed");
        Ok(())
    }
}

impl<S> Drop for StateStore<S> {
    fn drop(&mut self) {
        // Stops the persister task; a graceful shutdown should use `close`,
        // which also writes the final snapshot.
        let _ = self.shutdown.send(true);
    }
}

/// Background task that mirrors the in-memory snapshot to the backend.
///
/// Waits until an update marks the store dirty, writes, then sleeps out the
/// interval before checking again, so the backend sees at most one write per
/// interval no matter the update rate. A failed write is retried in the next
/// window; the loop only goes back to waiting once the persisted version has
/// caught up with the in-memory one.
async fn run_persister<S>(
    inner: Arc<StoreInner<S>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Clone + Serialize + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            _ = inner.dirty.notified() => {}
            _ = shutdown.changed() => return,
        }

        loop {
            if let Err(e) = persist_current(&inner).await {
                warn!(store = %inner.name, error = %e, "Snapshot write failed; will retry next window");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => return,
            }

            if inner.persisted.load(Ordering::SeqCst) >= inner.snapshot.read().await.version {
                break;
            }
        }
    }
}

/// Write the current snapshot if it is ahead of what the backend holds.
async fn persist_current<S>(inner: &StoreInner<S>) -> Result<()>
where
    S: Clone + Serialize,
{
    let _guard = inner.write_gate.lock().await;

    let snapshot = inner.snapshot.read().await.clone();
    if snapshot.version <= inner.persisted.load(Ordering::SeqCst) {
        return Ok(());
    }

    let document = serde_json::to_string_pretty(&snapshot).map_err(|e| StoreError::Encode {
        store: inner.name.clone(),
        source: e,
    })?;
    inner
        .backend
        .store(&document)
        .await
        .map_err(|e| StoreError::Persist {
            store: inner.name.clone(),
            source: e,
        })?;

    inner.persisted.store(snapshot.version, Ordering::SeqCst);
    debug!(store = %inner.name, version = snapshot.version, "Snapshot persisted");
    Ok(())
}
