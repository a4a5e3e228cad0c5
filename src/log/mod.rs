//! Append-only event log.
//!
//! The log is the system of record: events are appended, never mutated or
//! deleted. Each event receives a permanent zero-based index at append time,
//! and indices double as the total order consumers rely on.
//!
//! Readers obtain a [`LogTail`] cursor, which replays stored history and then
//! keeps polling for new appends. A tail never terminates on its own, so the
//! same cursor serves both replay and live consumption.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::LogConfig;
use crate::storage::{self, LogBackend, StorageError};

/// Errors that can occur during event log operations.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to open event log: {0}")]
    Init(#[source] StorageError),

    #[error("Malformed log record at line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to append event: {0}")]
    Append(#[source] StorageError),
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// An event together with its permanent position in the log.
///
/// The index is assigned at append time and never changes. Consumers use it
/// to order events and to record how far they have processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedEvent<E> {
    /// Zero-based position of the event in the log.
    pub index: u64,
    /// Application event payload.
    pub event: E,
}

struct LogInner<E> {
    backend: Arc<dyn LogBackend>,
    entries: RwLock<Vec<Arc<IndexedEvent<E>>>>,
    // Serializes appends so index assignment and the durable write are atomic
    // with respect to other appenders.
    append_lock: Mutex<()>,
    poll_interval: Duration,
}

/// Append-only, totally ordered event log.
///
/// Cloning is cheap and all clones share the same log.
pub struct EventLog<E> {
    inner: Arc<LogInner<E>>,
}

impl<E> Clone for EventLog<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> EventLog<E>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open the log described by `config`, replaying any existing records.
    pub async fn open(config: &LogConfig) -> Result<Self> {
        let backend = storage::open_log_backend(config)
            .await
            .map_err(LogError::Init)?;
        Self::with_backend(backend, config.poll_interval()).await
    }

    /// Open a log over an explicit backend.
    ///
    /// Records are replayed in file order and re-indexed by position; a record
    /// whose stored index disagrees with its position is logged and corrected.
    /// A record that does not parse is fatal, since silently skipping it would
    /// shift every later index.
    pub async fn with_backend(
        backend: Arc<dyn LogBackend>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let lines = backend.read_lines().await.map_err(LogError::Init)?;

        let mut entries = Vec::with_capacity(lines.len());
        for (position, line) in lines.iter().enumerate() {
            let record: IndexedEvent<E> =
                serde_json::from_str(line).map_err(|e| LogError::Malformed {
                    line: position + 1,
                    source: e,
                })?;
            if record.index != position as u64 {
                warn!(
                    recorded = record.index,
                    position = position as u64,
                    "Log record index does not match its position; using position"
                );
            }
            entries.push(Arc::new(IndexedEvent {
                index: position as u64,
                event: record.event,
            }));
        }

        info!(events = entries.len(), "Event log loaded");
        Ok(Self {
            inner: Arc::new(LogInner {
                backend,
                entries: RwLock::new(entries),
                append_lock: Mutex::new(()),
                poll_interval,
            }),
        })
    }

    /// Append `event` to the log, returning its assigned index.
    ///
    /// The record is durably written before the new index becomes visible to
    /// readers: when this returns `Ok`, the event has reached storage. On
    /// error the log is unchanged and the next append reuses the same index.
    #[tracing::instrument(name = "log.append", skip_all)]
    pub async fn append(&self, event: E) -> Result<u64> {
        let _guard = self.inner.append_lock.lock().await;

        let index = self.inner.entries.read().await.len() as u64;
        let record = IndexedEvent { index, event };
        let line = serde_json::to_string(&record).map_err(LogError::Encode)?;
        self.inner
            .backend
            .append_line(&line)
            .await
            .map_err(LogError::Append)?;

        self.inner.entries.write().await.push(Arc::new(record));
        debug!(index = index, "Event appended");
        Ok(index)
    }

    /// Number of events in the log.
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    /// Whether the log holds no events.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cursor over the full log: replays history, then tails new appends.
    pub fn events(&self) -> LogTail<E> {
        self.events_from(0)
    }

    /// Cursor starting at index `start` instead of the beginning.
    ///
    /// Consumers that have recorded how far they previously read can resume
    /// from there. A `start` beyond the end of the log simply waits until the
    /// log grows that far.
    pub fn events_from(&self, start: u64) -> LogTail<E> {
        LogTail {
            inner: self.inner.clone(),
            cursor: start,
            caught_up: false,
        }
    }
}

/// A reader's cursor into the log.
///
/// [`next`](LogTail::next) yields each event exactly once, in index order.
/// After the last stored event it polls for new appends rather than
/// terminating.
pub struct LogTail<E> {
    inner: Arc<LogInner<E>>,
    cursor: u64,
    caught_up: bool,
}

impl<E> LogTail<E>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Next event in index order, waiting for an append if none is stored.
    ///
    /// Cancellation-safe: if the returned future is dropped before it yields,
    /// the cursor has not advanced and no event is skipped.
    pub async fn next(&mut self) -> Arc<IndexedEvent<E>> {
        loop {
            {
                let entries = self.inner.entries.read().await;
                if (self.cursor as usize) < entries.len() {
                    let event = entries[self.cursor as usize].clone();
                    self.cursor += 1;
                    return event;
                }
            }
            if !self.caught_up {
                self.caught_up = true;
                debug!(position = self.cursor, "Tail caught up; polling for new events");
            }
            tokio::time::sleep(self.inner.poll_interval).await;
        }
    }

    /// Index of the next event this tail will yield.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Adapt the tail into a `Stream` of events.
    ///
    /// The stream never ends on its own; dropping the receiver stops the
    /// pumping task, even while it is waiting for new appends.
    pub fn into_stream(mut self) -> ReceiverStream<Arc<IndexedEvent<E>>> {
        let (tx, rx) = tokio::sync::mpsc::channel(32);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = self.next() => {
                        if tx.send(event).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    // Receiver dropped while the tail was waiting.
                    _ = tx.closed() => {
                        break;
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests;
