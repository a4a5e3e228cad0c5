//! Catch-up subscriptions over the event log.
//!
//! A subscription drives a [`LogTail`] through an [`EventHandler`]: it replays
//! every stored event from the tail's starting position, then keeps delivering
//! live appends. There is no registration barrier; a subscription started at
//! any time observes every event from its starting position onward, first from
//! history, then live.
//!
//! Events are delivered strictly in index order, one at a time. The handler is
//! awaited to completion before the next event is dispatched.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::log::{IndexedEvent, LogTail};

/// Errors that can occur during subscription processing.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Handler failed: {0}")]
    Handler(String),
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;

/// Handler invoked for each event a subscription delivers.
///
/// Calls from one subscription never overlap: `handle` runs to completion
/// before the next event is dispatched.
pub trait EventHandler<E>: Send + Sync {
    /// Process one event.
    ///
    /// Returning an error stops the subscription.
    fn handle(
        &self,
        event: Arc<IndexedEvent<E>>,
    ) -> BoxFuture<'static, std::result::Result<(), SubscriptionError>>;
}

/// Handle for a running subscription.
///
/// Dropping the handle closes the cancellation channel, which also stops the
/// driver at its next dispatch point.
pub struct SubscriptionHandle {
    name: String,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl SubscriptionHandle {
    /// Name the subscription was started with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the subscription to stop.
    ///
    /// The in-flight handler call, if any, runs to completion; the driver
    /// exits at its next dispatch point.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Wait for the subscription task to finish.
    ///
    /// Returns the handler error if one stopped the subscription.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SubscriptionError::Handler(format!(
                "subscription task failed: {}",
                e
            ))),
        }
    }
}

/// Start a subscription named `name` over the events yielded by `tail`.
///
/// The driver task delivers each event to `handler` in index order, waiting
/// for new appends once history is exhausted. A handler error stops the
/// subscription and is surfaced through [`SubscriptionHandle::join`].
pub fn catchup_subscribe<E>(
    name: impl Into<String>,
    mut tail: LogTail<E>,
    handler: Arc<dyn EventHandler<E>>,
) -> SubscriptionHandle
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let name = name.into();
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let task_name = name.clone();
    let task = tokio::spawn(async move {
        info!(
            subscription = %task_name,
            position = tail.position(),
            "Subscription started"
        );

        loop {
            let event = tokio::select! {
                changed = cancel_rx.changed() => {
                    // A closed channel means the handle was dropped; treat it
                    // like an explicit stop so the task cannot linger.
                    if changed.is_err() || *cancel_rx.borrow() {
                        info!(subscription = %task_name, "Subscription stopped");
                        return Ok(());
                    }
                    continue;
                }
                event = tail.next() => event,
            };

            if let Err(e) = handler.handle(event.clone()).await {
                error!(
                    subscription = %task_name,
                    index = event.index,
                    error = %e,
                    "Handler failed; stopping subscription"
                );
                return Err(e);
            }
        }
    });

    SubscriptionHandle {
        name,
        cancel: cancel_tx,
        task,
    }
}
