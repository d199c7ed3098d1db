//! Change events, live subscriptions and the merged event stream.
//!
//! # Backfill / live boundary
//! ```text
//! subscribe live ──▶ snapshot head H ──▶ backfill [from, H] ──▶ replay
//!                                                              │
//! live events ─────────── drop if block <= H or already seen ──┴──▶ caller
//! ```
//! The live subscription is opened before the head snapshot, so any log in a
//! block after `H` reaches it; anything at or below `H` comes from the
//! backfill. Together with a high-water mark on `(block, log_index)` this
//! gives no gaps and no duplicates at the boundary.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use alloy::primitives::{TxHash, U256};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::blockchain::{BlockchainError, BlockchainResult};
use crate::error::{InteractorError, InteractorResult};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Buffer between a live producer and its consumer.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// A `DataStored` log: the value changed to `new_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The value written.
    pub new_value: U256,
    /// Block containing the log.
    pub block_number: u64,
    /// Position of the log within its block.
    pub log_index: u64,
    /// Transaction that emitted the log.
    pub tx_hash: TxHash,
}

impl ChangeEvent {
    /// Chain-order key: block first, then log index.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Producer half of a [`ChangeSubscription`].
pub struct SubscriptionFeed {
    events: mpsc::Sender<ChangeEvent>,
    errors: oneshot::Sender<BlockchainError>,
}

impl SubscriptionFeed {
    /// Deliver one event. Returns `false` once the subscriber is gone.
    pub async fn send(&self, event: ChangeEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Report a terminal error; the subscription ends after buffered events.
    pub fn fail(self, err: BlockchainError) {
        let _ = self.errors.send(err);
    }

    /// Resolve when the subscriber has gone away.
    pub async fn closed(&self) {
        self.events.closed().await
    }
}

/// Live change events plus an error channel, backed by a producer task.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// aborts the producer and releases whatever it holds.
#[derive(Debug)]
pub struct ChangeSubscription {
    events: mpsc::Receiver<ChangeEvent>,
    errors: Option<oneshot::Receiver<BlockchainError>>,
    task: JoinHandle<()>,
}

impl ChangeSubscription {
    /// Spawn `producer` with a fresh feed and return the consumer half.
    pub fn spawn<F, Fut>(buffer: usize, producer: F) -> Self
    where
        F: FnOnce(SubscriptionFeed) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (events_tx, events) = mpsc::channel(buffer);
        let (errors_tx, errors) = oneshot::channel();
        let task = tokio::spawn(producer(SubscriptionFeed {
            events: events_tx,
            errors: errors_tx,
        }));

        Self {
            events,
            errors: Some(errors),
            task,
        }
    }

    /// Next live event, or the error that ended the subscription.
    ///
    /// Events buffered before a failure are delivered first. Once an error
    /// has been returned every later call returns `SubscriptionClosed`.
    pub async fn recv(&mut self) -> BlockchainResult<ChangeEvent> {
        let Some(errors) = self.errors.as_mut() else {
            return Err(BlockchainError::SubscriptionClosed);
        };

        let outcome = tokio::select! {
            biased;
            Some(event) = self.events.recv() => return Ok(event),
            outcome = errors => outcome,
        };

        self.errors = None;
        Err(outcome.unwrap_or(BlockchainError::SubscriptionClosed))
    }

    /// Release the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Ordered change events: backfill first, then live.
///
/// Yields `Err` at most once (a live subscription failure) and then ends.
/// Dropping or [`close`](Self::close)-ing the stream releases the live
/// subscription.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<InteractorResult<ChangeEvent>>,
    head: u64,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Start the producer that replays `backfill` and then forwards `live`.
    ///
    /// `backfill` must already cover `[from_block, head]` in chain order.
    pub(crate) fn spawn(
        backfill: Vec<ChangeEvent>,
        live: ChangeSubscription,
        from_block: u64,
        head: u64,
        cancel: Shutdown,
    ) -> Self {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(forward(tx, backfill, live, from_block, head, cancel));
        Self { rx, head, task }
    }

    /// Next event, `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<InteractorResult<ChangeEvent>> {
        self.rx.recv().await
    }

    /// Head block captured before the backfill.
    pub fn head_block(&self) -> u64 {
        self.head
    }

    /// Stop watching and release the live subscription.
    pub fn close(self) {
        drop(self);
    }
}

impl Stream for EventStream {
    type Item = InteractorResult<ChangeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward(
    tx: mpsc::Sender<InteractorResult<ChangeEvent>>,
    backfill: Vec<ChangeEvent>,
    mut live: ChangeSubscription,
    from_block: u64,
    head: u64,
    cancel: Shutdown,
) {
    let mut last_seen: Option<(u64, u64)> = None;

    for event in backfill {
        last_seen = Some(event.position());
        metrics::record_event("backfill");
        if tx.send(Ok(event)).await.is_err() {
            return;
        }
    }

    tracing::debug!(head, "Backfill delivered, switching to live events");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.triggered() => {
                tracing::debug!("Event watch cancelled");
                break;
            }
            _ = tx.closed() => break,
            next = live.recv() => next,
        };

        match next {
            Ok(event) => {
                let seen = last_seen.is_some_and(|last| event.position() <= last);
                if event.block_number <= head || event.block_number < from_block || seen {
                    tracing::trace!(
                        block = event.block_number,
                        log_index = event.log_index,
                        "Skipping event already covered"
                    );
                    continue;
                }

                last_seen = Some(event.position());
                metrics::record_event("live");
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Live event subscription failed");
                let _ = tx.send(Err(InteractorError::SubscriptionFailed(e))).await;
                break;
            }
        }
    }

    live.unsubscribe();
}
