//! Push feed of registry changes.
//!
//! Every subscription owns a small task that wakes up once per tick, compares
//! the registry's change timestamp with the last one it delivered and pushes a
//! fresh snapshot only when something moved. Several mutations within one tick
//! coalesce into a single event.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::Stream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::registry::{UploadEntry, UploadRegistry};

/// Default delay a reconnecting observer is told to wait.
pub const DEFAULT_RETRY_MS: u64 = 2000;

/// Events buffered per observer before ticks start coalescing.
const FEED_CHANNEL_SIZE: usize = 16;

/// One push to an observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEvent {
    /// Registry change timestamp this snapshot was taken at.
    #[serde(skip)]
    pub id: u64,
    /// Reconnect delay hint in milliseconds.
    #[serde(skip)]
    pub retry_ms: u64,
    /// All tracked uploads keyed by id.
    pub files: BTreeMap<String, UploadEntry>,
}

impl FeedEvent {
    /// Render as a server-sent-events frame.
    pub fn to_sse(&self) -> serde_json::Result<String> {
        let data = serde_json::to_string(self)?;
        Ok(format!(
            "retry: {}\nid:{}\ndata: {}\n\n",
            self.retry_ms, self.id, data
        ))
    }
}

/// Factory for per-observer feed subscriptions.
#[derive(Debug, Clone)]
pub struct StatusFeed {
    registry: Arc<UploadRegistry>,
    tick: Duration,
    retry_ms: u64,
}

impl StatusFeed {
    /// Create a feed polling `registry` every `tick` (at least 1 ms).
    pub fn new(registry: Arc<UploadRegistry>, tick: Duration) -> Self {
        Self {
            registry,
            tick: tick.max(Duration::from_millis(1)),
            retry_ms: DEFAULT_RETRY_MS,
        }
    }

    /// Set the reconnect hint carried by every event.
    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry_ms = retry_ms;
        self
    }

    /// Start a new observer.
    ///
    /// Must be called from within a tokio runtime. The background task ends
    /// when the subscription is dropped or cancelled.
    pub fn subscribe(&self) -> FeedSubscription {
        let (tx, rx) = mpsc::channel(FEED_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let registry = Arc::clone(&self.registry);
        let tick = self.tick;
        let retry_ms = self.retry_ms;
        let token = cancel.clone();
        tokio::spawn(async move {
            run_feed(registry, tick, retry_ms, tx, token).await;
        });

        FeedSubscription {
            rx,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }
}

async fn run_feed(
    registry: Arc<UploadRegistry>,
    tick: Duration,
    retry_ms: u64,
    tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
) {
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_sent = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tx.closed() => break,
            _ = interval.tick() => {}
        }

        if !registry.changed_since(last_sent) {
            continue;
        }

        let snapshot = registry.snapshot();
        let event = FeedEvent {
            id: snapshot.timestamp,
            retry_ms,
            files: snapshot.files,
        };
        match tx.try_send(event) {
            Ok(()) => {
                trace!(id = snapshot.timestamp, "feed event pushed");
                last_sent = snapshot.timestamp;
            }
            // Observer is behind; the next tick retries with a newer snapshot.
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => break,
        }
    }

    debug!("status feed observer finished");
}

/// Receiving end of one observer.
///
/// Dropping it cancels the background task.
#[derive(Debug)]
pub struct FeedSubscription {
    rx: mpsc::Receiver<FeedEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl FeedSubscription {
    /// Wait for the next event. `None` once the feed has stopped.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.rx.recv().await
    }

    /// Stop the feed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that can stop the feed from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for FeedSubscription {
    type Item = FeedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UploadState;

    #[test]
    fn test_sse_frame() {
        let mut files = BTreeMap::new();
        files.insert(
            "docs/a.pdf.uploading".to_string(),
            UploadEntry {
                total_size: Some(10),
                received_size: 4,
                state: UploadState::Uploading,
            },
        );
        let event = FeedEvent {
            id: 1234,
            retry_ms: 2000,
            files,
        };

        let frame = event.to_sse().unwrap();
        assert_eq!(
            frame,
            "retry: 2000\nid:1234\ndata: {\"files\":{\"docs/a.pdf.uploading\":\
             {\"size\":10,\"currentSize\":4,\"state\":\"uploading\"}}}\n\n"
        );
    }

    #[test]
    fn test_empty_frame() {
        let event = FeedEvent {
            id: 7,
            retry_ms: 500,
            files: BTreeMap::new(),
        };
        assert_eq!(
            event.to_sse().unwrap(),
            "retry: 500\nid:7\ndata: {\"files\":{}}\n\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_feed() {
        let registry = Arc::new(UploadRegistry::new());
        let feed = StatusFeed::new(Arc::clone(&registry), Duration::from_secs(1));
        let mut sub = feed.subscribe();

        sub.cancel();
        registry.put("a.uploading", UploadEntry::new(None));
        assert_eq!(sub.recv().await, None);
    }
}
