use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::{HostwatchError, HostwatchResult};

/// Error surfaced by a viewer transport.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Write half of a live viewer connection.
#[async_trait]
pub trait ViewerSink: Send + 'static {
    async fn send_text(&mut self, frame: &str) -> Result<(), SinkError>;

    async fn close(&mut self);
}

/// Opaque identity of a registered viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerId(Uuid);

impl ViewerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub delivered: usize,
    pub evicted: usize,
}

// Each sink has its own lock so frames from concurrent broadcasts are
// written whole and one at a time per connection. The slot is emptied when
// the connection is closed.
type SharedSink = Arc<AsyncMutex<Option<Box<dyn ViewerSink>>>>;

enum Delivery {
    Delivered,
    Skipped,
    Evicted(HostwatchError),
}

/// Registry of live viewers.
///
/// Membership is guarded by a plain mutex that is only held to insert,
/// remove or snapshot entries; no network write happens under it. A viewer
/// that cannot take a frame within the write timeout, lock wait included, is
/// removed on the spot, so no separate health check is needed.
pub struct BroadcastHub {
    viewers: Mutex<HashMap<ViewerId, SharedSink>>,
    write_timeout: Duration,
}

impl BroadcastHub {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            viewers: Mutex::new(HashMap::new()),
            write_timeout,
        }
    }

    pub fn register(&self, sink: impl ViewerSink) -> ViewerId {
        let id = ViewerId::new();
        let sink: Box<dyn ViewerSink> = Box::new(sink);
        let count = {
            let mut viewers = self.viewers.lock();
            viewers.insert(id, Arc::new(AsyncMutex::new(Some(sink))));
            viewers.len()
        };
        tracing::info!("Viewer {} connected ({} live)", id, count);
        id
    }

    /// Remove a viewer and close its connection. Returns `false` if it was
    /// already gone.
    pub async fn unregister(&self, id: ViewerId) -> bool {
        let removed = self.viewers.lock().remove(&id);
        match removed {
            Some(sink) => {
                self.close_sink(&sink).await;
                tracing::info!("Viewer {} disconnected ({} live)", id, self.viewer_count());
                true
            }
            None => false,
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().len()
    }

    pub fn is_registered(&self, id: ViewerId) -> bool {
        self.viewers.lock().contains_key(&id)
    }

    /// Serialize `update` once and write it to every registered viewer.
    pub async fn broadcast<T: Serialize>(&self, update: &T) -> HostwatchResult<BroadcastSummary> {
        let frame: Arc<str> = serde_json::to_string(update)?.into();

        let targets: Vec<(ViewerId, SharedSink)> = self
            .viewers
            .lock()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        let mut summary = BroadcastSummary::default();
        if targets.is_empty() {
            return Ok(summary);
        }

        let writes = targets.iter().map(|(id, sink)| {
            let frame = Arc::clone(&frame);
            self.write_frame(*id, sink, frame)
        });

        for delivery in join_all(writes).await {
            match delivery {
                Delivery::Delivered => summary.delivered += 1,
                Delivery::Skipped => {}
                Delivery::Evicted(err) => {
                    tracing::warn!("Dropping viewer: {}", err);
                    summary.evicted += 1;
                }
            }
        }

        tracing::debug!(
            "Broadcast delivered to {} viewers, evicted {}",
            summary.delivered,
            summary.evicted
        );
        Ok(summary)
    }

    // One deadline covers the wait for the sink and the write itself. A
    // viewer that left membership while we waited is skipped, and whoever
    // holds the sink last after an eviction closes it.
    async fn write_frame(&self, id: ViewerId, sink: &SharedSink, frame: Arc<str>) -> Delivery {
        let deadline = Instant::now() + self.write_timeout;

        let mut slot = match tokio::time::timeout_at(deadline, sink.lock()).await {
            Ok(slot) => slot,
            Err(_) => return self.evict(id, self.timeout_error(id)),
        };

        let delivery = match slot.as_mut() {
            Some(viewer) if self.is_registered(id) => {
                match tokio::time::timeout_at(deadline, viewer.send_text(&frame)).await {
                    Ok(Ok(())) => Delivery::Delivered,
                    Ok(Err(err)) => self.evict(
                        id,
                        HostwatchError::ViewerWrite {
                            viewer: id.to_string(),
                            message: err.to_string(),
                        },
                    ),
                    Err(_) => self.evict(id, self.timeout_error(id)),
                }
            }
            _ => Delivery::Skipped,
        };

        if !self.is_registered(id) {
            if let Some(mut viewer) = slot.take() {
                if tokio::time::timeout(self.write_timeout, viewer.close()).await.is_err() {
                    tracing::debug!("Viewer {} close timed out; dropping connection", id);
                }
            }
        }

        delivery
    }

    fn evict(&self, id: ViewerId, err: HostwatchError) -> Delivery {
        let removed = self.viewers.lock().remove(&id).is_some();
        if removed {
            Delivery::Evicted(err)
        } else {
            Delivery::Skipped
        }
    }

    fn timeout_error(&self, id: ViewerId) -> HostwatchError {
        HostwatchError::ViewerTimeout {
            viewer: id.to_string(),
            after: self.write_timeout,
        }
    }

    async fn close_sink(&self, sink: &SharedSink) {
        let close = async {
            if let Some(mut viewer) = sink.lock().await.take() {
                viewer.close().await;
            }
        };
        // A writer still holding the sink closes it once it finishes.
        if tokio::time::timeout(self.write_timeout, close).await.is_err() {
            tracing::debug!("Viewer close timed out; dropping connection");
        }
    }
}
