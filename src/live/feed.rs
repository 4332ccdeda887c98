use crate::live::models::{ChangeNotification, ChannelStatus, FeedMessage};
use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const CHANNEL_BUFFER: usize = 64;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),
    #[error("feed closed")]
    Closed,
}

/// One open subscription to a single collection.
///
/// Delivers a status transition sequence plus zero or more changes. Dropping
/// the handle releases it and stops delivery.
pub struct Channel {
    collection: String,
    rx: mpsc::Receiver<FeedMessage>,
    producer: Option<JoinHandle<()>>,
}

impl Channel {
    pub fn new(
        collection: impl Into<String>,
        rx: mpsc::Receiver<FeedMessage>,
        producer: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            collection: collection.into(),
            rx,
            producer,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.rx.recv().await
    }

    pub fn release(self) {}
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        debug!(collection = %self.collection, "channel released");
    }
}

/// A source of per-collection change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn open(&self, collection: &str) -> Result<Channel, FeedError>;
}

/// In-process change feed. Every published notification fans out to each open
/// channel watching its collection.
#[derive(Clone)]
pub struct BroadcastChangeFeed {
    tx: broadcast::Sender<ChangeNotification>,
}

impl BroadcastChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns how many channels (of any collection) saw the notification.
    pub fn publish(&self, notification: ChangeNotification) -> usize {
        self.tx.send(notification).unwrap_or(0)
    }

    pub(crate) fn source(&self) -> broadcast::Receiver<ChangeNotification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastChangeFeed {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl ChangeFeed for BroadcastChangeFeed {
    async fn open(&self, collection: &str) -> Result<Channel, FeedError> {
        if collection.trim().is_empty() {
            return Err(FeedError::InvalidCollection(collection.to_string()));
        }

        let channel = forward(collection, self.tx.subscribe(), async {
            ChannelStatus::Subscribed
        });
        debug!(collection, "channel opened");
        Ok(channel)
    }
}

/// Builds a channel that filters `source` down to one collection.
///
/// `ready` resolves to the status the channel reports first; anything but
/// `Subscribed` ends the channel without delivering changes. `source` must be
/// subscribed before this is called so nothing published afterwards is lost.
pub(crate) fn forward<F>(
    collection: &str,
    mut source: broadcast::Receiver<ChangeNotification>,
    ready: F,
) -> Channel
where
    F: Future<Output = ChannelStatus> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
    let name = collection.to_string();

    let producer = tokio::spawn(async move {
        let status = ready.await;
        if tx.send(FeedMessage::Status(status)).await.is_err()
            || status != ChannelStatus::Subscribed
        {
            return;
        }

        loop {
            match source.recv().await {
                Ok(notification) if notification.collection == name => {
                    if tx.send(FeedMessage::Change(notification)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(collection = %name, skipped, "channel lagged behind feed");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    Channel::new(collection, rx, Some(producer))
}
