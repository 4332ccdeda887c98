use crate::db::WATCHED_TABLES;
use crate::live::feed::{BroadcastChangeFeed, ChangeFeed, Channel, FeedError, forward};
use crate::live::models::{ChangeNotification, ChannelStatus};
use async_trait::async_trait;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Change feed backed by Postgres `LISTEN`/`NOTIFY`.
///
/// A single listener, on its own connection outside the vote pool, LISTENs on
/// every watched table and fans notifications out in-process. Opening a
/// channel never touches the database.
#[derive(Clone)]
pub struct PgChangeFeed {
    fanout: BroadcastChangeFeed,
    listener: watch::Receiver<ChannelStatus>,
    _task: Arc<ListenerTask>,
}

struct ListenerTask(JoinHandle<()>);

impl Drop for ListenerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl PgChangeFeed {
    pub fn start(database_url: &str, capacity: usize) -> Self {
        let fanout = BroadcastChangeFeed::new(capacity);
        let (status_tx, listener) = watch::channel(ChannelStatus::Connecting);
        let task = tokio::spawn(listen(database_url.to_string(), fanout.clone(), status_tx));

        Self {
            fanout,
            listener,
            _task: Arc::new(ListenerTask(task)),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        *self.listener.borrow()
    }
}

async fn listen(
    database_url: String,
    fanout: BroadcastChangeFeed,
    status: watch::Sender<ChannelStatus>,
) {
    let mut listener = match PgListener::connect(&database_url).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("listener connect failed: {}", e);
            status.send_replace(ChannelStatus::Failed);
            return;
        }
    };

    if let Err(e) = listener.listen_all(WATCHED_TABLES).await {
        warn!("LISTEN failed: {}", e);
        status.send_replace(ChannelStatus::Failed);
        return;
    }

    status.send_replace(ChannelStatus::Subscribed);
    info!(tables = ?WATCHED_TABLES, "listening for collection changes");

    loop {
        match listener.recv().await {
            Ok(notification) => {
                let change = ChangeNotification::from_raw(notification.channel(), notification.payload());
                let receivers = fanout.publish(change);
                debug!(channel = notification.channel(), receivers, "change fanned out");
            }
            Err(e) => {
                warn!("listener dropped: {}", e);
                status.send_replace(ChannelStatus::Failed);
                break;
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn open(&self, collection: &str) -> Result<Channel, FeedError> {
        if !WATCHED_TABLES.contains(&collection) {
            return Err(FeedError::InvalidCollection(collection.to_string()));
        }

        let mut listener = self.listener.clone();
        let ready = async move {
            match listener
                .wait_for(|s| *s != ChannelStatus::Connecting)
                .await
            {
                Ok(status) => *status,
                Err(_) => ChannelStatus::Failed,
            }
        };

        Ok(forward(collection, self.fanout.source(), ready))
    }
}
