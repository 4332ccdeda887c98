use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::connection::{DbPool, init_db};
use crate::live::{BroadcastChangeFeed, ChangeFeed, ConnectedPolicy, PgChangeFeed};
use crate::throttle::Throttle;
use crate::voting::{InMemoryVoteBackend, PgVoteBackend, VoteService};
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::error;

pub type VoteThrottle = Throttle<Arc<dyn Clock>>;

#[derive(Clone)]
pub struct AppState {
    pub votes: VoteService,
    pub feed: Arc<dyn ChangeFeed>,
    pub clock: Arc<dyn Clock>,
    pub throttle: Arc<VoteThrottle>,
    pub policy: ConnectedPolicy,
    pub db: Option<DbPool>,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self, sqlx::Error> {
        let db = init_db(&config.database_url, config.db_max_connections).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let db_clone = db.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match db_clone.acquire().await {
                    Ok(conn) => {
                        drop(conn);
                    }
                    Err(e) => {
                        error!("Database connection health check failed: {}", e);
                    }
                }
            }
        });

        Ok(AppState {
            votes: VoteService::new(Arc::new(PgVoteBackend::new(db.clone()))),
            feed: Arc::new(PgChangeFeed::start(&config.database_url, config.feed_capacity)),
            throttle: Arc::new(Throttle::new(
                clock.clone(),
                chrono::Duration::milliseconds(i64::from(config.vote_min_interval_ms)),
            )),
            clock,
            policy: config.connected_policy,
            db: Some(db),
        })
    }

    /// Everything in-process: votes live in memory and fan out over `feed`.
    pub fn in_memory(
        feed: BroadcastChangeFeed,
        clock: Arc<dyn Clock>,
        vote_min_interval: chrono::Duration,
        policy: ConnectedPolicy,
    ) -> Self {
        AppState {
            votes: VoteService::new(Arc::new(InMemoryVoteBackend::with_feed(feed.clone()))),
            feed: Arc::new(feed),
            throttle: Arc::new(Throttle::new(clock.clone(), vote_min_interval)),
            clock,
            policy,
            db: None,
        }
    }

    pub fn db(&self) -> Option<&DbPool> {
        self.db.as_ref()
    }
}
