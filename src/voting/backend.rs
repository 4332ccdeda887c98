use crate::db::{self, DbPool};
use crate::live::{BroadcastChangeFeed, ChangeNotification, VOTES};
use crate::voting::outcome::VoteRequest;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// SQLSTATE raised by Postgres on a uniqueness-constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Structured failure reported by the vote procedure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION)
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db_err) => BackendError {
                code: db_err.code().map(|c| c.into_owned()),
                message: db_err.message().to_string(),
            },
            _ => BackendError {
                code: None,
                message: error.to_string(),
            },
        }
    }
}

/// The atomic insert-or-reject procedure behind vote submission.
///
/// Implementations must make the (voter, song) check and the insert a single
/// atomic step and report a conflict with [`UNIQUE_VIOLATION`].
#[async_trait]
pub trait VoteBackend: Send + Sync {
    async fn cast_vote(&self, request: &VoteRequest) -> Result<(), BackendError>;

    async fn has_voted(&self, voter_id: &str, song_id: &str) -> Result<bool, BackendError>;
}

pub struct PgVoteBackend {
    pool: DbPool,
}

impl PgVoteBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoteBackend for PgVoteBackend {
    async fn cast_vote(&self, request: &VoteRequest) -> Result<(), BackendError> {
        db::cast_vote(&self.pool, request).await?;
        Ok(())
    }

    async fn has_voted(&self, voter_id: &str, song_id: &str) -> Result<bool, BackendError> {
        Ok(db::user_has_voted(&self.pool, voter_id, song_id).await?)
    }
}

/// Process-local store keyed on (voter, song).
///
/// With a feed attached, each recorded vote is published on the `votes`
/// collection the way the database trigger would.
#[derive(Default)]
pub struct InMemoryVoteBackend {
    votes: Mutex<HashSet<(String, String)>>,
    feed: Option<BroadcastChangeFeed>,
}

impl InMemoryVoteBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(feed: BroadcastChangeFeed) -> Self {
        Self {
            votes: Mutex::default(),
            feed: Some(feed),
        }
    }

    pub fn len(&self) -> usize {
        self.votes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VoteBackend for InMemoryVoteBackend {
    async fn cast_vote(&self, request: &VoteRequest) -> Result<(), BackendError> {
        let key = (request.voter_id.clone(), request.song_id.clone());
        let inserted = self
            .votes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);

        if inserted {
            if let Some(feed) = &self.feed {
                feed.publish(ChangeNotification::new(
                    VOTES,
                    Some(request.show_id.as_str()),
                    json!({ "op": "INSERT", "show_id": request.show_id, "id": Uuid::new_v4() }),
                ));
            }
            Ok(())
        } else {
            Err(BackendError::new(
                Some(UNIQUE_VIOLATION),
                "duplicate key value violates unique constraint \"votes_user_id_song_id_key\"",
            ))
        }
    }

    async fn has_voted(&self, voter_id: &str, song_id: &str) -> Result<bool, BackendError> {
        let key = (voter_id.to_string(), song_id.to_string());
        Ok(self
            .votes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key))
    }
}
