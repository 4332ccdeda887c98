use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VOTES: &str = "votes";
pub const COMMENTS: &str = "comments";
pub const SETLISTS: &str = "setlists";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    VoteChange,
    CommentChange,
    SetlistChange,
    Other(String),
}

impl UpdateKind {
    pub fn from_collection(collection: &str) -> Self {
        match collection {
            VOTES => UpdateKind::VoteChange,
            COMMENTS => UpdateKind::CommentChange,
            SETLISTS => UpdateKind::SetlistChange,
            other => UpdateKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connecting,
    Subscribed,
    Failed,
}

/// One raw change observed on a collection's feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub collection: String,
    pub show_id: Option<String>,
    pub payload: Value,
}

impl ChangeNotification {
    pub fn new(collection: impl Into<String>, show_id: Option<&str>, payload: Value) -> Self {
        Self {
            collection: collection.into(),
            show_id: show_id.map(str::to_string),
            payload,
        }
    }

    /// Builds a notification from a NOTIFY payload. Anything that isn't JSON
    /// is kept as a string payload.
    pub fn from_raw(collection: &str, raw: &str) -> Self {
        let payload = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        let show_id = payload
            .get("show_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            collection: collection.to_string(),
            show_id,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Status(ChannelStatus),
    Change(ChangeNotification),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveUpdate {
    pub kind: UpdateKind,
    pub show_id: Option<String>,
    pub payload: Value,
    pub observed_at: DateTime<Utc>,
}

impl LiveUpdate {
    /// Decode the opaque payload into the caller's schema for this collection.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
