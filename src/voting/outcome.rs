use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub voter_id: String,
    pub song_id: String,
    pub setlist_id: String,
    pub show_id: String,
}

impl VoteRequest {
    pub fn new(
        voter_id: impl Into<String>,
        song_id: impl Into<String>,
        setlist_id: impl Into<String>,
        show_id: impl Into<String>,
    ) -> Self {
        Self {
            voter_id: voter_id.into(),
            song_id: song_id.into(),
            setlist_id: setlist_id.into(),
            show_id: show_id.into(),
        }
    }

    /// Name of the first identifier that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("voter_id", &self.voter_id),
            ("song_id", &self.song_id),
            ("setlist_id", &self.setlist_id),
            ("show_id", &self.show_id),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Result of exactly one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VoteOutcome {
    Success,
    Duplicate,
    Error { message: String },
}

impl VoteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VoteOutcome::Success)
    }
}
