use crate::voting::backend::{BackendError, VoteBackend};
use crate::voting::outcome::{VoteOutcome, VoteRequest};
use std::sync::Arc;
use tracing::{debug, warn};

/// Submits single vote attempts and classifies what the backend says.
///
/// Holds no per-call state and never retries; uniqueness is the backend's job.
#[derive(Clone)]
pub struct VoteService {
    backend: Arc<dyn VoteBackend>,
}

impl VoteService {
    pub fn new(backend: Arc<dyn VoteBackend>) -> Self {
        Self { backend }
    }

    pub async fn submit_vote(&self, request: &VoteRequest) -> VoteOutcome {
        if let Some(field) = request.missing_field() {
            return VoteOutcome::Error {
                message: format!("missing {field}"),
            };
        }

        match self.backend.cast_vote(request).await {
            Ok(()) => {
                debug!(voter = %request.voter_id, song = %request.song_id, "vote recorded");
                VoteOutcome::Success
            }
            Err(e) if e.is_unique_violation() => {
                debug!(voter = %request.voter_id, song = %request.song_id, "duplicate vote");
                VoteOutcome::Duplicate
            }
            Err(e) => {
                warn!(code = ?e.code, "vote submission failed: {}", e.message);
                VoteOutcome::Error { message: e.message }
            }
        }
    }

    /// Whether a vote already exists for this (voter, song) pair.
    pub async fn has_voted(&self, voter_id: &str, song_id: &str) -> Result<bool, BackendError> {
        self.backend.has_voted(voter_id, song_id).await
    }
}
