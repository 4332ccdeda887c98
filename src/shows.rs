use crate::db::{self, SongTally, Vote};
use crate::error::ApiError;
use crate::startup::AppState;
use crate::voting::{VoteOutcome, VoteRequest};
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ShowTallyResponse {
    pub show_id: String,
    pub total_votes: i64,
    pub songs: Vec<SongTally>,
}

#[derive(Debug, Serialize)]
pub struct VoterPicksResponse {
    pub show_id: String,
    pub voter_id: String,
    pub votes: Vec<Vote>,
}

#[derive(Debug, Serialize)]
pub struct VotedResponse {
    pub voted: bool,
}

/// Cast one vote for a predicted setlist song.
///
/// A duplicate is a normal answer, not a failure, so it comes back as 200.
/// Only a recorded vote starts the voter's throttle interval, and a repeat
/// inside the interval is still answered as a duplicate.
pub async fn cast_vote(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(field) = payload.missing_field() {
        return Err(ApiError::InvalidRequest(format!("missing {field}")));
    }

    if let Err(wait) = app_state.throttle.check(&payload.voter_id) {
        let repeat = app_state
            .votes
            .has_voted(&payload.voter_id, &payload.song_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.message))?;
        if !repeat {
            return Err(ApiError::Throttled {
                retry_after_ms: wait.num_milliseconds(),
            });
        }
    }

    let outcome = app_state.votes.submit_vote(&payload).await;
    if outcome.is_success() {
        app_state.throttle.record(&payload.voter_id);
    }
    let status = match outcome {
        VoteOutcome::Success => StatusCode::CREATED,
        VoteOutcome::Duplicate => StatusCode::OK,
        VoteOutcome::Error { .. } => StatusCode::BAD_GATEWAY,
    };

    Ok((status, Json(outcome)))
}

/// Vote totals per song for one show
pub async fn show_tally(
    Extension(app_state): Extension<AppState>,
    Path(show_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = app_state.db().ok_or(ApiError::StoreUnavailable)?;

    let songs = db::vote_counts_for_show(pool, &show_id).await?;
    let total_votes = songs.iter().map(|s| s.votes).sum::<i64>();

    Ok((
        StatusCode::OK,
        Json(ShowTallyResponse {
            show_id,
            total_votes,
            songs,
        }),
    ))
}

pub async fn voter_picks(
    Extension(app_state): Extension<AppState>,
    Path((show_id, voter_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = app_state.db().ok_or(ApiError::StoreUnavailable)?;

    let votes = db::votes_for_voter_in_show(pool, &show_id, &voter_id).await?;

    Ok((
        StatusCode::OK,
        Json(VoterPicksResponse {
            show_id,
            voter_id,
            votes,
        }),
    ))
}

pub async fn voter_voted_for_song(
    Extension(app_state): Extension<AppState>,
    Path((_show_id, voter_id, song_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let voted = app_state
        .votes
        .has_voted(&voter_id, &song_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.message))?;

    Ok((StatusCode::OK, Json(VotedResponse { voted })))
}

pub async fn health(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = match app_state.db() {
        Some(pool) => db::get_pool_stats(pool).await?,
        None => "in-memory store".to_string(),
    };
    Ok((StatusCode::OK, stats))
}
