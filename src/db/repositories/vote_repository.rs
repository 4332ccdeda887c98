use crate::db::connection::DbPool;
use crate::db::models::{SongTally, Vote};
use crate::voting::VoteRequest;
use sqlx::Error;

/// Runs the `cast_setlist_vote` procedure. A repeat (voter, song) pair comes
/// back as a database error with SQLSTATE 23505.
pub async fn cast_vote(pool: &DbPool, request: &VoteRequest) -> Result<(), Error> {
    sqlx::query("SELECT cast_setlist_vote($1, $2, $3, $4)")
        .bind(&request.voter_id)
        .bind(&request.song_id)
        .bind(&request.setlist_id)
        .bind(&request.show_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn vote_counts_for_show(pool: &DbPool, show_id: &str) -> Result<Vec<SongTally>, Error> {
    sqlx::query_as::<_, SongTally>(
        r#"
        SELECT song_id, COUNT(*) AS votes
        FROM votes
        WHERE show_id = $1
        GROUP BY song_id
        ORDER BY votes DESC, song_id ASC
        "#,
    )
    .bind(show_id)
    .fetch_all(pool)
    .await
}

pub async fn votes_for_voter_in_show(
    pool: &DbPool,
    show_id: &str,
    user_id: &str,
) -> Result<Vec<Vote>, Error> {
    sqlx::query_as::<_, Vote>(
        r#"
        SELECT id, user_id, song_id, setlist_id, show_id, created_at
        FROM votes
        WHERE show_id = $1 AND user_id = $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(show_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn user_has_voted(pool: &DbPool, user_id: &str, song_id: &str) -> Result<bool, Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM votes WHERE user_id = $1 AND song_id = $2)",
    )
    .bind(user_id)
    .bind(song_id)
    .fetch_one(pool)
    .await
}
