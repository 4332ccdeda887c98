use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub type DbPool = Pool<Postgres>;

/// Tables whose row changes are pushed onto a NOTIFY channel of the same name.
pub const WATCHED_TABLES: [&str; 3] = ["votes", "comments", "setlists"];

pub async fn init_db(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .max_lifetime(Duration::from_secs(30 * 60))
        .idle_timeout(Duration::from_secs(10 * 60))
        .connect(database_url)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            id UUID PRIMARY KEY,
            user_id TEXT NOT NULL,
            song_id TEXT NOT NULL,
            setlist_id TEXT NOT NULL,
            show_id TEXT NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(user_id, song_id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id UUID PRIMARY KEY,
            show_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS setlists (
            id TEXT PRIMARY KEY,
            show_id TEXT NOT NULL,
            songs JSONB NOT NULL DEFAULT '[]'::jsonb,
            updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_votes_show_id ON votes(show_id)
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_comments_show_id ON comments(show_id)
        "#,
    )
    .execute(&pool)
    .await?;

    // The check and the insert run in one statement context; the UNIQUE
    // constraint still catches the race between two concurrent callers.
    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION cast_setlist_vote(
            p_user_id TEXT,
            p_song_id TEXT,
            p_setlist_id TEXT,
            p_show_id TEXT
        ) RETURNS UUID AS $$
        DECLARE
            new_id UUID := gen_random_uuid();
        BEGIN
            IF EXISTS (
                SELECT 1 FROM votes WHERE user_id = p_user_id AND song_id = p_song_id
            ) THEN
                RAISE unique_violation USING MESSAGE = 'already voted for this song';
            END IF;

            INSERT INTO votes (id, user_id, song_id, setlist_id, show_id)
            VALUES (new_id, p_user_id, p_song_id, p_setlist_id, p_show_id);

            RETURN new_id;
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION notify_collection_change() RETURNS trigger AS $$
        DECLARE
            rec RECORD;
        BEGIN
            IF TG_OP = 'DELETE' THEN
                rec := OLD;
            ELSE
                rec := NEW;
            END IF;

            -- keys only: NOTIFY payloads cap at 8000 bytes, listeners refetch
            PERFORM pg_notify(
                TG_TABLE_NAME,
                json_build_object(
                    'op', TG_OP,
                    'show_id', rec.show_id,
                    'id', rec.id
                )::text
            );
            RETURN NULL;
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&pool)
    .await?;

    for table in WATCHED_TABLES {
        sqlx::query(&format!("DROP TRIGGER IF EXISTS {table}_notify ON {table}"))
            .execute(&pool)
            .await?;

        sqlx::query(&format!(
            "CREATE TRIGGER {table}_notify AFTER INSERT OR UPDATE OR DELETE ON {table} \
             FOR EACH ROW EXECUTE FUNCTION notify_collection_change()"
        ))
        .execute(&pool)
        .await?;
    }

    Ok(pool)
}

pub async fn get_pool_stats(pool: &DbPool) -> Result<String, sqlx::Error> {
    Ok(describe_pool(pool.size() as usize, pool.num_idle()))
}

// size and idle are sampled separately, so idle can briefly exceed size
fn describe_pool(size: usize, num_idle: usize) -> String {
    format!(
        "Pool stats: size={}, idle={}, available={}",
        size,
        num_idle,
        size.saturating_sub(num_idle)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_stats_survive_idle_above_size() {
        assert_eq!(
            describe_pool(2, 3),
            "Pool stats: size=2, idle=3, available=0"
        );
        assert_eq!(
            describe_pool(5, 2),
            "Pool stats: size=5, idle=2, available=3"
        );
    }
}
