use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use super::{run_pending, MIGRATOR};
    use crate::connect_with_settings;

    async fn schema_objects(pool: &sqlx::SqlitePool) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE name LIKE 'dialogue_%' OR name LIKE 'idx_dialogue_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("list schema objects")
    }

    #[tokio::test]
    async fn migrations_create_session_schema_and_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run is a no-op");

        assert_eq!(
            schema_objects(&pool).await,
            [
                "dialogue_sessions",
                "dialogue_turns",
                "idx_dialogue_sessions_updated_at",
                "idx_dialogue_turns_session_turn_number",
            ]
        );
    }

    #[tokio::test]
    async fn deleting_a_session_cascades_to_its_turns() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO dialogue_sessions (session_id, created_at, updated_at) \
             VALUES ('s-1', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert session");
        sqlx::query(
            "INSERT INTO dialogue_turns (session_id, turn_number, speaker, text, created_at) \
             VALUES ('s-1', 0, 'user', 'list exams', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert turn");

        sqlx::query("DELETE FROM dialogue_sessions WHERE session_id = 's-1'")
            .execute(&pool)
            .await
            .expect("delete session");
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dialogue_turns")
            .fetch_one(&pool)
            .await
            .expect("count turns");

        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn speaker_must_be_user_or_assistant() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        sqlx::query(
            "INSERT INTO dialogue_sessions (session_id, created_at, updated_at) \
             VALUES ('s-2', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert session");

        let rejected = sqlx::query(
            "INSERT INTO dialogue_turns (session_id, turn_number, speaker, text, created_at) \
             VALUES ('s-2', 0, 'system', 'hi', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;

        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn undo_removes_every_session_object() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert!(schema_objects(&pool).await.is_empty());
    }
}
