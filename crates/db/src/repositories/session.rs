use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use examdesk_core::domain::{Intent, OperationResult, Session, SlotField, Slots, Speaker, Turn};
use examdesk_core::flows::DialogueState;
use sqlx::{sqlite::SqliteRow, Row};

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                session_id,
                current_intent,
                dialogue_state,
                awaiting_field,
                slots_json,
                missing_fields_json,
                last_operation_result_json,
                derived_cache_json,
                created_at,
                updated_at
             FROM dialogue_sessions
             WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut session = session_from_row(&row)?;

        let turn_rows = sqlx::query(
            "SELECT speaker, text, created_at
             FROM dialogue_turns
             WHERE session_id = ?
             ORDER BY turn_number ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        session.turns = turn_rows.iter().map(turn_from_row).collect::<Result<_, _>>()?;

        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        let slots_json = encode("slots_json", &session.slots.without_secrets())?;
        let missing_fields_json = encode("missing_fields_json", &session.missing_fields)?;
        let last_result_json = session
            .last_operation_result
            .as_ref()
            .map(|result| encode("last_operation_result_json", result))
            .transpose()?;
        let derived_cache_json = encode("derived_cache_json", &session.derived_cache)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO dialogue_sessions (
                session_id,
                current_intent,
                dialogue_state,
                awaiting_field,
                slots_json,
                missing_fields_json,
                last_operation_result_json,
                derived_cache_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                current_intent = excluded.current_intent,
                dialogue_state = excluded.dialogue_state,
                awaiting_field = excluded.awaiting_field,
                slots_json = excluded.slots_json,
                missing_fields_json = excluded.missing_fields_json,
                last_operation_result_json = excluded.last_operation_result_json,
                derived_cache_json = excluded.derived_cache_json,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
        )
        .bind(&session.session_id)
        .bind(session.current_intent.as_ref().map(Intent::as_str))
        .bind(session.state.as_str())
        .bind(session.awaiting_field.as_ref().map(SlotField::as_str))
        .bind(slots_json)
        .bind(missing_fields_json)
        .bind(last_result_json)
        .bind(derived_cache_json)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM dialogue_turns WHERE session_id = ? AND turn_number >= ?")
            .bind(&session.session_id)
            .bind(turn_number(session.turns.len())?)
            .execute(&mut *tx)
            .await?;

        // Turns are append-only: only those past the last stored number are new.
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(turn_number) + 1, 0) FROM dialogue_turns WHERE session_id = ?",
        )
        .bind(&session.session_id)
        .fetch_one(&mut *tx)
        .await?;
        let stored = usize::try_from(next)
            .map_err(|_| RepositoryError::Decode(format!("invalid stored turn count {next}")))?;

        for (index, turn) in session.turns.iter().enumerate().skip(stored) {
            sqlx::query(
                "INSERT INTO dialogue_turns (
                    session_id,
                    turn_number,
                    speaker,
                    text,
                    created_at
                 ) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&session.session_id)
            .bind(turn_number(index)?)
            .bind(turn.speaker.as_str())
            .bind(&turn.text)
            .bind(turn.at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM dialogue_turns WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM dialogue_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn session_from_row(row: &SqliteRow) -> Result<Session, RepositoryError> {
    let current_intent = row
        .try_get::<Option<String>, _>("current_intent")?
        .map(|raw| {
            Intent::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown intent `{raw}`")))
        })
        .transpose()?;

    let state_raw = row.try_get::<String, _>("dialogue_state")?;
    let state = DialogueState::parse(&state_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown dialogue state `{state_raw}`"))
    })?;

    let awaiting_field = row
        .try_get::<Option<String>, _>("awaiting_field")?
        .map(|raw| {
            SlotField::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown slot field `{raw}`")))
        })
        .transpose()?;

    let slots: Slots = decode("slots_json", &row.try_get::<String, _>("slots_json")?)?;
    let missing_fields: Vec<SlotField> =
        decode("missing_fields_json", &row.try_get::<String, _>("missing_fields_json")?)?;
    let last_operation_result = row
        .try_get::<Option<String>, _>("last_operation_result_json")?
        .map(|raw| decode::<OperationResult>("last_operation_result_json", &raw))
        .transpose()?;
    let derived_cache: BTreeMap<String, String> =
        decode("derived_cache_json", &row.try_get::<String, _>("derived_cache_json")?)?;

    Ok(Session {
        session_id: row.try_get("session_id")?,
        turns: Vec::new(),
        current_intent,
        slots,
        missing_fields,
        last_operation_result,
        derived_cache,
        state,
        awaiting_field,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn turn_from_row(row: &SqliteRow) -> Result<Turn, RepositoryError> {
    let speaker_raw = row.try_get::<String, _>("speaker")?;
    let speaker = Speaker::parse(&speaker_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown speaker `{speaker_raw}`")))?;

    Ok(Turn {
        speaker,
        text: row.try_get("text")?,
        at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn encode<T: serde::Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("could not encode `{column}`: {error}")))
}

fn decode<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}

fn turn_number(index: usize) -> Result<i64, RepositoryError> {
    i64::try_from(index)
        .map_err(|_| RepositoryError::Decode(format!("turn index {index} does not fit in i64")))
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use examdesk_core::domain::{Intent, OperationResult, Session, SlotField};
    use examdesk_core::flows::DialogueState;

    use super::SqlSessionRepository;
    use crate::repositories::SessionRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_session(id: &str) -> Session {
        let mut session = Session::new(id);
        session.record_user_turn("I want to register");
        session.record_assistant_turn(
            "Let's create your student account! First, what's your first name?",
        );
        session.current_intent = Some(Intent::CreateStudent);
        session.slots.set(SlotField::Password, "hunter22");
        session.missing_fields = vec![SlotField::FirstName, SlotField::LastName];
        session.awaiting_field = Some(SlotField::FirstName);
        session.derived_cache.insert("instructor_id".into(), "instr-42".into());
        session
    }

    #[tokio::test]
    async fn save_then_find_round_trips_session_and_turns() {
        let repo = SqlSessionRepository::new(setup().await);
        let session = sample_session("s-round-trip");

        repo.save(&session).await.expect("save");
        let loaded = repo.find("s-round-trip").await.expect("find").expect("session present");

        assert_eq!(loaded.turns.len(), 2);
        assert_eq!(loaded.turns[1].text, session.turns[1].text);
        assert_eq!(loaded.current_intent, Some(Intent::CreateStudent));
        assert_eq!(loaded.awaiting_field, Some(SlotField::FirstName));
        assert_eq!(loaded.missing_fields, session.missing_fields);
        assert_eq!(loaded.cached("instructor_id"), Some("instr-42"));
    }

    #[tokio::test]
    async fn passwords_are_never_written() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool.clone());
        repo.save(&sample_session("s-secret")).await.expect("save");

        let raw: String =
            sqlx::query_scalar("SELECT slots_json FROM dialogue_sessions WHERE session_id = ?")
                .bind("s-secret")
                .fetch_one(&pool)
                .await
                .expect("slots row");

        assert!(!raw.contains("hunter22"));
        let loaded = repo.find("s-secret").await.expect("find").expect("session present");
        assert!(!loaded.slots.has(SlotField::Password));
    }

    #[tokio::test]
    async fn later_saves_append_turns_and_keep_earlier_rows() {
        let repo = SqlSessionRepository::new(setup().await);
        let mut session = sample_session("s-append");
        repo.save(&session).await.expect("first save");

        session.record_user_turn("Ana");
        session.last_operation_result = Some(OperationResult::failure(
            Intent::CreateStudent,
            "create_student",
            "backend unavailable",
            None,
        ));
        session.state = DialogueState::Done;
        repo.save(&session).await.expect("second save");

        let loaded = repo.find("s-append").await.expect("find").expect("session present");
        assert_eq!(loaded.turns.len(), 3);
        assert_eq!(loaded.turns[2].text, "Ana");
        assert_eq!(loaded.state, DialogueState::Done);
        assert_eq!(loaded.last_operation_result.map(|result| result.kind()), Some("failure"));
    }

    #[tokio::test]
    async fn saves_only_write_turns_past_the_last_stored_one() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool.clone());
        let mut session = sample_session("s-incremental");
        repo.save(&session).await.expect("first save");

        // A rewrite of the whole history would bring this row back.
        sqlx::query("DELETE FROM dialogue_turns WHERE session_id = ? AND turn_number = 0")
            .bind("s-incremental")
            .execute(&pool)
            .await
            .expect("drop first turn");
        session.record_user_turn("Ana");
        repo.save(&session).await.expect("second save");

        let numbers: Vec<i64> = sqlx::query_scalar(
            "SELECT turn_number FROM dialogue_turns WHERE session_id = ? ORDER BY turn_number",
        )
        .bind("s-incremental")
        .fetch_all(&pool)
        .await
        .expect("turn rows");
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn saving_a_reset_session_drops_old_turns() {
        let repo = SqlSessionRepository::new(setup().await);
        let mut session = sample_session("s-reset");
        repo.save(&session).await.expect("save");

        session.reset();
        repo.save(&session).await.expect("save after reset");

        let loaded = repo.find("s-reset").await.expect("find").expect("session present");
        assert!(loaded.turns.is_empty());
        assert!(loaded.slots.is_empty());
        assert_eq!(loaded.current_intent, None);
    }

    #[tokio::test]
    async fn delete_removes_session_and_unknown_ids_are_none() {
        let repo = SqlSessionRepository::new(setup().await);
        repo.save(&sample_session("s-gone")).await.expect("save");

        repo.delete("s-gone").await.expect("delete");

        assert!(repo.find("s-gone").await.expect("find").is_none());
        assert!(repo.find("never-seen").await.expect("find").is_none());
    }
}
