use std::collections::HashMap;

use tokio::sync::RwLock;

use examdesk_core::domain::Session;

use super::{RepositoryError, SessionRepository};

/// Process-local session table. Mirrors the SQL repository, including the
/// rule that passwords are never retained.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut stored = session.clone();
        stored.slots = session.slots.without_secrets();
        let mut sessions = self.sessions.write().await;
        sessions.insert(stored.session_id.clone(), stored);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use examdesk_core::domain::{Session, SlotField};

    use super::InMemorySessionRepository;
    use crate::repositories::SessionRepository;

    #[tokio::test]
    async fn in_memory_repo_round_trip_strips_secrets() {
        let repo = InMemorySessionRepository::default();
        let mut session = Session::new("mem-1");
        session.slots.set(SlotField::FirstName, "Ana");
        session.slots.set(SlotField::Password, "hunter22");
        session.record_user_turn("Ana");

        repo.save(&session).await.expect("save");
        let loaded = repo.find("mem-1").await.expect("find").expect("session present");

        assert_eq!(loaded.slots.get(SlotField::FirstName), Some("Ana"));
        assert!(!loaded.slots.has(SlotField::Password));
        assert_eq!(loaded.turns.len(), 1);

        repo.delete("mem-1").await.expect("delete");
        assert!(repo.find("mem-1").await.expect("find").is_none());
    }
}
