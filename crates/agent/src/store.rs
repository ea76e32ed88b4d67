use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use examdesk_core::domain::Session;
use examdesk_db::SessionRepository;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::warn;

struct Entry {
    session: Session,
    loaded: bool,
}

/// Live sessions keyed by id, one mutex per session.
///
/// The map lock is only held to find or insert an entry; turns on different
/// sessions never wait on each other. When a repository is attached, a session
/// is loaded from it on first access and written through on `save`.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Entry>>>>,
    repository: Option<Arc<dyn SessionRepository>>,
}

/// Exclusive access to one session for the duration of a turn or reset.
pub struct SessionLock(OwnedMutexGuard<Entry>);

impl Deref for SessionLock {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0.session
    }
}

impl DerefMut for SessionLock {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.0.session
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionStore {
    pub fn new(repository: Option<Arc<dyn SessionRepository>>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), repository }
    }

    pub fn is_persistent(&self) -> bool {
        self.repository.is_some()
    }

    async fn entry(&self, session_id: &str) -> Arc<Mutex<Entry>> {
        if let Some(entry) = self.sessions.read().await.get(session_id) {
            return entry.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Entry { session: Session::new(session_id), loaded: false }))
            })
            .clone()
    }

    /// Waits for any in-flight turn on the same session, then hands out the session.
    pub async fn lock(&self, session_id: &str) -> SessionLock {
        let mut guard = self.entry(session_id).await.lock_owned().await;

        if !guard.loaded {
            if let Some(repository) = &self.repository {
                match repository.find(session_id).await {
                    Ok(Some(session)) => guard.session = session,
                    Ok(None) => {}
                    Err(error) => warn!(
                        event_name = "agent.session.load_failed",
                        session_id,
                        error = %error,
                        "could not load persisted session, starting fresh"
                    ),
                }
            }
            guard.loaded = true;
        }

        SessionLock(guard)
    }

    /// Writes the session through to the repository, if any. Failures are logged only.
    pub async fn save(&self, session: &SessionLock) {
        let Some(repository) = &self.repository else {
            return;
        };
        if let Err(error) = repository.save(session).await {
            warn!(
                event_name = "agent.session.save_failed",
                session_id = %session.session_id,
                error = %error,
                "could not persist session"
            );
        }
    }

    pub async fn reset(&self, session_id: &str) {
        let mut session = self.lock(session_id).await;
        session.reset();
        self.save(&session).await;
    }

    /// Copy of the session as of the last completed turn.
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let entry = self.sessions.read().await.get(session_id).cloned();
        match entry {
            Some(entry) => Some(entry.lock().await.session.clone()),
            None => match &self.repository {
                Some(repository) => repository.find(session_id).await.ok().flatten(),
                None => None,
            },
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use examdesk_core::domain::SlotField;
    use examdesk_db::{InMemorySessionRepository, SessionRepository};

    use super::SessionStore;

    #[tokio::test]
    async fn sessions_are_created_lazily_and_isolated() {
        let store = SessionStore::default();
        {
            let mut first = store.lock("a").await;
            first.slots.set(SlotField::FirstName, "Ana");
        }
        let second = store.lock("b").await;

        assert!(!second.slots.has(SlotField::FirstName));
        assert_eq!(store.len().await, 2);
        drop(second);

        let snapshot = store.snapshot("a").await.expect("session a");
        assert_eq!(snapshot.slots.get(SlotField::FirstName), Some("Ana"));
        assert!(store.snapshot("missing").await.is_none());
    }

    #[tokio::test]
    async fn reset_waits_for_the_turn_holding_the_session() {
        let store = Arc::new(SessionStore::default());
        let mut held = store.lock("s").await;
        held.slots.set(SlotField::LastName, "Lima");

        let resetter = {
            let store = store.clone();
            tokio::spawn(async move { store.reset("s").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!resetter.is_finished());

        held.record_user_turn("Lima");
        drop(held);
        resetter.await.expect("reset task");

        let session = store.snapshot("s").await.expect("session");
        assert!(session.slots.is_empty());
        assert!(session.turns.is_empty());
    }

    #[tokio::test]
    async fn persisted_sessions_are_loaded_on_first_access() {
        let repository = Arc::new(InMemorySessionRepository::default());
        {
            let store = SessionStore::new(Some(repository.clone()));
            let mut session = store.lock("p").await;
            session.slots.set(SlotField::ExamName, "Biology Midterm");
            session.slots.set(SlotField::Password, "secret123");
            store.save(&session).await;
        }

        let store = SessionStore::new(Some(repository.clone()));
        let session = store.lock("p").await;

        assert!(store.is_persistent());
        assert_eq!(session.slots.get(SlotField::ExamName), Some("Biology Midterm"));
        assert!(!session.slots.has(SlotField::Password));
        assert!(repository.find("p").await.expect("find").is_some());
    }
}
