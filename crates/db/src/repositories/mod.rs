use async_trait::async_trait;
use thiserror::Error;

use examdesk_core::domain::Session;

pub mod memory;
pub mod session;

pub use memory::InMemorySessionRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable home for dialogue sessions.
///
/// `save` is a full write-through of the session. Turns already stored keep
/// their row; turns beyond the session's current length are dropped, which is
/// how a reset becomes visible to the next load.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find(&self, session_id: &str) -> Result<Option<Session>, RepositoryError>;
    async fn save(&self, session: &Session) -> Result<(), RepositoryError>;
    async fn delete(&self, session_id: &str) -> Result<(), RepositoryError>;
}
