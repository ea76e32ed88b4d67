use std::sync::Arc;

use examdesk_agent::AgentRuntime;
use examdesk_core::config::{AppConfig, ConfigError, SessionStoreKind};
use examdesk_db::{
    connect_with_settings, migrations, DbPool, SessionRepository, SqlSessionRepository,
};
use examdesk_exambuilder::{registry_from_config, ProviderError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    /// Present only when sessions are persisted to SQLite.
    pub db_pool: Option<DbPool>,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("exambuilder provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("agent runtime setup failed: {0}")]
    Runtime(String),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        session_store = ?config.database.store,
        exambuilder_mode = ?config.exambuilder.mode,
        "starting application bootstrap"
    );

    let db_pool = match config.database.store {
        SessionStoreKind::Memory => None,
        SessionStoreKind::Sqlite => Some(open_session_database(&config).await?),
    };
    let repository = db_pool
        .clone()
        .map(|pool| Arc::new(SqlSessionRepository::new(pool)) as Arc<dyn SessionRepository>);

    let registry = registry_from_config(&config)?;
    let agent_runtime = AgentRuntime::from_config(&config, registry, repository)
        .map_err(|error| BootstrapError::Runtime(error.to_string()))?;

    Ok(Application { config, db_pool, agent_runtime: Arc::new(agent_runtime) })
}

async fn open_session_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(db_pool)
}
