pub mod ask;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod migrate;

use std::path::PathBuf;
use std::sync::Arc;

use examdesk_agent::AgentRuntime;
use examdesk_core::config::{AppConfig, ConfigError, LoadOptions, SessionStoreKind};
use examdesk_db::{
    connect_with_settings, migrations, DbPool, SessionRepository, SqlSessionRepository,
};
use examdesk_exambuilder::{registry_from_config, ProviderError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            session_id: None,
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn reply(command: &str, session_id: &str, reply: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            session_id: Some(session_id.to_string()),
            error_class: None,
            message: reply.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            session_id: None,
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn startup_failure(command: &str, error: StartupError) -> Self {
        Self::failure(command, error.class(), error.to_string(), error.exit_code())
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// An explicit `--config` path must exist; otherwise the usual lookup applies.
pub fn load_options(config_path: Option<PathBuf>) -> LoadOptions {
    let require_file = config_path.is_some();
    LoadOptions { config_path, require_file, ..LoadOptions::default() }
}

#[derive(Debug, Error)]
pub(crate) enum StartupError {
    #[error("configuration issue: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to initialize async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to connect to session database: {0}")]
    Database(String),
    #[error("session database migration failed: {0}")]
    Migration(String),
    #[error("exambuilder provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("agent runtime setup failed: {0}")]
    Agent(String),
}

impl StartupError {
    fn class(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_validation",
            Self::Runtime(_) => "runtime_init",
            Self::Database(_) => "db_connectivity",
            Self::Migration(_) => "migration",
            Self::Provider(_) => "provider",
            Self::Agent(_) => "agent_init",
        }
    }

    fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Runtime(_) => 3,
            Self::Database(_) => 4,
            Self::Migration(_) => 5,
            Self::Provider(_) | Self::Agent(_) => 6,
        }
    }
}

pub(crate) fn load_config(options: &LoadOptions) -> Result<AppConfig, StartupError> {
    Ok(AppConfig::load(options.clone())?)
}

pub(crate) fn async_runtime() -> Result<tokio::runtime::Runtime, StartupError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)
}

/// Logs go to stderr so replies on stdout stay clean.
pub(crate) fn init_logging(config: &AppConfig) {
    use examdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when commands run in-process.
    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}

pub(crate) struct Engine {
    pub runtime: AgentRuntime,
    pub db_pool: Option<DbPool>,
}

impl Engine {
    pub async fn start(config: &AppConfig) -> Result<Self, StartupError> {
        let db_pool = match config.database.store {
            SessionStoreKind::Memory => None,
            SessionStoreKind::Sqlite => Some(open_session_database(config).await?),
        };
        let repository = db_pool
            .clone()
            .map(|pool| Arc::new(SqlSessionRepository::new(pool)) as Arc<dyn SessionRepository>);

        let registry = registry_from_config(config)?;
        let runtime = AgentRuntime::from_config(config, registry, repository)
            .map_err(|error| StartupError::Agent(error.to_string()))?;
        Ok(Self { runtime, db_pool })
    }

    pub async fn shutdown(self) {
        if let Some(pool) = self.db_pool {
            pool.close().await;
        }
    }
}

pub(crate) async fn open_session_database(config: &AppConfig) -> Result<DbPool, StartupError> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| StartupError::Database(error.to_string()))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| StartupError::Migration(error.to_string()))?;
    Ok(pool)
}
