use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub exambuilder: ExamBuilderConfig,
    pub dialogue: DialogueConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub store: SessionStoreKind,
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Classifications below this confidence fall back to the help reply.
    pub min_confidence: f32,
}

#[derive(Clone, Debug)]
pub struct ExamBuilderConfig {
    pub mode: BackendMode,
    pub base_url: String,
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    pub history_window: usize,
    pub short_reply_max_words: usize,
    pub fuzzy_max_distance: usize,
    pub operation_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStoreKind {
    Memory,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Rules,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Live,
    Demo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub session_store: Option<SessionStoreKind>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub exambuilder_mode: Option<BackendMode>,
    pub exambuilder_api_key: Option<String>,
    pub exambuilder_api_secret: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILE: &str = "examdesk.toml";
pub const DEFAULT_EXAMBUILDER_BASE_URL: &str = "https://instructor.exambuilder.com/v2";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                store: SessionStoreKind::Memory,
                url: "sqlite://examdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Rules,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                min_confidence: 0.5,
            },
            exambuilder: ExamBuilderConfig {
                mode: BackendMode::Demo,
                base_url: DEFAULT_EXAMBUILDER_BASE_URL.to_string(),
                api_key: String::new().into(),
                api_secret: String::new().into(),
                timeout_secs: 15,
            },
            dialogue: DialogueConfig {
                history_window: 6,
                short_reply_max_words: 3,
                fuzzy_max_distance: 3,
                operation_timeout_ms: 10_000,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for SessionStoreKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported session store `{other}` (expected memory|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected rules|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "demo" => Ok(Self::Demo),
            other => Err(ConfigError::Validation(format!(
                "unsupported exambuilder mode `{other}` (expected live|demo)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(store) = database.store {
                self.database.store = store;
            }
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(min_confidence) = llm.min_confidence {
                self.llm.min_confidence = min_confidence;
            }
        }

        if let Some(exambuilder) = patch.exambuilder {
            if let Some(mode) = exambuilder.mode {
                self.exambuilder.mode = mode;
            }
            if let Some(base_url) = exambuilder.base_url {
                self.exambuilder.base_url = base_url;
            }
            if let Some(api_key_value) = exambuilder.api_key {
                self.exambuilder.api_key = secret_value(api_key_value);
            }
            if let Some(api_secret_value) = exambuilder.api_secret {
                self.exambuilder.api_secret = secret_value(api_secret_value);
            }
            if let Some(timeout_secs) = exambuilder.timeout_secs {
                self.exambuilder.timeout_secs = timeout_secs;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(history_window) = dialogue.history_window {
                self.dialogue.history_window = history_window;
            }
            if let Some(short_reply_max_words) = dialogue.short_reply_max_words {
                self.dialogue.short_reply_max_words = short_reply_max_words;
            }
            if let Some(fuzzy_max_distance) = dialogue.fuzzy_max_distance {
                self.dialogue.fuzzy_max_distance = fuzzy_max_distance;
            }
            if let Some(operation_timeout_ms) = dialogue.operation_timeout_ms {
                self.dialogue.operation_timeout_ms = operation_timeout_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("EXAMDESK_DATABASE_STORE") {
            self.database.store = value.parse()?;
        }
        if let Some(value) = read_env("EXAMDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("EXAMDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("EXAMDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("EXAMDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("EXAMDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("EXAMDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("EXAMDESK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("EXAMDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("EXAMDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("EXAMDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("EXAMDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("EXAMDESK_LLM_MIN_CONFIDENCE") {
            self.llm.min_confidence = parse_f32("EXAMDESK_LLM_MIN_CONFIDENCE", &value)?;
        }

        if let Some(value) = read_env("EXAMDESK_EXAMBUILDER_MODE") {
            self.exambuilder.mode = value.parse()?;
        }
        if let Some(value) = read_env("EXAMDESK_EXAMBUILDER_BASE_URL") {
            self.exambuilder.base_url = value;
        }
        if let Some(value) = read_env("EXAMDESK_EXAMBUILDER_API_KEY") {
            self.exambuilder.api_key = secret_value(value);
        }
        if let Some(value) = read_env("EXAMDESK_EXAMBUILDER_API_SECRET") {
            self.exambuilder.api_secret = secret_value(value);
        }
        if let Some(value) = read_env("EXAMDESK_EXAMBUILDER_TIMEOUT_SECS") {
            self.exambuilder.timeout_secs =
                parse_u64("EXAMDESK_EXAMBUILDER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("EXAMDESK_DIALOGUE_HISTORY_WINDOW") {
            self.dialogue.history_window =
                parse_usize("EXAMDESK_DIALOGUE_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("EXAMDESK_DIALOGUE_SHORT_REPLY_MAX_WORDS") {
            self.dialogue.short_reply_max_words =
                parse_usize("EXAMDESK_DIALOGUE_SHORT_REPLY_MAX_WORDS", &value)?;
        }
        if let Some(value) = read_env("EXAMDESK_DIALOGUE_FUZZY_MAX_DISTANCE") {
            self.dialogue.fuzzy_max_distance =
                parse_usize("EXAMDESK_DIALOGUE_FUZZY_MAX_DISTANCE", &value)?;
        }
        if let Some(value) = read_env("EXAMDESK_DIALOGUE_OPERATION_TIMEOUT_MS") {
            self.dialogue.operation_timeout_ms =
                parse_u64("EXAMDESK_DIALOGUE_OPERATION_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("EXAMDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("EXAMDESK_SERVER_PORT") {
            self.server.port = parse_u16("EXAMDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("EXAMDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("EXAMDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("EXAMDESK_LOGGING_LEVEL").or_else(|| read_env("EXAMDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("EXAMDESK_LOGGING_FORMAT").or_else(|| read_env("EXAMDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(session_store) = overrides.session_store {
            self.database.store = session_store;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(mode) = overrides.exambuilder_mode {
            self.exambuilder.mode = mode;
        }
        if let Some(api_key) = overrides.exambuilder_api_key {
            self.exambuilder.api_key = secret_value(api_key);
        }
        if let Some(api_secret) = overrides.exambuilder_api_secret {
            self.exambuilder.api_secret = secret_value(api_secret);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_exambuilder(&self.exambuilder)?;
        validate_dialogue(&self.dialogue)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/examdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&llm.min_confidence) {
        return Err(ConfigError::Validation(
            "llm.min_confidence must be in range 0.0..=1.0".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Rules => {}
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_exambuilder(exambuilder: &ExamBuilderConfig) -> Result<(), ConfigError> {
    if exambuilder.timeout_secs == 0 || exambuilder.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "exambuilder.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if exambuilder.mode == BackendMode::Demo {
        return Ok(());
    }

    let base_url = exambuilder.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "exambuilder.base_url must start with http:// or https://".to_string(),
        ));
    }
    if exambuilder.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "exambuilder.api_key is required in live mode. Set EXAMDESK_EXAMBUILDER_API_KEY"
                .to_string(),
        ));
    }
    if exambuilder.api_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "exambuilder.api_secret is required in live mode. Set EXAMDESK_EXAMBUILDER_API_SECRET"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.history_window == 0 {
        return Err(ConfigError::Validation(
            "dialogue.history_window must be greater than zero".to_string(),
        ));
    }
    if dialogue.short_reply_max_words == 0 {
        return Err(ConfigError::Validation(
            "dialogue.short_reply_max_words must be greater than zero".to_string(),
        ));
    }
    if dialogue.operation_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "dialogue.operation_timeout_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    exambuilder: Option<ExamBuilderPatch>,
    dialogue: Option<DialoguePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    store: Option<SessionStoreKind>,
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ExamBuilderPatch {
    mode: Option<BackendMode>,
    base_url: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    history_window: Option<usize>,
    short_reply_max_words: Option<usize>,
    fuzzy_max_distance: Option<usize>,
    operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
