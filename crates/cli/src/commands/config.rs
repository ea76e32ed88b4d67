use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use examdesk_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl ToString) -> Self {
        Self { key, env_keys, value: value.to_string() }
    }
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let llm_api_key = match &config.llm.api_key {
        Some(key) => redact_secret(key),
        None => "<unset>".to_string(),
    };

    vec![
        Field::new(
            "database.store",
            &["EXAMDESK_DATABASE_STORE"],
            format!("{:?}", config.database.store),
        ),
        Field::new("database.url", &["EXAMDESK_DATABASE_URL"], &config.database.url),
        Field::new(
            "database.max_connections",
            &["EXAMDESK_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections,
        ),
        Field::new(
            "database.timeout_secs",
            &["EXAMDESK_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs,
        ),
        Field::new(
            "llm.provider",
            &["EXAMDESK_LLM_PROVIDER"],
            format!("{:?}", config.llm.provider),
        ),
        Field::new("llm.model", &["EXAMDESK_LLM_MODEL"], &config.llm.model),
        Field::new(
            "llm.base_url",
            &["EXAMDESK_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", &["EXAMDESK_LLM_API_KEY"], llm_api_key),
        Field::new("llm.timeout_secs", &["EXAMDESK_LLM_TIMEOUT_SECS"], config.llm.timeout_secs),
        Field::new(
            "llm.min_confidence",
            &["EXAMDESK_LLM_MIN_CONFIDENCE"],
            config.llm.min_confidence,
        ),
        Field::new(
            "exambuilder.mode",
            &["EXAMDESK_EXAMBUILDER_MODE"],
            format!("{:?}", config.exambuilder.mode),
        ),
        Field::new(
            "exambuilder.base_url",
            &["EXAMDESK_EXAMBUILDER_BASE_URL"],
            &config.exambuilder.base_url,
        ),
        Field::new(
            "exambuilder.api_key",
            &["EXAMDESK_EXAMBUILDER_API_KEY"],
            redact_secret(&config.exambuilder.api_key),
        ),
        Field::new(
            "exambuilder.api_secret",
            &["EXAMDESK_EXAMBUILDER_API_SECRET"],
            redact_secret(&config.exambuilder.api_secret),
        ),
        Field::new(
            "exambuilder.timeout_secs",
            &["EXAMDESK_EXAMBUILDER_TIMEOUT_SECS"],
            config.exambuilder.timeout_secs,
        ),
        Field::new(
            "dialogue.history_window",
            &["EXAMDESK_DIALOGUE_HISTORY_WINDOW"],
            config.dialogue.history_window,
        ),
        Field::new(
            "dialogue.short_reply_max_words",
            &["EXAMDESK_DIALOGUE_SHORT_REPLY_MAX_WORDS"],
            config.dialogue.short_reply_max_words,
        ),
        Field::new(
            "dialogue.fuzzy_max_distance",
            &["EXAMDESK_DIALOGUE_FUZZY_MAX_DISTANCE"],
            config.dialogue.fuzzy_max_distance,
        ),
        Field::new(
            "dialogue.operation_timeout_ms",
            &["EXAMDESK_DIALOGUE_OPERATION_TIMEOUT_MS"],
            config.dialogue.operation_timeout_ms,
        ),
        Field::new(
            "server.bind_address",
            &["EXAMDESK_SERVER_BIND_ADDRESS"],
            &config.server.bind_address,
        ),
        Field::new("server.port", &["EXAMDESK_SERVER_PORT"], config.server.port),
        Field::new(
            "server.graceful_shutdown_secs",
            &["EXAMDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs,
        ),
        Field::new(
            "logging.level",
            &["EXAMDESK_LOGGING_LEVEL", "EXAMDESK_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["EXAMDESK_LOGGING_FORMAT", "EXAMDESK_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/examdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &SecretString) -> String {
    if secret.expose_secret().trim().is_empty() {
        "<unset>".to_string()
    } else {
        "<redacted>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use examdesk_core::config::LoadOptions;
    use toml::Value;

    use super::{contains_path, run};

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: Value = "[dialogue]\nhistory_window = 8\n".parse().expect("toml");

        assert!(contains_path(&doc, "dialogue.history_window"));
        assert!(!contains_path(&doc, "dialogue.fuzzy_max_distance"));
        assert!(!contains_path(&doc, "server.port"));
    }

    #[test]
    fn file_values_are_attributed_and_secrets_redacted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("examdesk.toml");
        fs::write(
            &path,
            "[exambuilder]\nmode = \"live\"\napi_key = \"key-123\"\napi_secret = \"secret-456\"\n\n[server]\nport = 9090\n",
        )
        .expect("write config");

        let output = run(&LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        let file_source = format!("(source: file ({}))", path.display());
        assert!(output.contains(&format!("- server.port = 9090 {file_source}")), "{output}");
        assert!(output.contains("- exambuilder.api_key = <redacted>"), "{output}");
        assert!(!output.contains("key-123"));
        assert!(!output.contains("secret-456"));
    }
}
