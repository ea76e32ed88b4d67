use std::env;
use std::sync::{Mutex, OnceLock};

use examdesk_cli::commands::{ask, doctor, load_options, migrate};
use examdesk_core::config::LoadOptions;
use serde_json::Value;

#[test]
fn ask_answers_from_the_demo_catalog() {
    with_env(&[("EXAMDESK_EXAMBUILDER_MODE", "demo")], || {
        let result = ask::run(&LoadOptions::default(), "status", None, false);
        assert_eq!(result.exit_code, 0, "expected a reply: {}", result.output);
        assert!(result.output.contains("4 exams in total"), "{}", result.output);
    });
}

#[test]
fn ask_json_echoes_the_session_id() {
    with_env(&[], || {
        let result =
            ask::run(&LoadOptions::default(), "show me available exams", Some("cli-1".into()), true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["session_id"], "cli-1");
        assert!(payload["message"].as_str().unwrap_or("").contains("Ready for scheduling:"));
    });
}

#[test]
fn ask_rejects_blank_messages() {
    with_env(&[], || {
        let result = ask::run(&LoadOptions::default(), "   ", None, false);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn ask_returns_config_failure_without_live_credentials() {
    with_env(&[("EXAMDESK_EXAMBUILDER_MODE", "live")], || {
        let result = ask::run(&LoadOptions::default(), "status", None, false);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_applies_session_schema_for_sqlite_store() {
    with_env(
        &[("EXAMDESK_DATABASE_STORE", "sqlite"), ("EXAMDESK_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = migrate::run(&LoadOptions::default());
            assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_is_a_no_op_for_the_memory_store() {
    with_env(&[("EXAMDESK_DATABASE_STORE", "memory")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert!(payload["message"].as_str().unwrap_or("").contains("in memory"));
    });
}

#[test]
fn missing_explicit_config_file_is_a_config_failure() {
    with_env(&[], || {
        let options = load_options(Some("does-not-exist/examdesk.toml".into()));
        let result = migrate::run(&options);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_in_demo_mode() {
    with_env(&[], || {
        let output = doctor::run(&LoadOptions::default(), true);
        let payload = parse_payload(&output);

        assert_eq!(payload["overall_status"], "pass");
        let names: Vec<&str> = payload["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(names, ["config_validation", "exambuilder_backend", "session_store"]);
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("EXAMDESK_EXAMBUILDER_MODE", "live")], || {
        let output = doctor::run(&LoadOptions::default(), false);

        assert!(output.starts_with("doctor: one or more readiness checks failed"), "{output}");
        assert!(output.contains("- [fail] config_validation:"));
        assert!(output.contains("- [skip] exambuilder_backend:"));
        assert!(output.contains("- [skip] session_store:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "EXAMDESK_DATABASE_STORE",
        "EXAMDESK_DATABASE_URL",
        "EXAMDESK_DATABASE_MAX_CONNECTIONS",
        "EXAMDESK_DATABASE_TIMEOUT_SECS",
        "EXAMDESK_LLM_PROVIDER",
        "EXAMDESK_LLM_API_KEY",
        "EXAMDESK_LLM_BASE_URL",
        "EXAMDESK_LLM_MODEL",
        "EXAMDESK_EXAMBUILDER_MODE",
        "EXAMDESK_EXAMBUILDER_BASE_URL",
        "EXAMDESK_EXAMBUILDER_API_KEY",
        "EXAMDESK_EXAMBUILDER_API_SECRET",
        "EXAMDESK_DIALOGUE_OPERATION_TIMEOUT_MS",
        "EXAMDESK_SERVER_PORT",
        "EXAMDESK_LOGGING_LEVEL",
        "EXAMDESK_LOGGING_FORMAT",
        "EXAMDESK_LOG_LEVEL",
        "EXAMDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
