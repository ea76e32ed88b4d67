use std::time::Duration;

use examdesk_core::config::{AppConfig, BackendMode, LoadOptions, SessionStoreKind};
use examdesk_db::connect_with_settings;
use examdesk_exambuilder::{ExamBackend, ExamBuilderClient};
use serde::Serialize;

use crate::commands::async_runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let (backend, sessions) = match async_runtime() {
                Ok(runtime) => runtime.block_on(async {
                    (check_exambuilder(&config).await, check_session_store(&config).await)
                }),
                Err(error) => (
                    failed("exambuilder_backend", error.to_string()),
                    failed("session_store", error.to_string()),
                ),
            };
            checks.push(backend);
            checks.push(sessions);
        }
        Err(error) => {
            checks.push(failed("config_validation", error.to_string()));
            checks.push(skipped("exambuilder_backend"));
            checks.push(skipped("session_store"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

async fn check_exambuilder(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "exambuilder_backend";

    if config.exambuilder.mode == BackendMode::Demo {
        return DoctorCheck {
            name: NAME,
            status: CheckStatus::Pass,
            details: "demo mode: seeded in-memory catalog, no network calls".to_string(),
        };
    }

    let client = match ExamBuilderClient::new(&config.exambuilder) {
        Ok(client) => client,
        Err(error) => return failed(NAME, error.to_string()),
    };
    let limit = Duration::from_secs(config.exambuilder.timeout_secs);
    match tokio::time::timeout(limit, client.get_instructor_id()).await {
        Ok(Ok(instructor_id)) => DoctorCheck {
            name: NAME,
            status: CheckStatus::Pass,
            details: format!(
                "authenticated against `{}` as instructor {instructor_id}",
                config.exambuilder.base_url
            ),
        },
        Ok(Err(error)) => failed(NAME, format!("instructor lookup failed: {error}")),
        Err(_) => failed(NAME, format!("no answer within {}s", limit.as_secs())),
    }
}

async fn check_session_store(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "session_store";

    if config.database.store == SessionStoreKind::Memory {
        return DoctorCheck {
            name: NAME,
            status: CheckStatus::Pass,
            details: "in-memory sessions, nothing to connect to".to_string(),
        };
    }

    match connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    {
        Ok(pool) => {
            pool.close().await;
            DoctorCheck {
                name: NAME,
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            }
        }
        Err(error) => failed(NAME, format!("failed to connect to database: {error}")),
    }
}

fn failed(name: &'static str, details: String) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Fail, details }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
