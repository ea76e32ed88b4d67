use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use examdesk_agent::tools::{
    Operation, OperationParams, OperationRegistry, OperationResponse, CODE_NOT_FOUND,
    OP_CREATE_STUDENT, OP_GET_EXAM_ATTEMPT, OP_GET_EXAM_STATISTICS, OP_GET_INSTRUCTOR_ID,
    OP_LIST_EXAMS, OP_LIST_SCHEDULED_EXAMS, OP_LIST_STUDENTS, OP_SCHEDULE_EXAM, OP_SEARCH_STUDENT,
    PARAM_EXAM_ID, PARAM_EXAM_NAME, PARAM_FIRST_NAME, PARAM_INSTRUCTOR_ID, PARAM_LAST_NAME,
    PARAM_PASSWORD, PARAM_STUDENT_ID, PARAM_USER_EXAM_ID, PARAM_USER_ID,
};
use examdesk_core::config::{AppConfig, BackendMode};
use examdesk_core::domain::{NewStudent, StudentFilter};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::backend::ExamBackend;
use crate::client::ExamBuilderClient;
use crate::demo::InMemoryExamBuilder;
use crate::error::ProviderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendOperationKind {
    GetInstructorId,
    ListExams,
    ListStudents,
    SearchStudent,
    CreateStudent,
    ListScheduledExams,
    ScheduleExam,
    GetExamAttempt,
    GetExamStatistics,
}

impl BackendOperationKind {
    pub const ALL: [BackendOperationKind; 9] = [
        Self::GetInstructorId,
        Self::ListExams,
        Self::ListStudents,
        Self::SearchStudent,
        Self::CreateStudent,
        Self::ListScheduledExams,
        Self::ScheduleExam,
        Self::GetExamAttempt,
        Self::GetExamStatistics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetInstructorId => OP_GET_INSTRUCTOR_ID,
            Self::ListExams => OP_LIST_EXAMS,
            Self::ListStudents => OP_LIST_STUDENTS,
            Self::SearchStudent => OP_SEARCH_STUDENT,
            Self::CreateStudent => OP_CREATE_STUDENT,
            Self::ListScheduledExams => OP_LIST_SCHEDULED_EXAMS,
            Self::ScheduleExam => OP_SCHEDULE_EXAM,
            Self::GetExamAttempt => OP_GET_EXAM_ATTEMPT,
            Self::GetExamStatistics => OP_GET_EXAM_STATISTICS,
        }
    }

    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Self::GetInstructorId => &[],
            Self::ListExams | Self::ListStudents => &[PARAM_INSTRUCTOR_ID],
            Self::SearchStudent => &[PARAM_INSTRUCTOR_ID, PARAM_STUDENT_ID],
            Self::CreateStudent => &[
                PARAM_INSTRUCTOR_ID,
                PARAM_FIRST_NAME,
                PARAM_LAST_NAME,
                PARAM_STUDENT_ID,
                PARAM_PASSWORD,
            ],
            Self::ListScheduledExams => &[PARAM_INSTRUCTOR_ID, PARAM_USER_ID],
            Self::ScheduleExam => &[PARAM_INSTRUCTOR_ID, PARAM_EXAM_ID, PARAM_USER_ID],
            Self::GetExamAttempt => &[PARAM_INSTRUCTOR_ID, PARAM_USER_EXAM_ID],
            Self::GetExamStatistics => &[PARAM_INSTRUCTOR_ID, PARAM_USER_ID, PARAM_USER_EXAM_ID],
        }
    }
}

/// One named operation bound to a backend. Parameters arrive as strings and
/// data leaves as the serialized domain record.
pub struct BackendOperation {
    kind: BackendOperationKind,
    backend: Arc<dyn ExamBackend>,
}

impl BackendOperation {
    pub fn new(kind: BackendOperationKind, backend: Arc<dyn ExamBackend>) -> Self {
        Self { kind, backend }
    }

    async fn run(&self, params: &OperationParams) -> Result<serde_json::Value, ProviderError> {
        let instructor_id = param(params, PARAM_INSTRUCTOR_ID);

        match self.kind {
            BackendOperationKind::GetInstructorId => {
                let instructor_id = self.backend.get_instructor_id().await?;
                Ok(json!({ "instructor_id": instructor_id }))
            }
            BackendOperationKind::ListExams => {
                let exam_name = optional(params, PARAM_EXAM_NAME);
                to_value(self.backend.list_exams(instructor_id, exam_name).await?)
            }
            BackendOperationKind::ListStudents => {
                let filter = StudentFilter {
                    first_name: optional(params, PARAM_FIRST_NAME).map(str::to_string),
                    last_name: optional(params, PARAM_LAST_NAME).map(str::to_string),
                    student_id: optional(params, PARAM_STUDENT_ID).map(str::to_string),
                };
                to_value(self.backend.list_students(instructor_id, &filter).await?)
            }
            BackendOperationKind::SearchStudent => {
                let student_id = param(params, PARAM_STUDENT_ID);
                match self.backend.search_student(instructor_id, student_id).await? {
                    Some(student) => to_value(student),
                    None => Err(ProviderError::NotFound(format!("student {student_id}"))),
                }
            }
            BackendOperationKind::CreateStudent => {
                let student = NewStudent {
                    first_name: param(params, PARAM_FIRST_NAME).to_string(),
                    last_name: param(params, PARAM_LAST_NAME).to_string(),
                    student_id: param(params, PARAM_STUDENT_ID).to_string(),
                    password: param(params, PARAM_PASSWORD).to_string(),
                };
                to_value(self.backend.create_student(instructor_id, &student).await?)
            }
            BackendOperationKind::ListScheduledExams => {
                let user_id = param(params, PARAM_USER_ID);
                let exam_id = optional(params, PARAM_EXAM_ID);
                to_value(self.backend.list_scheduled_exams(instructor_id, user_id, exam_id).await?)
            }
            BackendOperationKind::ScheduleExam => {
                let exam_id = param(params, PARAM_EXAM_ID);
                let user_id = param(params, PARAM_USER_ID);
                to_value(self.backend.schedule_exam(instructor_id, exam_id, user_id).await?)
            }
            BackendOperationKind::GetExamAttempt => to_value(
                self.backend.get_exam_attempt(instructor_id, param(params, PARAM_USER_EXAM_ID)).await?,
            ),
            BackendOperationKind::GetExamStatistics => {
                let user_id = param(params, PARAM_USER_ID);
                let user_exam_id = param(params, PARAM_USER_EXAM_ID);
                to_value(
                    self.backend.get_exam_statistics(instructor_id, user_id, user_exam_id).await?,
                )
            }
        }
    }
}

fn param<'a>(params: &'a OperationParams, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or_default()
}

fn optional<'a>(params: &'a OperationParams, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str).filter(|value| !value.trim().is_empty())
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, ProviderError> {
    serde_json::to_value(value).map_err(|error| ProviderError::Decode(error.to_string()))
}

#[async_trait]
impl Operation for BackendOperation {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn required_params(&self) -> &'static [&'static str] {
        self.kind.required_params()
    }

    async fn call(&self, params: &OperationParams) -> OperationResponse {
        match self.run(params).await {
            Ok(data) => OperationResponse::ok(data),
            Err(error) => {
                let code = match &error {
                    ProviderError::NotFound(_) => CODE_NOT_FOUND,
                    other => other.code(),
                };
                warn!(
                    event_name = "exambuilder.operation.failed",
                    operation = self.kind.name(),
                    code,
                    error = %error,
                    "backend operation failed"
                );
                OperationResponse::err(code, error.to_string())
            }
        }
    }
}

pub fn register_backend(registry: &mut OperationRegistry, backend: Arc<dyn ExamBackend>) {
    for kind in BackendOperationKind::ALL {
        registry.register(BackendOperation::new(kind, Arc::clone(&backend)));
    }
}

/// Builds the registry the dialogue engine dispatches through, bound to the
/// live API or the seeded demo catalog depending on `exambuilder.mode`.
pub fn registry_from_config(config: &AppConfig) -> Result<OperationRegistry, ProviderError> {
    let backend: Arc<dyn ExamBackend> = match config.exambuilder.mode {
        BackendMode::Live => Arc::new(ExamBuilderClient::new(&config.exambuilder)?),
        BackendMode::Demo => Arc::new(InMemoryExamBuilder::seeded()),
    };
    info!(
        event_name = "exambuilder.backend.selected",
        mode = ?config.exambuilder.mode,
        "exambuilder backend ready"
    );

    let mut registry = OperationRegistry::with_timeout(Duration::from_millis(
        config.dialogue.operation_timeout_ms,
    ));
    register_backend(&mut registry, backend);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use examdesk_agent::tools::{params, OperationRegistry, OP_SEARCH_STUDENT};
    use examdesk_core::config::AppConfig;
    use examdesk_core::errors::DialogueError;

    use super::{register_backend, registry_from_config, BackendOperationKind};
    use crate::demo::{InMemoryExamBuilder, DEMO_INSTRUCTOR_ID};

    #[test]
    fn every_kind_has_a_distinct_name() {
        let mut names: Vec<&str> = BackendOperationKind::ALL.iter().map(|kind| kind.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BackendOperationKind::ALL.len());
    }

    #[test]
    fn default_config_builds_demo_registry() {
        let registry = registry_from_config(&AppConfig::default()).expect("registry");
        assert_eq!(registry.len(), 9);
        assert!(registry.contains("schedule_exam"));
    }

    #[tokio::test]
    async fn unknown_student_surfaces_not_found() {
        let mut registry = OperationRegistry::default();
        register_backend(&mut registry, Arc::new(InMemoryExamBuilder::seeded()));

        let error = registry
            .invoke(
                OP_SEARCH_STUDENT,
                &params([("instructor_id", DEMO_INSTRUCTOR_ID), ("student_id", "ghost@example.com")]),
            )
            .await
            .expect_err("not found");

        assert!(matches!(error, DialogueError::OperationFailure { ref code, .. } if code == "NOT_FOUND"));
    }
}
