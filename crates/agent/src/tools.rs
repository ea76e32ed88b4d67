use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use examdesk_core::errors::DialogueError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const OP_GET_INSTRUCTOR_ID: &str = "get_instructor_id";
pub const OP_LIST_EXAMS: &str = "list_exams";
pub const OP_LIST_STUDENTS: &str = "list_students";
pub const OP_SEARCH_STUDENT: &str = "search_student";
pub const OP_CREATE_STUDENT: &str = "create_student";
pub const OP_LIST_SCHEDULED_EXAMS: &str = "list_scheduled_exams";
pub const OP_SCHEDULE_EXAM: &str = "schedule_exam";
pub const OP_GET_EXAM_ATTEMPT: &str = "get_exam_attempt";
pub const OP_GET_EXAM_STATISTICS: &str = "get_exam_statistics";

pub const PARAM_INSTRUCTOR_ID: &str = "instructor_id";
pub const PARAM_EXAM_ID: &str = "exam_id";
pub const PARAM_EXAM_NAME: &str = "exam_name";
pub const PARAM_USER_ID: &str = "user_id";
pub const PARAM_STUDENT_ID: &str = "student_id";
pub const PARAM_FIRST_NAME: &str = "first_name";
pub const PARAM_LAST_NAME: &str = "last_name";
pub const PARAM_PASSWORD: &str = "password";
pub const PARAM_USER_EXAM_ID: &str = "user_exam_id";

pub const CODE_STUDENT_ALREADY_SCHEDULED: &str = "STUDENT_ALREADY_SCHEDULED";
pub const CODE_STUDENT_ALREADY_EXISTS: &str = "STUDENT_ALREADY_EXISTS";
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
pub const CODE_MISSING_PARAMETERS: &str = "MISSING_PARAMETERS";
pub const CODE_UNKNOWN_OPERATION: &str = "UNKNOWN_OPERATION";

pub type OperationParams = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub code: String,
    pub message: String,
}

/// Wire shape every provider answers with: `{status, data | error}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub status: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl OperationResponse {
    pub fn ok(data: Value) -> Self {
        Self { status: true, data, error: None }
    }

    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: false,
            data: Value::Null,
            error: Some(OperationError { code: code.into(), message: message.into() }),
        }
    }

    pub fn into_result(self) -> Result<Value, OperationError> {
        if self.status {
            return Ok(self.data);
        }
        Err(self.error.unwrap_or_else(|| OperationError {
            code: "UNKNOWN_ERROR".to_string(),
            message: "operation reported failure without details".to_string(),
        }))
    }
}

#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;
    fn required_params(&self) -> &'static [&'static str];
    async fn call(&self, params: &OperationParams) -> OperationResponse;
}

pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
    timeout: Duration,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_timeout(Duration::from_millis(10_000))
    }
}

impl OperationRegistry {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { operations: HashMap::new(), timeout }
    }

    pub fn register<T>(&mut self, operation: T)
    where
        T: Operation + 'static,
    {
        self.register_shared(Arc::new(operation));
    }

    pub fn register_shared(&mut self, operation: Arc<dyn Operation>) {
        self.operations.insert(operation.name().to_string(), operation);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Calls `name` with `params`. Missing parameters, provider errors and
    /// timeouts all come back as `DialogueError`, never as a panic.
    pub async fn invoke(&self, name: &str, params: &OperationParams) -> Result<Value, DialogueError> {
        let Some(operation) = self.operations.get(name) else {
            return Err(DialogueError::OperationFailure {
                operation: name.to_string(),
                code: CODE_UNKNOWN_OPERATION.to_string(),
                message: format!("no operation named `{name}` is registered"),
            });
        };

        let missing: Vec<&str> = operation
            .required_params()
            .iter()
            .copied()
            .filter(|param| params.get(*param).map_or(true, |value| value.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(DialogueError::OperationFailure {
                operation: name.to_string(),
                code: CODE_MISSING_PARAMETERS.to_string(),
                message: format!("missing required parameters: {}", missing.join(", ")),
            });
        }

        debug!(event_name = "agent.operation.invoke", operation = name, "invoking operation");
        let response = match tokio::time::timeout(self.timeout, operation.call(params)).await {
            Ok(response) => response,
            Err(_) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    event_name = "agent.operation.timeout",
                    operation = name,
                    timeout_ms,
                    "operation timed out"
                );
                return Err(DialogueError::OperationTimeout {
                    operation: name.to_string(),
                    timeout_ms,
                });
            }
        };

        response.into_result().map_err(|error| DialogueError::OperationFailure {
            operation: name.to_string(),
            code: error.code,
            message: error.message,
        })
    }
}

pub fn params<const N: usize>(pairs: [(&str, &str); N]) -> OperationParams {
    pairs
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
