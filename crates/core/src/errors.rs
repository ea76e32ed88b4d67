use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures inside one dialogue turn. All of them are recovered before a reply is rendered.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogueError {
    #[error("classifier output could not be used: {0}")]
    ClassificationFailure(String),
    #[error("extractor output could not be used: {0}")]
    ExtractionFailure(String),
    #[error("operation `{operation}` failed with {code}: {message}")]
    OperationFailure { operation: String, code: String, message: String },
    #[error("operation `{operation}` timed out after {timeout_ms}ms")]
    OperationTimeout { operation: String, timeout_ms: u64 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Dialogue(#[from] DialogueError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// What a transport tells its caller. `message` is for logs; `user_message`
/// is the only text that goes back over the wire.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "That request couldn't be processed. Check the message and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "ExamBuilder is temporarily unavailable. Please try again shortly."
            }
            Self::Internal { .. } => "Something went wrong on our side.",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    /// Maps to the transport error, tagged with the caller's session or request id.
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(error) => {
                InterfaceError::BadRequest { message: error.to_string(), correlation_id }
            }
            Self::Dialogue(
                error @ (DialogueError::ClassificationFailure(_)
                | DialogueError::ExtractionFailure(_)),
            ) => InterfaceError::BadRequest { message: error.to_string(), correlation_id },
            Self::Dialogue(error) => {
                InterfaceError::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            Self::Persistence(message) | Self::Integration(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DialogueError, DomainError, InterfaceError};

    struct Case {
        error: ApplicationError,
        status_code: u16,
    }

    #[test]
    fn application_errors_map_to_transport_status() {
        let cases = [
            Case {
                error: DomainError::InvariantViolation("message must not be empty".to_owned())
                    .into(),
                status_code: 400,
            },
            Case {
                error: DialogueError::ClassificationFailure("not json".to_owned()).into(),
                status_code: 400,
            },
            Case {
                error: DialogueError::OperationTimeout {
                    operation: "list_scheduled_exams".to_owned(),
                    timeout_ms: 250,
                }
                .into(),
                status_code: 503,
            },
            Case {
                error: ApplicationError::Persistence("database is locked".to_owned()),
                status_code: 503,
            },
            Case {
                error: ApplicationError::Configuration("exambuilder.api_key missing".to_owned()),
                status_code: 500,
            },
        ];

        for case in cases {
            let label = case.error.to_string();
            let interface = case.error.into_interface("web-1");
            assert_eq!(interface.status_code(), case.status_code, "{label}");
            assert_eq!(interface.correlation_id(), "web-1");
        }
    }

    #[test]
    fn internal_detail_never_reaches_the_user_message() {
        let interface = ApplicationError::from(DialogueError::OperationFailure {
            operation: "create_student".to_owned(),
            code: "HTTP_502".to_owned(),
            message: "upstream said no".to_owned(),
        })
        .into_interface("web-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(interface.message().contains("create_student"));
        assert!(!interface.user_message().contains("upstream"));
        assert_eq!(
            interface.user_message(),
            "ExamBuilder is temporarily unavailable. Please try again shortly."
        );
    }
}
