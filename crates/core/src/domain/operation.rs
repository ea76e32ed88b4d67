use serde::{Deserialize, Serialize};

use crate::domain::intent::Intent;
use crate::domain::records::{
    Exam, ExamAttempt, ExamStatistics, ScheduleConfirmation, ScheduledExam, Student, SystemStatus,
};
use crate::domain::slots::SlotField;

/// Outcome of one dispatch. Kept on the session so the next turn can resolve against it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationResult {
    Success {
        intent: Intent,
        payload: OperationPayload,
    },
    AlreadyExists {
        intent: Intent,
        subject: String,
        message: String,
    },
    Failure {
        intent: Intent,
        step: String,
        reason: String,
        hint: Option<String>,
        /// Slot whose value the failed lookup rejected; the next turn collects it again.
        #[serde(default)]
        retry_field: Option<SlotField>,
    },
    Ambiguous {
        intent: Intent,
        /// Route step that produced the candidates; the selection resumes right after it.
        step: String,
        query: String,
        reason: AmbiguityReason,
        candidates: Vec<Candidate>,
        subject: Option<String>,
    },
}

impl OperationResult {
    pub fn intent(&self) -> Intent {
        match self {
            Self::Success { intent, .. }
            | Self::AlreadyExists { intent, .. }
            | Self::Failure { intent, .. }
            | Self::Ambiguous { intent, .. } => *intent,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Failure { .. } => "failure",
            Self::Ambiguous { .. } => "ambiguous",
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }

    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Self::Ambiguous { candidates, .. } => candidates,
            _ => &[],
        }
    }

    pub fn failure(
        intent: Intent,
        step: impl Into<String>,
        reason: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self::Failure { intent, step: step.into(), reason: reason.into(), hint, retry_field: None }
    }

    pub fn with_retry_field(mut self, field: SlotField) -> Self {
        if let Self::Failure { retry_field, .. } = &mut self {
            *retry_field = Some(field);
        }
        self
    }

    pub fn retry_field(&self) -> Option<SlotField> {
        match self {
            Self::Failure { retry_field, .. } => *retry_field,
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityReason {
    MultipleMatches,
    NoMatch,
}

/// One backend record offered to the user during disambiguation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    pub reference: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OperationPayload {
    Status(SystemStatus),
    Exams(Vec<Exam>),
    Students(Vec<Student>),
    StudentCreated(Student),
    ExamScheduled { exam: Exam, student: Student, confirmation: ScheduleConfirmation },
    ScheduledExams { student: Student, exams: Vec<ScheduledExam> },
    ExamAttempt(ExamAttempt),
    ExamStatistics { student: Student, statistics: ExamStatistics },
}

#[cfg(test)]
mod tests {
    use super::{AmbiguityReason, Candidate, OperationResult};
    use crate::domain::intent::Intent;
    use crate::domain::slots::SlotField;

    #[test]
    fn ambiguous_result_exposes_candidates_and_serializes_tagged() {
        let result = OperationResult::Ambiguous {
            intent: Intent::GetResults,
            step: "select_scheduled_exam".to_string(),
            query: "serengeti".to_string(),
            reason: AmbiguityReason::MultipleMatches,
            candidates: vec![
                Candidate {
                    label: "Serengeti Practice Exam".to_string(),
                    reference: "a".repeat(32),
                    detail: Some("Completed".to_string()),
                },
                Candidate {
                    label: "Serengeti Certification".to_string(),
                    reference: "b".repeat(32),
                    detail: None,
                },
            ],
            subject: Some("Ana Lima".to_string()),
        };

        assert!(result.is_ambiguous());
        assert_eq!(result.candidates().len(), 2);
        assert_eq!(result.intent(), Intent::GetResults);

        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["kind"], "ambiguous");
        let back: OperationResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, result);
    }

    #[test]
    fn failure_constructor_keeps_step_and_hint() {
        let result = OperationResult::failure(
            Intent::ScheduleExam,
            "resolve_exam",
            "No exam named 'Kilimanjaro' was found.",
            Some("Try 'Show me available exams' first.".to_string()),
        );

        assert_eq!(result.kind(), "failure");
        assert!(result.candidates().is_empty());
        assert_eq!(result.retry_field(), None);

        let retry = result.with_retry_field(SlotField::ExamName);
        assert_eq!(retry.retry_field(), Some(SlotField::ExamName));
    }
}
