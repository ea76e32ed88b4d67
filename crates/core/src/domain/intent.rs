use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::slots::{SlotField, Slots};

/// Closed set of things a user can ask the assistant to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Help,
    Status,
    ListExams,
    ListStudents,
    CreateStudent,
    ScheduleExam,
    ListScheduledExams,
    GetResults,
    GetExamAttempt,
    GetExamStatistics,
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: SlotField,
    pub requirement: Requirement,
}

const fn required(field: SlotField) -> FieldSpec {
    FieldSpec { field, requirement: Requirement::Required }
}

const fn optional(field: SlotField) -> FieldSpec {
    FieldSpec { field, requirement: Requirement::Optional }
}

const NO_FIELDS: &[FieldSpec] = &[];
const LIST_EXAMS_FIELDS: &[FieldSpec] = &[optional(SlotField::ExamName)];
const LIST_STUDENTS_FIELDS: &[FieldSpec] =
    &[optional(SlotField::FirstName), optional(SlotField::LastName)];
const CREATE_STUDENT_FIELDS: &[FieldSpec] = &[
    required(SlotField::FirstName),
    required(SlotField::LastName),
    required(SlotField::AccountIdentifier),
    required(SlotField::Password),
];
const SCHEDULE_EXAM_FIELDS: &[FieldSpec] =
    &[required(SlotField::ExamName), required(SlotField::AccountIdentifier)];
const LIST_SCHEDULED_FIELDS: &[FieldSpec] = &[required(SlotField::AccountIdentifier)];
const GET_RESULTS_FIELDS: &[FieldSpec] =
    &[required(SlotField::AccountIdentifier), required(SlotField::ExamName)];
const GET_ATTEMPT_FIELDS: &[FieldSpec] = &[required(SlotField::ReferenceCode)];
const GET_STATISTICS_FIELDS: &[FieldSpec] =
    &[required(SlotField::AccountIdentifier), required(SlotField::ReferenceCode)];

impl Intent {
    pub const ALL: [Intent; 11] = [
        Intent::Help,
        Intent::Status,
        Intent::ListExams,
        Intent::ListStudents,
        Intent::CreateStudent,
        Intent::ScheduleExam,
        Intent::ListScheduledExams,
        Intent::GetResults,
        Intent::GetExamAttempt,
        Intent::GetExamStatistics,
        Intent::Unsupported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Status => "status",
            Self::ListExams => "list_exams",
            Self::ListStudents => "list_students",
            Self::CreateStudent => "create_student",
            Self::ScheduleExam => "schedule_exam",
            Self::ListScheduledExams => "list_scheduled_exams",
            Self::GetResults => "get_results",
            Self::GetExamAttempt => "get_exam_attempt",
            Self::GetExamStatistics => "get_exam_statistics",
            Self::Unsupported => "unsupported",
        }
    }

    /// Accepts canonical tags plus the legacy names a language model tends to echo back.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "list_exams" => Some(Self::ListExams),
            "list_students" => Some(Self::ListStudents),
            "create_student" => Some(Self::CreateStudent),
            "schedule_exam" => Some(Self::ScheduleExam),
            "list_scheduled_exams" => Some(Self::ListScheduledExams),
            "get_results" | "get_exam_attempt_by_student" => Some(Self::GetResults),
            "get_exam_attempt" => Some(Self::GetExamAttempt),
            "get_exam_statistics" | "get_student_exam_statistics" => Some(Self::GetExamStatistics),
            "unsupported" => Some(Self::Unsupported),
            _ => None,
        }
    }

    /// Ordered field schema. Order decides which follow-up prompt is shown first.
    pub fn schema(&self) -> &'static [FieldSpec] {
        match self {
            Self::Help | Self::Status | Self::Unsupported => NO_FIELDS,
            Self::ListExams => LIST_EXAMS_FIELDS,
            Self::ListStudents => LIST_STUDENTS_FIELDS,
            Self::CreateStudent => CREATE_STUDENT_FIELDS,
            Self::ScheduleExam => SCHEDULE_EXAM_FIELDS,
            Self::ListScheduledExams => LIST_SCHEDULED_FIELDS,
            Self::GetResults => GET_RESULTS_FIELDS,
            Self::GetExamAttempt => GET_ATTEMPT_FIELDS,
            Self::GetExamStatistics => GET_STATISTICS_FIELDS,
        }
    }

    pub fn required_fields(&self) -> impl Iterator<Item = SlotField> {
        self.schema()
            .iter()
            .filter(|entry| entry.requirement == Requirement::Required)
            .map(|entry| entry.field)
    }

    pub fn accepts(&self, field: SlotField) -> bool {
        self.schema().iter().any(|entry| entry.field == field)
    }

    /// Required fields absent or empty in `slots`, in schema order.
    pub fn missing_fields(&self, slots: &Slots) -> Vec<SlotField> {
        self.required_fields().filter(|field| !slots.has(*field)).collect()
    }

    /// Intents answered by the backend rather than by a canned reply.
    pub fn dispatches(&self) -> bool {
        !matches!(self, Self::Help | Self::Unsupported)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
