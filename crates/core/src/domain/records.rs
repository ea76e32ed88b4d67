use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub exam_id: String,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Internal backend id (32 hex characters).
    pub user_id: String,
    /// Human-facing login, usually an email address.
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.student_id.clone()
        } else {
            name.to_string()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub student_id: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentFilter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub student_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledExam {
    pub user_exam_id: String,
    pub exam_id: String,
    pub exam_name: String,
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl ScheduledExam {
    pub fn is_completed(&self) -> bool {
        self.completed_at.as_deref().is_some_and(|value| !value.trim().is_empty())
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_completed() {
            "Completed"
        } else {
            "Not Started"
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfirmation {
    pub exam_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_exam_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptVerdict {
    Passed,
    Failed,
    ScorePending,
    NotStarted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub user_exam_id: String,
    pub exam_name: String,
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub passing_score: Option<f64>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub attempt_number: Option<u32>,
}

impl ExamAttempt {
    pub fn verdict(&self) -> AttemptVerdict {
        let completed = self.completed_at.as_deref().is_some_and(|value| !value.trim().is_empty());
        if !completed {
            return AttemptVerdict::NotStarted;
        }
        match self.score {
            Some(score) if score >= self.passing_score.unwrap_or(70.0) => AttemptVerdict::Passed,
            Some(_) => AttemptVerdict::Failed,
            None => AttemptVerdict::ScorePending,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamStatistics {
    pub user_exam_id: String,
    pub entries: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub instructor_id: String,
    pub total_exams: usize,
    pub active_exams: usize,
}

#[cfg(test)]
mod tests {
    use super::{AttemptVerdict, ExamAttempt, ScheduledExam, Student};

    fn attempt(score: Option<f64>, completed_at: Option<&str>) -> ExamAttempt {
        ExamAttempt {
            user_exam_id: "ue-1".to_string(),
            exam_name: "Serengeti Certification".to_string(),
            student_id: "ana@example.com".to_string(),
            student_name: "Ana Lima".to_string(),
            score,
            passing_score: Some(75.0),
            started_at: Some("2026-01-05 10:00".to_string()),
            completed_at: completed_at.map(str::to_string),
            attempt_number: Some(1),
        }
    }

    #[test]
    fn verdict_compares_score_with_passing_score() {
        assert_eq!(attempt(Some(80.0), Some("2026-01-05 11:00")).verdict(), AttemptVerdict::Passed);
        assert_eq!(attempt(Some(60.0), Some("2026-01-05 11:00")).verdict(), AttemptVerdict::Failed);
        assert_eq!(attempt(None, Some("2026-01-05 11:00")).verdict(), AttemptVerdict::ScorePending);
        assert_eq!(attempt(Some(99.0), None).verdict(), AttemptVerdict::NotStarted);
    }

    #[test]
    fn scheduled_exam_without_completion_is_not_started() {
        let scheduled = ScheduledExam {
            user_exam_id: "ue-2".to_string(),
            exam_id: "ex-1".to_string(),
            exam_name: "Serengeti Practice Exam".to_string(),
            student_id: "ana@example.com".to_string(),
            student_name: "Ana Lima".to_string(),
            started_at: None,
            completed_at: Some(" ".to_string()),
        };

        assert!(!scheduled.is_completed());
        assert_eq!(scheduled.status_label(), "Not Started");
    }

    #[test]
    fn display_name_falls_back_to_student_id() {
        let student = Student {
            user_id: "u".to_string(),
            student_id: "anon@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
        };
        assert_eq!(student.display_name(), "anon@example.com");
    }
}
