//! Seeded, process-local stand-in for ExamBuilder used by demo mode and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use examdesk_core::domain::{
    Exam, ExamAttempt, ExamStatistics, NewStudent, ScheduleConfirmation, ScheduledExam, Student,
    StudentFilter,
};
use tokio::sync::RwLock;

use crate::backend::ExamBackend;
use crate::error::ProviderError;
use crate::mapping::{CODE_STUDENT_ALREADY_EXISTS, CODE_STUDENT_ALREADY_SCHEDULED};

pub const DEMO_INSTRUCTOR_ID: &str = "d3m0000000000000000000000000c0de";

#[derive(Clone, Debug)]
struct Enrollment {
    user_exam_id: String,
    exam_id: String,
    user_id: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    score: Option<f64>,
}

#[derive(Debug, Default)]
struct DemoState {
    exams: Vec<Exam>,
    students: Vec<Student>,
    enrollments: Vec<Enrollment>,
    next_id: u64,
}

impl DemoState {
    fn next_hex_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:032x}", self.next_id)
    }

    fn exam(&self, exam_id: &str) -> Option<&Exam> {
        self.exams.iter().find(|exam| exam.exam_id == exam_id)
    }

    fn student_by_user_id(&self, user_id: &str) -> Option<&Student> {
        self.students.iter().find(|student| student.user_id == user_id)
    }

    fn scheduled(&self, enrollment: &Enrollment) -> ScheduledExam {
        let exam_name =
            self.exam(&enrollment.exam_id).map(|exam| exam.name.clone()).unwrap_or_default();
        let student = self.student_by_user_id(&enrollment.user_id);
        ScheduledExam {
            user_exam_id: enrollment.user_exam_id.clone(),
            exam_id: enrollment.exam_id.clone(),
            exam_name,
            student_id: student.map(|student| student.student_id.clone()).unwrap_or_default(),
            student_name: student.map(Student::display_name).unwrap_or_default(),
            started_at: enrollment.started_at.clone(),
            completed_at: enrollment.completed_at.clone(),
        }
    }
}

pub struct InMemoryExamBuilder {
    state: RwLock<DemoState>,
}

impl Default for InMemoryExamBuilder {
    fn default() -> Self {
        Self::seeded()
    }
}

impl InMemoryExamBuilder {
    pub fn empty() -> Self {
        Self { state: RwLock::new(DemoState::default()) }
    }

    /// Four exams (one inactive), three students, and two scheduled exams for Ana Lima:
    /// a completed practice run and an untouched certification.
    pub fn seeded() -> Self {
        let mut state = DemoState::default();

        for (name, active, created_at) in [
            ("Serengeti Practice Exam", true, "2025-08-14 09:00:00"),
            ("Serengeti Certification", true, "2025-09-02 09:00:00"),
            ("Biology Midterm", true, "2025-10-01 08:30:00"),
            ("Legacy Safety Quiz", false, "2023-03-20 12:00:00"),
        ] {
            let exam_id = state.next_hex_id();
            state.exams.push(Exam {
                exam_id,
                name: name.to_string(),
                active,
                created_at: Some(created_at.to_string()),
            });
        }

        for (first, last, login) in [
            ("Ana", "Lima", "ana.lima@example.com"),
            ("Bruno", "Costa", "bruno.costa@example.com"),
            ("Carla", "Mendes", "carla.mendes@example.com"),
        ] {
            let user_id = state.next_hex_id();
            state.students.push(Student {
                user_id,
                student_id: login.to_string(),
                first_name: first.to_string(),
                last_name: last.to_string(),
            });
        }

        let ana = state.students[0].user_id.clone();
        let practice = state.exams[0].exam_id.clone();
        let certification = state.exams[1].exam_id.clone();
        let completed_id = state.next_hex_id();
        let open_id = state.next_hex_id();
        state.enrollments.push(Enrollment {
            user_exam_id: completed_id,
            exam_id: practice,
            user_id: ana.clone(),
            started_at: Some("2026-01-12 10:00:00".to_string()),
            completed_at: Some("2026-01-12 10:48:00".to_string()),
            score: Some(84.0),
        });
        state.enrollments.push(Enrollment {
            user_exam_id: open_id,
            exam_id: certification,
            user_id: ana,
            started_at: None,
            completed_at: None,
            score: None,
        });

        Self { state: RwLock::new(state) }
    }

    pub async fn student_count(&self) -> usize {
        self.state.read().await.students.len()
    }

    pub async fn enrollment_count(&self) -> usize {
        self.state.read().await.enrollments.len()
    }
}

fn contains_ignore_case(haystack: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim).filter(|needle| !needle.is_empty()) {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

fn check_instructor(instructor_id: &str) -> Result<(), ProviderError> {
    if instructor_id == DEMO_INSTRUCTOR_ID {
        return Ok(());
    }
    Err(ProviderError::Api {
        code: "INVALID_INSTRUCTOR".to_string(),
        message: "The Instructor ID was invalid".to_string(),
    })
}

#[async_trait]
impl ExamBackend for InMemoryExamBuilder {
    async fn get_instructor_id(&self) -> Result<String, ProviderError> {
        Ok(DEMO_INSTRUCTOR_ID.to_string())
    }

    async fn list_exams(
        &self,
        instructor_id: &str,
        exam_name: Option<&str>,
    ) -> Result<Vec<Exam>, ProviderError> {
        check_instructor(instructor_id)?;
        let state = self.state.read().await;
        Ok(state.exams.iter().filter(|exam| contains_ignore_case(&exam.name, exam_name)).cloned().collect())
    }

    async fn list_students(
        &self,
        instructor_id: &str,
        filter: &StudentFilter,
    ) -> Result<Vec<Student>, ProviderError> {
        check_instructor(instructor_id)?;
        let state = self.state.read().await;
        Ok(state
            .students
            .iter()
            .filter(|student| contains_ignore_case(&student.first_name, filter.first_name.as_deref()))
            .filter(|student| contains_ignore_case(&student.last_name, filter.last_name.as_deref()))
            .filter(|student| contains_ignore_case(&student.student_id, filter.student_id.as_deref()))
            .cloned()
            .collect())
    }

    async fn create_student(
        &self,
        instructor_id: &str,
        student: &NewStudent,
    ) -> Result<Student, ProviderError> {
        check_instructor(instructor_id)?;
        let mut state = self.state.write().await;
        if state
            .students
            .iter()
            .any(|existing| existing.student_id.eq_ignore_ascii_case(&student.student_id))
        {
            return Err(ProviderError::Api {
                code: CODE_STUDENT_ALREADY_EXISTS.to_string(),
                message: format!("A student with ID {} already exists.", student.student_id),
            });
        }

        let created = Student {
            user_id: state.next_hex_id(),
            student_id: student.student_id.clone(),
            first_name: student.first_name.clone(),
            last_name: student.last_name.clone(),
        };
        state.students.push(created.clone());
        Ok(created)
    }

    async fn list_scheduled_exams(
        &self,
        instructor_id: &str,
        user_id: &str,
        exam_id: Option<&str>,
    ) -> Result<Vec<ScheduledExam>, ProviderError> {
        check_instructor(instructor_id)?;
        let state = self.state.read().await;
        Ok(state
            .enrollments
            .iter()
            .filter(|enrollment| enrollment.user_id == user_id)
            .filter(|enrollment| exam_id.map_or(true, |exam_id| enrollment.exam_id == exam_id))
            .map(|enrollment| state.scheduled(enrollment))
            .collect())
    }

    async fn schedule_exam(
        &self,
        instructor_id: &str,
        exam_id: &str,
        user_id: &str,
    ) -> Result<ScheduleConfirmation, ProviderError> {
        check_instructor(instructor_id)?;
        let mut state = self.state.write().await;
        if state.exam(exam_id).is_none() {
            return Err(ProviderError::NotFound(format!("exam {exam_id}")));
        }
        if state.student_by_user_id(user_id).is_none() {
            return Err(ProviderError::NotFound(format!("student {user_id}")));
        }
        if state
            .enrollments
            .iter()
            .any(|enrollment| enrollment.exam_id == exam_id && enrollment.user_id == user_id)
        {
            return Err(ProviderError::Api {
                code: CODE_STUDENT_ALREADY_SCHEDULED.to_string(),
                message: "This student is already scheduled to take this exam.".to_string(),
            });
        }

        let user_exam_id = state.next_hex_id();
        state.enrollments.push(Enrollment {
            user_exam_id: user_exam_id.clone(),
            exam_id: exam_id.to_string(),
            user_id: user_id.to_string(),
            started_at: None,
            completed_at: None,
            score: None,
        });

        Ok(ScheduleConfirmation {
            exam_id: exam_id.to_string(),
            user_id: user_id.to_string(),
            user_exam_id: Some(user_exam_id),
        })
    }

    async fn get_exam_attempt(
        &self,
        instructor_id: &str,
        user_exam_id: &str,
    ) -> Result<ExamAttempt, ProviderError> {
        check_instructor(instructor_id)?;
        let state = self.state.read().await;
        let enrollment = state
            .enrollments
            .iter()
            .find(|enrollment| enrollment.user_exam_id == user_exam_id)
            .ok_or_else(|| ProviderError::NotFound(format!("exam attempt {user_exam_id}")))?;
        let scheduled = state.scheduled(enrollment);

        Ok(ExamAttempt {
            user_exam_id: scheduled.user_exam_id,
            exam_name: scheduled.exam_name,
            student_id: scheduled.student_id,
            student_name: scheduled.student_name,
            score: enrollment.score,
            passing_score: Some(70.0),
            started_at: scheduled.started_at,
            completed_at: scheduled.completed_at,
            attempt_number: enrollment.started_at.as_ref().map(|_| 1),
        })
    }

    async fn get_exam_statistics(
        &self,
        instructor_id: &str,
        user_id: &str,
        user_exam_id: &str,
    ) -> Result<ExamStatistics, ProviderError> {
        check_instructor(instructor_id)?;
        let state = self.state.read().await;
        let enrollment = state
            .enrollments
            .iter()
            .find(|enrollment| enrollment.user_exam_id == user_exam_id && enrollment.user_id == user_id)
            .ok_or_else(|| ProviderError::NotFound(format!("exam statistics {user_exam_id}")))?;

        let mut entries = BTreeMap::new();
        entries.insert("QUESTIONSTOTAL".to_string(), "50".to_string());
        if let Some(score) = enrollment.score {
            let correct = (score / 100.0 * 50.0).round() as u32;
            entries.insert("QUESTIONSCORRECT".to_string(), correct.to_string());
            entries.insert("SCORE".to_string(), format!("{score:.0}"));
        } else {
            entries.insert("QUESTIONSCORRECT".to_string(), "0".to_string());
        }

        Ok(ExamStatistics { user_exam_id: user_exam_id.to_string(), entries })
    }
}

#[cfg(test)]
mod tests {
    use examdesk_core::domain::{NewStudent, StudentFilter};

    use super::{InMemoryExamBuilder, DEMO_INSTRUCTOR_ID};
    use crate::backend::ExamBackend;
    use crate::error::ProviderError;

    fn new_student(login: &str) -> NewStudent {
        NewStudent {
            first_name: "Dina".to_string(),
            last_name: "Rocha".to_string(),
            student_id: login.to_string(),
            password: "Secret123".to_string(),
        }
    }

    #[tokio::test]
    async fn seeded_backend_lists_active_and_inactive_exams() {
        let backend = InMemoryExamBuilder::seeded();
        let exams = backend.list_exams(DEMO_INSTRUCTOR_ID, None).await.expect("exams");

        assert_eq!(exams.len(), 4);
        assert_eq!(exams.iter().filter(|exam| exam.active).count(), 3);
        assert!(exams.iter().all(|exam| exam.exam_id.len() == 32));

        let narrowed =
            backend.list_exams(DEMO_INSTRUCTOR_ID, Some("serengeti")).await.expect("exams");
        assert_eq!(narrowed.len(), 2);
    }

    #[tokio::test]
    async fn search_student_matches_login_case_insensitively() {
        let backend = InMemoryExamBuilder::seeded();
        let found = backend
            .search_student(DEMO_INSTRUCTOR_ID, "ANA.LIMA@example.com")
            .await
            .expect("search")
            .expect("student present");

        assert_eq!(found.display_name(), "Ana Lima");
        assert!(backend
            .search_student(DEMO_INSTRUCTOR_ID, "nobody@example.com")
            .await
            .expect("search")
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_student_is_reported_with_stable_code() {
        let backend = InMemoryExamBuilder::seeded();
        backend.create_student(DEMO_INSTRUCTOR_ID, &new_student("dina@example.com")).await.expect("create");

        let error = backend
            .create_student(DEMO_INSTRUCTOR_ID, &new_student("Dina@Example.com"))
            .await
            .expect_err("duplicate");

        assert_eq!(error.code(), "STUDENT_ALREADY_EXISTS");
        assert_eq!(backend.student_count().await, 4);
    }

    #[tokio::test]
    async fn scheduling_twice_is_rejected() {
        let backend = InMemoryExamBuilder::seeded();
        let exams = backend.list_exams(DEMO_INSTRUCTOR_ID, Some("biology")).await.expect("exams");
        let students = backend
            .list_students(
                DEMO_INSTRUCTOR_ID,
                &StudentFilter { first_name: Some("bruno".to_string()), ..StudentFilter::default() },
            )
            .await
            .expect("students");

        let confirmation = backend
            .schedule_exam(DEMO_INSTRUCTOR_ID, &exams[0].exam_id, &students[0].user_id)
            .await
            .expect("schedule");
        assert!(confirmation.user_exam_id.is_some());

        let error = backend
            .schedule_exam(DEMO_INSTRUCTOR_ID, &exams[0].exam_id, &students[0].user_id)
            .await
            .expect_err("second schedule");
        assert_eq!(error.code(), "STUDENT_ALREADY_SCHEDULED");
        assert_eq!(backend.enrollment_count().await, 3);
    }

    #[tokio::test]
    async fn attempts_and_statistics_follow_enrollments() {
        let backend = InMemoryExamBuilder::seeded();
        let ana = backend
            .search_student(DEMO_INSTRUCTOR_ID, "ana.lima@example.com")
            .await
            .expect("search")
            .expect("ana");
        let scheduled =
            backend.list_scheduled_exams(DEMO_INSTRUCTOR_ID, &ana.user_id, None).await.expect("scheduled");
        assert_eq!(scheduled.len(), 2);

        let completed = scheduled.iter().find(|exam| exam.is_completed()).expect("completed exam");
        let attempt =
            backend.get_exam_attempt(DEMO_INSTRUCTOR_ID, &completed.user_exam_id).await.expect("attempt");
        assert_eq!(attempt.score, Some(84.0));

        let stats = backend
            .get_exam_statistics(DEMO_INSTRUCTOR_ID, &ana.user_id, &completed.user_exam_id)
            .await
            .expect("stats");
        assert_eq!(stats.entries.get("QUESTIONSCORRECT").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn wrong_instructor_is_rejected() {
        let backend = InMemoryExamBuilder::seeded();
        let error = backend.list_exams("someone-else", None).await.expect_err("invalid");
        assert!(matches!(error, ProviderError::Api { ref code, .. } if code == "INVALID_INSTRUCTOR"));
    }
}
