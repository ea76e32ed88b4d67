use async_trait::async_trait;
use examdesk_core::domain::{
    Exam, ExamAttempt, ExamStatistics, NewStudent, ScheduleConfirmation, ScheduledExam, Student,
    StudentFilter,
};

use crate::error::ProviderError;

#[async_trait]
pub trait ExamBackend: Send + Sync {
    async fn get_instructor_id(&self) -> Result<String, ProviderError>;

    /// Every exam regardless of state, optionally narrowed by a name search.
    async fn list_exams(
        &self,
        instructor_id: &str,
        exam_name: Option<&str>,
    ) -> Result<Vec<Exam>, ProviderError>;

    async fn list_students(
        &self,
        instructor_id: &str,
        filter: &StudentFilter,
    ) -> Result<Vec<Student>, ProviderError>;

    /// Resolves a login (usually an email) to the student record. Matching is case-insensitive.
    async fn search_student(
        &self,
        instructor_id: &str,
        student_id: &str,
    ) -> Result<Option<Student>, ProviderError> {
        let filter =
            StudentFilter { student_id: Some(student_id.to_string()), ..StudentFilter::default() };
        let students = self.list_students(instructor_id, &filter).await?;
        Ok(students.into_iter().find(|student| student.student_id.eq_ignore_ascii_case(student_id)))
    }

    async fn create_student(
        &self,
        instructor_id: &str,
        student: &NewStudent,
    ) -> Result<Student, ProviderError>;

    async fn list_scheduled_exams(
        &self,
        instructor_id: &str,
        user_id: &str,
        exam_id: Option<&str>,
    ) -> Result<Vec<ScheduledExam>, ProviderError>;

    async fn schedule_exam(
        &self,
        instructor_id: &str,
        exam_id: &str,
        user_id: &str,
    ) -> Result<ScheduleConfirmation, ProviderError>;

    async fn get_exam_attempt(
        &self,
        instructor_id: &str,
        user_exam_id: &str,
    ) -> Result<ExamAttempt, ProviderError>;

    async fn get_exam_statistics(
        &self,
        instructor_id: &str,
        user_id: &str,
        user_exam_id: &str,
    ) -> Result<ExamStatistics, ProviderError>;
}
