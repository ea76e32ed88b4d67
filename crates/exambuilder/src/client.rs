//! HTTP client for the ExamBuilder instructor API.

use std::time::Duration;

use async_trait::async_trait;
use examdesk_core::config::ExamBuilderConfig;
use examdesk_core::domain::{
    Exam, ExamAttempt, ExamStatistics, NewStudent, ScheduleConfirmation, ScheduledExam, Student,
    StudentFilter,
};
use reqwest::{Client, Method, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::ExamBackend;
use crate::error::ProviderError;
use crate::mapping;

pub struct ExamBuilderClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    api_secret: SecretString,
}

impl ExamBuilderClient {
    pub fn new(config: &ExamBuilderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let query: Vec<(&str, &str)> =
            query.iter().copied().filter(|(_, value)| !value.trim().is_empty()).collect();
        self.send(Method::GET, path, &query, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ProviderError> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, ProviderError> {
        debug!(event_name = "exambuilder.request", method = %method, path, "calling ExamBuilder");

        let mut request = self
            .http
            .request(method, self.url(path))
            .basic_auth(self.api_key.expose_secret(), Some(self.api_secret.expose_secret()))
            .header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        decode_response(response).await
    }
}

async fn decode_response(response: Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        // Error bodies usually still carry `returnCode` and `message`.
        if let Ok(body) = serde_json::from_str::<Value>(&text) {
            if body.get("returnCode").is_some() || body.get("message").is_some() {
                return Err(mapping::api_error(&body));
            }
        }
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: text.chars().take(200).collect(),
        });
    }

    serde_json::from_str(&text).map_err(|error| ProviderError::Decode(error.to_string()))
}

#[async_trait]
impl ExamBackend for ExamBuilderClient {
    async fn get_instructor_id(&self) -> Result<String, ProviderError> {
        let body = self.get("validate.json", &[]).await?;
        mapping::instructor_id(&body)
    }

    async fn list_exams(
        &self,
        instructor_id: &str,
        exam_name: Option<&str>,
    ) -> Result<Vec<Exam>, ProviderError> {
        let path = format!("instructor/{instructor_id}/exam/list.json");
        let body =
            self.get(&path, &[("examstate", "all"), ("examname", exam_name.unwrap_or(""))]).await?;
        mapping::exams(&body)
    }

    async fn list_students(
        &self,
        instructor_id: &str,
        filter: &StudentFilter,
    ) -> Result<Vec<Student>, ProviderError> {
        let path = format!("instructor/{instructor_id}/student/list.json");
        let body = self
            .get(
                &path,
                &[
                    ("firstname", filter.first_name.as_deref().unwrap_or("")),
                    ("lastname", filter.last_name.as_deref().unwrap_or("")),
                    ("studentid", filter.student_id.as_deref().unwrap_or("")),
                ],
            )
            .await?;
        mapping::students(&body)
    }

    async fn create_student(
        &self,
        instructor_id: &str,
        student: &NewStudent,
    ) -> Result<Student, ProviderError> {
        let path = format!("instructor/{instructor_id}/student.json");
        let body = self
            .post(
                &path,
                json!({
                    "firstName": student.first_name,
                    "lastName": student.last_name,
                    "studentId": student.student_id,
                    "password": student.password,
                }),
            )
            .await?;
        let mut created = mapping::created_student(&body, student)?;

        // Older API versions answer without the new user id.
        if created.user_id.is_empty() {
            if let Some(found) = self.search_student(instructor_id, &student.student_id).await? {
                created.user_id = found.user_id;
            }
        }
        Ok(created)
    }

    async fn list_scheduled_exams(
        &self,
        instructor_id: &str,
        user_id: &str,
        exam_id: Option<&str>,
    ) -> Result<Vec<ScheduledExam>, ProviderError> {
        let path = format!("instructor/{instructor_id}/student/scheduled.json");
        let body =
            self.get(&path, &[("userid", user_id), ("examid", exam_id.unwrap_or(""))]).await?;
        mapping::scheduled_exams(&body)
    }

    async fn schedule_exam(
        &self,
        instructor_id: &str,
        exam_id: &str,
        user_id: &str,
    ) -> Result<ScheduleConfirmation, ProviderError> {
        let existing = self.list_scheduled_exams(instructor_id, user_id, Some(exam_id)).await?;
        if !existing.is_empty() {
            return Err(ProviderError::Api {
                code: mapping::CODE_STUDENT_ALREADY_SCHEDULED.to_string(),
                message: "This student is already scheduled to take this exam.".to_string(),
            });
        }

        let path = format!("instructor/{instructor_id}/student/exam/{exam_id}/schedule.json");
        let body = self.post(&path, json!({ "userId": user_id })).await?;
        mapping::schedule_confirmation(&body, exam_id, user_id)
    }

    async fn get_exam_attempt(
        &self,
        instructor_id: &str,
        user_exam_id: &str,
    ) -> Result<ExamAttempt, ProviderError> {
        let path = format!("instructor/{instructor_id}/student/userexam/{user_exam_id}/attempt.json");
        let body = self.get(&path, &[]).await?;
        mapping::exam_attempt(&body, user_exam_id)
    }

    async fn get_exam_statistics(
        &self,
        instructor_id: &str,
        user_id: &str,
        user_exam_id: &str,
    ) -> Result<ExamStatistics, ProviderError> {
        let path =
            format!("instructor/{instructor_id}/student/{user_id}/userexam/{user_exam_id}/stats.json");
        let body = self.get(&path, &[]).await?;
        mapping::statistics(&body, user_exam_id)
    }
}
