//! Decoding of ExamBuilder's upper-case JSON payloads into domain records.

use std::collections::BTreeMap;

use examdesk_core::domain::{
    Exam, ExamAttempt, ExamStatistics, NewStudent, ScheduleConfirmation, ScheduledExam, Student,
};
use serde_json::Value;

use crate::error::ProviderError;

pub const CODE_API_ERROR: &str = "API_ERROR";
pub const CODE_STUDENT_ALREADY_SCHEDULED: &str = "STUDENT_ALREADY_SCHEDULED";
pub const CODE_STUDENT_ALREADY_EXISTS: &str = "STUDENT_ALREADY_EXISTS";

/// Turns a `{"status": false, ...}` body into an `Api` error with a normalized code.
pub fn ensure_status(body: &Value) -> Result<(), ProviderError> {
    if body.get("status").and_then(Value::as_bool) == Some(false) {
        return Err(api_error(body));
    }
    Ok(())
}

pub fn api_error(body: &Value) -> ProviderError {
    let message = opt_text(body, "message")
        .or_else(|| opt_text(body, "error"))
        .unwrap_or_else(|| "ExamBuilder rejected the request".to_string());
    let code = opt_text(body, "returnCode").unwrap_or_else(|| CODE_API_ERROR.to_string());
    ProviderError::Api { code: normalize_code(&code, &message), message }
}

fn normalize_code(code: &str, message: &str) -> String {
    let haystack = format!("{code} {message}").to_ascii_lowercase();
    if haystack.contains("student_already_scheduled") || haystack.contains("already scheduled") {
        return CODE_STUDENT_ALREADY_SCHEDULED.to_string();
    }
    if haystack.contains("student_already_exists")
        || haystack.contains("already exists")
        || haystack.contains("duplicate")
    {
        return CODE_STUDENT_ALREADY_EXISTS.to_string();
    }
    code.to_string()
}

pub fn instructor_id(body: &Value) -> Result<String, ProviderError> {
    ensure_status(body)?;
    opt_text(body, "instructor_id")
        .or_else(|| opt_text(body, "INSTRUCTORID"))
        .ok_or_else(|| ProviderError::Decode("validate response has no instructor_id".to_string()))
}

pub fn exams(body: &Value) -> Result<Vec<Exam>, ProviderError> {
    ensure_status(body)?;
    Ok(records(body, &["exams", "exam_list"]).iter().map(exam).collect())
}

pub fn exam(value: &Value) -> Exam {
    Exam {
        exam_id: text(value, "EXAMID"),
        name: text(value, "EXAMNAME"),
        active: text(value, "EXAMSTATE").eq_ignore_ascii_case("active"),
        created_at: opt_text(value, "DATETIMECREATED"),
    }
}

pub fn students(body: &Value) -> Result<Vec<Student>, ProviderError> {
    ensure_status(body)?;
    Ok(records(body, &["students", "student_list"]).iter().map(student).collect())
}

pub fn student(value: &Value) -> Student {
    Student {
        user_id: text(value, "USERID"),
        student_id: text(value, "STUDENTID"),
        first_name: text(value, "FIRSTNAME"),
        last_name: text(value, "LASTNAME"),
    }
}

/// The create endpoint echoes little back, so the request fills the gaps.
pub fn created_student(body: &Value, request: &NewStudent) -> Result<Student, ProviderError> {
    ensure_status(body)?;
    let record = body.get("student").or_else(|| body.get("data")).unwrap_or(body);
    let user_id = opt_text(record, "USERID")
        .or_else(|| opt_text(record, "userId"))
        .or_else(|| opt_text(body, "userId"))
        .unwrap_or_default();

    Ok(Student {
        user_id,
        student_id: opt_text(record, "STUDENTID").unwrap_or_else(|| request.student_id.clone()),
        first_name: opt_text(record, "FIRSTNAME").unwrap_or_else(|| request.first_name.clone()),
        last_name: opt_text(record, "LASTNAME").unwrap_or_else(|| request.last_name.clone()),
    })
}

pub fn scheduled_exams(body: &Value) -> Result<Vec<ScheduledExam>, ProviderError> {
    ensure_status(body)?;
    Ok(records(body, &["scheduled_exams", "students"]).iter().map(scheduled_exam).collect())
}

pub fn scheduled_exam(value: &Value) -> ScheduledExam {
    let name = format!("{} {}", text(value, "FIRSTNAME"), text(value, "LASTNAME"));
    ScheduledExam {
        user_exam_id: text(value, "USEREXAMID"),
        exam_id: text(value, "EXAMID"),
        exam_name: text(value, "EXAMNAME"),
        student_id: text(value, "STUDENTID"),
        student_name: name.trim().to_string(),
        started_at: opt_text(value, "DATETIMESTARTED"),
        completed_at: opt_text(value, "DATETIMECOMPLETED"),
    }
}

pub fn schedule_confirmation(
    body: &Value,
    exam_id: &str,
    user_id: &str,
) -> Result<ScheduleConfirmation, ProviderError> {
    ensure_status(body)?;
    let record = body.get("data").unwrap_or(body);
    Ok(ScheduleConfirmation {
        exam_id: exam_id.to_string(),
        user_id: user_id.to_string(),
        user_exam_id: opt_text(record, "USEREXAMID").or_else(|| opt_text(record, "userExamId")),
    })
}

pub fn exam_attempt(body: &Value, user_exam_id: &str) -> Result<ExamAttempt, ProviderError> {
    ensure_status(body)?;
    let record = body.get("exam_attempt").unwrap_or(body);
    let name = format!("{} {}", text(record, "FIRSTNAME"), text(record, "LASTNAME"));

    Ok(ExamAttempt {
        user_exam_id: opt_text(record, "USEREXAMID").unwrap_or_else(|| user_exam_id.to_string()),
        exam_name: text(record, "EXAMNAME"),
        student_id: text(record, "STUDENTID"),
        student_name: name.trim().to_string(),
        score: number(record, "SCORE"),
        passing_score: number(record, "PASSINGSCORE"),
        started_at: opt_text(record, "DATETIMESTARTED"),
        completed_at: opt_text(record, "DATETIMECOMPLETED"),
        attempt_number: number(record, "EXAMATTEMPT").map(|value| value as u32),
    })
}

/// Flattens the scalar members of the `statistics` object; nested values are kept as JSON text.
pub fn statistics(body: &Value, user_exam_id: &str) -> Result<ExamStatistics, ProviderError> {
    ensure_status(body)?;
    let record = body.get("statistics").unwrap_or(body);
    let Some(object) = record.as_object() else {
        return Err(ProviderError::Decode("statistics payload is not an object".to_string()));
    };

    let entries: BTreeMap<String, String> = object
        .iter()
        .filter(|(key, _)| key.as_str() != "status")
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key.clone(), text.clone())),
            other => Some((key.clone(), other.to_string())),
        })
        .collect();

    Ok(ExamStatistics { user_exam_id: user_exam_id.to_string(), entries })
}

fn records<'a>(body: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| body.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn text(value: &Value, key: &str) -> String {
    opt_text(value, key).unwrap_or_default()
}

fn opt_text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn number(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{api_error, exam_attempt, exams, scheduled_exams, statistics, students};
    use crate::error::ProviderError;

    #[test]
    fn exams_decode_state_and_names() {
        let body = json!({
            "status": true,
            "exams": [
                { "EXAMID": "e1", "EXAMNAME": "Biology Midterm", "EXAMSTATE": "Active" },
                { "EXAMID": "e2", "EXAMNAME": "Archived Quiz", "EXAMSTATE": "Not Active",
                  "DATETIMECREATED": "2025-09-01 10:00:00" }
            ]
        });

        let decoded = exams(&body).expect("exams");

        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].active);
        assert!(!decoded[1].active);
        assert_eq!(decoded[1].created_at.as_deref(), Some("2025-09-01 10:00:00"));
    }

    #[test]
    fn students_accept_either_list_key() {
        let body = json!({
            "status": true,
            "student_list": [
                { "USERID": "u1", "STUDENTID": "ana@example.com",
                  "FIRSTNAME": "Ana", "LASTNAME": "Lima" }
            ]
        });

        let decoded = students(&body).expect("students");
        assert_eq!(decoded[0].display_name(), "Ana Lima");
    }

    #[test]
    fn scheduled_exam_without_completion_date_is_open() {
        let body = json!({
            "status": true,
            "scheduled_exams": [
                { "USEREXAMID": "ue1", "EXAMID": "e1", "EXAMNAME": "Biology Final",
                  "FIRSTNAME": "Ana", "LASTNAME": "Lima", "STUDENTID": "ana@example.com",
                  "DATETIMECOMPLETED": "" }
            ]
        });

        let decoded = scheduled_exams(&body).expect("scheduled");
        assert!(!decoded[0].is_completed());
        assert_eq!(decoded[0].student_name, "Ana Lima");
    }

    #[test]
    fn attempt_scores_may_arrive_as_strings() {
        let body = json!({
            "status": true,
            "exam_attempt": {
                "EXAMNAME": "Biology Midterm", "SCORE": "82", "PASSINGSCORE": 70,
                "EXAMATTEMPT": "1", "DATETIMECOMPLETED": "2026-02-01 09:30:00"
            }
        });

        let attempt = exam_attempt(&body, "ue1").expect("attempt");

        assert_eq!(attempt.score, Some(82.0));
        assert_eq!(attempt.passing_score, Some(70.0));
        assert_eq!(attempt.attempt_number, Some(1));
        assert_eq!(attempt.user_exam_id, "ue1");
    }

    #[test]
    fn statistics_flatten_scalars() {
        let body = json!({
            "status": true,
            "statistics": { "QUESTIONSCORRECT": 41, "QUESTIONSTOTAL": 50, "NOTES": null }
        });

        let stats = statistics(&body, "ue1").expect("stats");
        assert_eq!(stats.entries.get("QUESTIONSCORRECT").map(String::as_str), Some("41"));
        assert!(!stats.entries.contains_key("NOTES"));
    }

    #[test]
    fn already_scheduled_messages_get_a_stable_code() {
        let error = api_error(&json!({
            "status": false,
            "message": "This student is already scheduled to take this exam."
        }));

        assert!(matches!(error, ProviderError::Api { ref code, .. } if code == "STUDENT_ALREADY_SCHEDULED"));
    }
}
