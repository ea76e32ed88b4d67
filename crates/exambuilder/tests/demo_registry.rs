use std::sync::Arc;

use examdesk_agent::tools::{params, OperationRegistry};
use examdesk_core::domain::{Exam, ExamAttempt, ScheduleConfirmation, ScheduledExam, Student};
use examdesk_core::errors::DialogueError;
use examdesk_exambuilder::{register_backend, InMemoryExamBuilder};

async fn registry_with_instructor() -> (OperationRegistry, String) {
    let mut registry = OperationRegistry::default();
    register_backend(&mut registry, Arc::new(InMemoryExamBuilder::seeded()));
    let data = registry.invoke("get_instructor_id", &params([])).await.expect("instructor id");
    let instructor_id = data["instructor_id"].as_str().expect("string id").to_string();
    (registry, instructor_id)
}

#[tokio::test]
async fn create_search_schedule_and_read_back() {
    let (registry, instructor) = registry_with_instructor().await;

    let created: Student = serde_json::from_value(
        registry
            .invoke(
                "create_student",
                &params([
                    ("instructor_id", instructor.as_str()),
                    ("first_name", "Dina"),
                    ("last_name", "Rocha"),
                    ("student_id", "dina.rocha@example.com"),
                    ("password", "Pass1234"),
                ]),
            )
            .await
            .expect("create"),
    )
    .expect("student json");
    assert_eq!(created.user_id.len(), 32);

    let found: Student = serde_json::from_value(
        registry
            .invoke(
                "search_student",
                &params([
                    ("instructor_id", instructor.as_str()),
                    ("student_id", "dina.rocha@example.com"),
                ]),
            )
            .await
            .expect("search"),
    )
    .expect("student json");
    assert_eq!(found, created);

    let exams: Vec<Exam> = serde_json::from_value(
        registry
            .invoke(
                "list_exams",
                &params([("instructor_id", instructor.as_str()), ("exam_name", "Biology")]),
            )
            .await
            .expect("exams"),
    )
    .expect("exam json");
    assert_eq!(exams.len(), 1);

    let confirmation: ScheduleConfirmation = serde_json::from_value(
        registry
            .invoke(
                "schedule_exam",
                &params([
                    ("instructor_id", instructor.as_str()),
                    ("exam_id", exams[0].exam_id.as_str()),
                    ("user_id", created.user_id.as_str()),
                ]),
            )
            .await
            .expect("schedule"),
    )
    .expect("confirmation json");
    let user_exam_id = confirmation.user_exam_id.expect("user exam id");

    let scheduled: Vec<ScheduledExam> = serde_json::from_value(
        registry
            .invoke(
                "list_scheduled_exams",
                &params([("instructor_id", instructor.as_str()), ("user_id", created.user_id.as_str())]),
            )
            .await
            .expect("scheduled"),
    )
    .expect("scheduled json");
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].status_label(), "Not Started");

    let attempt: ExamAttempt = serde_json::from_value(
        registry
            .invoke(
                "get_exam_attempt",
                &params([("instructor_id", instructor.as_str()), ("user_exam_id", user_exam_id.as_str())]),
            )
            .await
            .expect("attempt"),
    )
    .expect("attempt json");
    assert_eq!(attempt.exam_name, "Biology Midterm");
    assert!(attempt.score.is_none());
}

#[tokio::test]
async fn duplicate_schedule_comes_back_as_operation_failure() {
    let (registry, instructor) = registry_with_instructor().await;
    let ana: Student = serde_json::from_value(
        registry
            .invoke(
                "search_student",
                &params([
                    ("instructor_id", instructor.as_str()),
                    ("student_id", "ana.lima@example.com"),
                ]),
            )
            .await
            .expect("search"),
    )
    .expect("student json");
    let scheduled: Vec<ScheduledExam> = serde_json::from_value(
        registry
            .invoke(
                "list_scheduled_exams",
                &params([("instructor_id", instructor.as_str()), ("user_id", ana.user_id.as_str())]),
            )
            .await
            .expect("scheduled"),
    )
    .expect("scheduled json");

    let error = registry
        .invoke(
            "schedule_exam",
            &params([
                ("instructor_id", instructor.as_str()),
                ("exam_id", scheduled[0].exam_id.as_str()),
                ("user_id", ana.user_id.as_str()),
            ]),
        )
        .await
        .expect_err("already scheduled");

    assert!(matches!(
        error,
        DialogueError::OperationFailure { ref code, .. } if code == "STUDENT_ALREADY_SCHEDULED"
    ));
}
