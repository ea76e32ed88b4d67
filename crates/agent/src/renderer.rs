//! Turns a validation gap or a dispatch result into the assistant's reply.
//!
//! Field prompts come from the phrase registry so continuity detection keeps
//! recognising what the renderer asked for.

use examdesk_core::domain::{
    AmbiguityReason, AttemptVerdict, ExamAttempt, Intent, OperationPayload, OperationResult,
    SlotField, Slots,
};

use crate::matching::is_email;
use crate::phrases::{field_prompt, retry_email_prompt, selection_prompt};

const MAX_LISTED_STUDENTS: usize = 10;

const CAPABILITIES: &str = "I can help you with ExamBuilder:\n\
- Show available exams (\"show me available exams\")\n\
- List students (\"list students\")\n\
- Create a student account (\"create a student account\")\n\
- Schedule an exam (\"schedule Biology Midterm for ana.lima@example.com\")\n\
- Show scheduled exams (\"what exams are scheduled for ana.lima@example.com?\")\n\
- Look up exam results (\"show my exam results\")\n\
- Fetch an exam attempt or its statistics by user exam ID\n\
- Check the connection (\"status\")";

pub fn render(
    intent: Option<Intent>,
    missing: &[SlotField],
    result: Option<&OperationResult>,
    slots: &Slots,
) -> String {
    match intent {
        None | Some(Intent::Help) => return CAPABILITIES.to_string(),
        Some(Intent::Unsupported) => {
            return "Sorry, I can't do that here. Say 'help' to see what I can do.".to_string();
        }
        Some(_) => {}
    }

    if let (Some(intent), Some(first)) = (intent, missing.first()) {
        return render_missing(intent, *first, slots);
    }

    match result {
        Some(result) => render_result(result, slots),
        None => CAPABILITIES.to_string(),
    }
}

fn render_missing(intent: Intent, field: SlotField, slots: &Slots) -> String {
    let prompt = field_prompt(intent, field, slots);
    match slots.get(field) {
        // Present but rejected by validation.
        Some(value) if field == SlotField::AccountIdentifier && !is_email(value) => {
            format!("'{value}' doesn't look like an email address. {prompt}")
        }
        _ => prompt,
    }
}

pub fn render_result(result: &OperationResult, slots: &Slots) -> String {
    match result {
        OperationResult::Success { payload, .. } => render_success(payload),
        OperationResult::AlreadyExists { intent: Intent::CreateStudent, subject, .. } => {
            retry_email_prompt(subject)
        }
        OperationResult::AlreadyExists { message, .. } => {
            format!("{message} Nothing was changed.")
        }
        OperationResult::Failure { intent, reason, hint, retry_field, .. } => {
            let mut message = reason.clone();
            if let Some(hint) = hint {
                message.push(' ');
                message.push_str(hint);
            }
            if let Some(field) = retry_field {
                message.push_str("\n\n");
                message.push_str(&field_prompt(*intent, *field, &slots.without_secrets()));
            }
            message
        }
        OperationResult::Ambiguous { query, reason, candidates, subject, .. } => {
            let header = match (reason, subject) {
                (AmbiguityReason::NoMatch, Some(subject)) => format!(
                    "Sorry, I couldn't find an exam matching '{query}' for {subject}. Here are their exams:"
                ),
                (AmbiguityReason::NoMatch, None) => {
                    format!("Sorry, I couldn't find an exam matching '{query}'. Here are the options:")
                }
                (AmbiguityReason::MultipleMatches, _) => {
                    format!("I found several exams matching '{query}'. Which one did you mean?")
                }
            };
            let lines: Vec<String> = candidates
                .iter()
                .enumerate()
                .map(|(index, candidate)| match &candidate.detail {
                    Some(detail) => format!("{}. {} ({detail})", index + 1, candidate.label),
                    None => format!("{}. {}", index + 1, candidate.label),
                })
                .collect();
            format!("{header}\n{}\n\n{}", lines.join("\n"), selection_prompt())
        }
    }
}

fn render_success(payload: &OperationPayload) -> String {
    match payload {
        OperationPayload::Status(status) => format!(
            "Connected to ExamBuilder (instructor {}). {} exams in total, {} ready for scheduling.",
            status.instructor_id, status.total_exams, status.active_exams
        ),
        OperationPayload::Exams(exams) if exams.is_empty() => {
            "No exams matched. Say 'show me available exams' to see the full list.".to_string()
        }
        OperationPayload::Exams(exams) => {
            let (active, inactive): (Vec<_>, Vec<_>) = exams.iter().partition(|exam| exam.active);
            let mut sections = Vec::new();
            if !active.is_empty() {
                let names: Vec<String> =
                    active.iter().map(|exam| format!("- {}", exam.name)).collect();
                sections.push(format!("Ready for scheduling:\n{}", names.join("\n")));
            }
            if !inactive.is_empty() {
                let names: Vec<String> =
                    inactive.iter().map(|exam| format!("- {}", exam.name)).collect();
                sections.push(format!("Inactive:\n{}", names.join("\n")));
            }
            format!("Here are the exams ({} total):\n\n{}", exams.len(), sections.join("\n\n"))
        }
        OperationPayload::Students(students) if students.is_empty() => {
            "No students matched.".to_string()
        }
        OperationPayload::Students(students) => {
            let mut lines: Vec<String> = students
                .iter()
                .take(MAX_LISTED_STUDENTS)
                .map(|student| format!("- {} ({})", student.display_name(), student.student_id))
                .collect();
            if students.len() > MAX_LISTED_STUDENTS {
                lines.push(format!("... and {} more students", students.len() - MAX_LISTED_STUDENTS));
            }
            format!("Found {} students:\n{}", students.len(), lines.join("\n"))
        }
        OperationPayload::StudentCreated(student) => format!(
            "Account created for {}! They can log in with Student ID {}.",
            student.display_name(),
            student.student_id
        ),
        OperationPayload::ExamScheduled { exam, student, confirmation } => {
            let mut message =
                format!("Scheduled '{}' for {} ({}).", exam.name, student.display_name(), student.student_id);
            if let Some(user_exam_id) = &confirmation.user_exam_id {
                message.push_str(&format!(" User exam ID: {user_exam_id}"));
            }
            message
        }
        OperationPayload::ScheduledExams { student, exams } if exams.is_empty() => {
            format!("{} has no scheduled exams.", student.display_name())
        }
        OperationPayload::ScheduledExams { student, exams } => {
            let lines: Vec<String> = exams
                .iter()
                .map(|entry| {
                    format!("- {}: {} (user exam ID {})", entry.exam_name, entry.status_label(), entry.user_exam_id)
                })
                .collect();
            format!("Scheduled exams for {}:\n{}", student.display_name(), lines.join("\n"))
        }
        OperationPayload::ExamAttempt(attempt) => render_attempt(attempt),
        OperationPayload::ExamStatistics { student, statistics } if statistics.entries.is_empty() => {
            format!(
                "No statistics are recorded yet for {} on user exam ID {}.",
                student.display_name(),
                statistics.user_exam_id
            )
        }
        OperationPayload::ExamStatistics { student, statistics } => {
            let lines: Vec<String> =
                statistics.entries.iter().map(|(key, value)| format!("- {key}: {value}")).collect();
            format!(
                "Statistics for {} (user exam ID {}):\n{}",
                student.display_name(),
                statistics.user_exam_id,
                lines.join("\n")
            )
        }
    }
}

fn render_attempt(attempt: &ExamAttempt) -> String {
    let who = if attempt.student_name.trim().is_empty() {
        attempt.student_id.as_str()
    } else {
        attempt.student_name.as_str()
    };
    let score = attempt.score.map(|score| format!("{score:.0}")).unwrap_or_default();

    match attempt.verdict() {
        AttemptVerdict::Passed => {
            format!("{who} passed '{}' with a score of {score}.", attempt.exam_name)
        }
        AttemptVerdict::Failed => format!(
            "{who} scored {score} on '{}', below the passing score of {:.0}.",
            attempt.exam_name,
            attempt.passing_score.unwrap_or(70.0)
        ),
        AttemptVerdict::ScorePending => {
            format!("{who} completed '{}', but the score isn't available yet.", attempt.exam_name)
        }
        AttemptVerdict::NotStarted => {
            format!("{who} hasn't completed '{}' yet.", attempt.exam_name)
        }
    }
}
