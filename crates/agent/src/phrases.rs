//! Follow-up prompts and the markers that recognise them.
//!
//! Every prompt the renderer asks for a field is built here, and every prompt
//! embeds the marker that `match_phrase` looks for. Continuity detection reads
//! the same table, so a wording change only has to happen in one place.

use examdesk_core::domain::{Intent, SlotField, Slots};

/// Bumped whenever a marker changes, so stored transcripts can be re-read with care.
pub const PHRASE_REGISTRY_VERSION: u32 = 1;

pub const FIRST_NAME_MARKER: &str = "what's your first name?";
pub const LAST_NAME_MARKER: &str = "what's your last name?";
pub const NEW_ACCOUNT_EMAIL_MARKER: &str = "your email address (this will be your student id";
pub const PASSWORD_MARKER: &str = "create a password for your account";
pub const RETRY_EMAIL_MARKER: &str = "please try a different email address";
pub const STUDENT_EMAIL_MARKER: &str = "please provide the student's email address";
pub const EXAM_NAME_MARKER: &str = "please tell me the exam name";
pub const REFERENCE_CODE_MARKER: &str = "please provide the user exam id";
pub const SELECTION_MARKER: &str = "you can say the exam name or number";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    Field(SlotField),
    Selection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Phrase {
    pub marker: &'static str,
    pub expects: Expectation,
    /// Intent whose flow emits the phrase, when only one does.
    pub intent: Option<Intent>,
}

pub const PHRASES: &[Phrase] = &[
    Phrase {
        marker: FIRST_NAME_MARKER,
        expects: Expectation::Field(SlotField::FirstName),
        intent: Some(Intent::CreateStudent),
    },
    Phrase {
        marker: LAST_NAME_MARKER,
        expects: Expectation::Field(SlotField::LastName),
        intent: Some(Intent::CreateStudent),
    },
    Phrase {
        marker: NEW_ACCOUNT_EMAIL_MARKER,
        expects: Expectation::Field(SlotField::AccountIdentifier),
        intent: Some(Intent::CreateStudent),
    },
    Phrase {
        marker: PASSWORD_MARKER,
        expects: Expectation::Field(SlotField::Password),
        intent: Some(Intent::CreateStudent),
    },
    Phrase {
        marker: RETRY_EMAIL_MARKER,
        expects: Expectation::Field(SlotField::AccountIdentifier),
        intent: Some(Intent::CreateStudent),
    },
    Phrase {
        marker: STUDENT_EMAIL_MARKER,
        expects: Expectation::Field(SlotField::AccountIdentifier),
        intent: None,
    },
    Phrase {
        marker: EXAM_NAME_MARKER,
        expects: Expectation::Field(SlotField::ExamName),
        intent: None,
    },
    Phrase {
        marker: REFERENCE_CODE_MARKER,
        expects: Expectation::Field(SlotField::ReferenceCode),
        intent: None,
    },
    Phrase { marker: SELECTION_MARKER, expects: Expectation::Selection, intent: None },
];

/// First registered phrase whose marker appears in `message`, case-insensitively.
pub fn match_phrase(message: &str) -> Option<&'static Phrase> {
    let lowered = message.to_lowercase();
    PHRASES.iter().find(|phrase| lowered.contains(phrase.marker))
}

/// The follow-up question for `field` while collecting slots for `intent`.
pub fn field_prompt(intent: Intent, field: SlotField, slots: &Slots) -> String {
    let first_name = slots.get(SlotField::FirstName).unwrap_or_default();
    let last_name = slots.get(SlotField::LastName).unwrap_or_default();

    match (intent, field) {
        (Intent::CreateStudent, SlotField::FirstName) => {
            "Let's create your student account! First, what's your first name?".to_string()
        }
        (_, SlotField::FirstName) => "What's your first name?".to_string(),
        (_, SlotField::LastName) if !first_name.is_empty() => {
            format!("Great! Hi {first_name}! What's your last name?")
        }
        (_, SlotField::LastName) => "What's your last name?".to_string(),
        (Intent::CreateStudent, SlotField::AccountIdentifier) => {
            let name = format!("{first_name} {last_name}");
            format!(
                "Perfect, {}! Now I need your email address (this will be your Student ID for logging in):",
                name.trim()
            )
        }
        (Intent::ScheduleExam, SlotField::AccountIdentifier) => {
            "Who should take the exam? Please provide the student's email address (Student ID)."
                .to_string()
        }
        (Intent::GetResults, SlotField::AccountIdentifier) => {
            "To look up exam results, please provide the student's email address (Student ID)."
                .to_string()
        }
        (Intent::ListScheduledExams, SlotField::AccountIdentifier) => {
            "Please provide the student's email address (Student ID) to see their scheduled exams."
                .to_string()
        }
        (_, SlotField::AccountIdentifier) => {
            "Please provide the student's email address (Student ID).".to_string()
        }
        (_, SlotField::Password) => {
            let account = slots.get(SlotField::AccountIdentifier).unwrap_or("your new account");
            format!("Almost done! Please create a password for your account (email: {account}):")
        }
        (Intent::ScheduleExam, SlotField::ExamName) => {
            "Which exam would you like to schedule? Please tell me the exam name.".to_string()
        }
        (Intent::GetResults, SlotField::ExamName) => {
            "Which exam results would you like to see? Please tell me the exam name.".to_string()
        }
        (_, SlotField::ExamName) => "Please tell me the exam name.".to_string(),
        (Intent::GetExamStatistics, SlotField::ReferenceCode) => {
            "Please provide the user exam ID for the attempt you want statistics on.".to_string()
        }
        (_, SlotField::ReferenceCode) => {
            "Please provide the user exam ID (the reference code shown next to a scheduled exam)."
                .to_string()
        }
    }
}

/// Shown after the backend refused a new account because the email is taken.
pub fn retry_email_prompt(student_id: &str) -> String {
    format!(
        "An account with email '{student_id}' already exists, so nothing was created. Please try a different email address."
    )
}

pub fn selection_prompt() -> &'static str {
    "You can say the exam name or number (e.g. '1' or '2')."
}

#[cfg(test)]
mod tests {
    use examdesk_core::domain::{Intent, SlotField, Slots};

    use super::{
        field_prompt, match_phrase, retry_email_prompt, selection_prompt, Expectation, PHRASES,
    };

    #[test]
    fn every_field_prompt_is_recognised_as_asking_for_that_field() {
        let slots = Slots::new()
            .with(SlotField::FirstName, "Ana")
            .with(SlotField::LastName, "Lima")
            .with(SlotField::AccountIdentifier, "ana@example.com");

        for intent in Intent::ALL {
            for entry in intent.schema() {
                let prompt = field_prompt(intent, entry.field, &slots);
                let phrase = match_phrase(&prompt)
                    .unwrap_or_else(|| panic!("no marker in prompt for {intent}/{}", entry.field));
                assert_eq!(
                    phrase.expects,
                    Expectation::Field(entry.field),
                    "prompt for {intent}/{} matched the wrong marker: {prompt}",
                    entry.field
                );
            }
        }
    }

    #[test]
    fn create_student_prompts_are_personalised() {
        let slots = Slots::new().with(SlotField::FirstName, "Tim");
        assert_eq!(
            field_prompt(Intent::CreateStudent, SlotField::LastName, &slots),
            "Great! Hi Tim! What's your last name?"
        );
    }

    #[test]
    fn retry_and_selection_prompts_carry_markers() {
        let retry = match_phrase(&retry_email_prompt("ana@example.com")).expect("retry marker");
        assert_eq!(retry.expects, Expectation::Field(SlotField::AccountIdentifier));
        assert_eq!(retry.intent, Some(Intent::CreateStudent));

        let selection = match_phrase(selection_prompt()).expect("selection marker");
        assert_eq!(selection.expects, Expectation::Selection);
    }

    #[test]
    fn markers_are_lowercase_and_unique() {
        for (index, phrase) in PHRASES.iter().enumerate() {
            assert_eq!(phrase.marker, phrase.marker.to_lowercase());
            assert!(PHRASES[index + 1..].iter().all(|other| other.marker != phrase.marker));
        }
    }

    #[test]
    fn unrelated_messages_match_nothing() {
        assert!(match_phrase("Exam 'Biology Midterm' scheduled for Ana Lima.").is_none());
    }
}
