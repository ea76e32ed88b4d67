//! Pulls slot values out of an utterance and merges them into session memory.
//!
//! `extract_turn` is the entry point. It applies the continuation shortcut
//! first, then the configured extractor, and keeps the prior slots whenever the
//! extractor fails. Extractors only return the update; merging happens here.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use examdesk_core::domain::{Intent, SlotField, Slots};
use examdesk_core::errors::DialogueError;
use regex::Regex;
use tracing::{debug, warn};

use crate::continuity::ContinuationSignal;
use crate::llm::{parse_json_reply, LlmClient};
use crate::matching::{find_email, find_hex_ids, find_known_name, is_email, is_hex_id, word_count};

static FIRST_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfirst name(?:\s+is|:)?\s+([A-Za-z][A-Za-z'-]*)").expect("valid regex")
});

static LAST_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:last name|surname)(?:\s+is|:)?\s+([A-Za-z][A-Za-z'-]*)")
        .expect("valid regex")
});

static FULL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:my name is|name is|named|called)\s+([A-Za-z][A-Za-z'-]*)(?:\s+([A-Za-z][A-Za-z'-]*))?")
        .expect("valid regex")
});

static PASSWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpassword(?:\s+is|:|=)?\s+(\S+)").expect("valid regex")
});

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:user ?exam ?id|reference(?: code)?|attempt id)(?:\s+is|:)?\s+([A-Za-z0-9_-]+)")
        .expect("valid regex")
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["“]([^"”]{2,})["”]"#).expect("valid regex"));

static NAMED_EXAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:exam|test)\s+(?:named|called)\s+(.+?)\s*$").expect("valid regex")
});

static SCHEDULE_EXAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:schedule|enroll|book|assign)\s+(?:(?:me|him|her|them)\s+)?(?:(?:for|in|into|on)\s+)?(?:the\s+)?(.+?)\s+(?:for|to)\s+\S+$")
        .expect("valid regex")
});

static RESULTS_EXAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:results?|scores?|grades?)\s+(?:for|on|of|in|from)\s+(?:the\s+|my\s+)?(.+?)(?:\s+(?:for|of)\s+\S+)?\s*$")
        .expect("valid regex")
});

static CREATE_COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:create|register|add|make|sign up|set up|open)\b(?:\s+(?:me|a|an|new|the|my|student|students|account|user|profile|for|with)\b)*")
        .expect("valid regex")
});

const EXAM_STOP_PHRASES: [&str; 10] =
    ["exam", "exams", "an exam", "a test", "test", "it", "my exam", "the exam", "me", "student"];

const POSITIONAL_STOP_WORDS: [&str; 12] = [
    "and", "with", "password", "email", "name", "is", "my", "first", "last", "student", "account",
    "id",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractionSettings {
    pub short_reply_max_words: usize,
    pub fuzzy_max_distance: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self { short_reply_max_words: 3, fuzzy_max_distance: 3 }
    }
}

pub struct ExtractionInput<'a> {
    pub utterance: &'a str,
    pub intent: Intent,
    pub signal: &'a ContinuationSignal,
    pub slots: &'a Slots,
    /// Exam names this session has already seen, for tolerant matching.
    pub known_exam_names: &'a [String],
}

#[async_trait]
pub trait SlotExtractor: Send + Sync {
    /// Values found in this utterance only. Fields not mentioned are absent.
    async fn extract(&self, input: &ExtractionInput<'_>) -> Result<Slots, DialogueError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionOutcome {
    pub slots: Slots,
    /// Fields that received a value this turn.
    pub update: Slots,
    pub shortcut: bool,
}

pub async fn extract_turn(
    extractor: &dyn SlotExtractor,
    input: &ExtractionInput<'_>,
    settings: ExtractionSettings,
) -> ExtractionOutcome {
    if let Some(update) = continuation_shortcut(input, settings) {
        debug!(
            event_name = "agent.extraction.shortcut",
            field = ?input.signal.expected_field,
            "short reply assigned to the awaited field"
        );
        return ExtractionOutcome { slots: input.slots.merged(&update), update, shortcut: true };
    }

    match extractor.extract(input).await {
        Ok(update) => {
            ExtractionOutcome { slots: input.slots.merged(&update), update, shortcut: false }
        }
        Err(error) => {
            warn!(
                event_name = "agent.extraction.fallback",
                intent = input.intent.as_str(),
                error = %error,
                "extractor output unusable, keeping prior slots"
            );
            ExtractionOutcome { slots: input.slots.clone(), update: Slots::new(), shortcut: false }
        }
    }
}

/// A short reply to a pending question goes straight into the awaited field.
fn continuation_shortcut(input: &ExtractionInput<'_>, settings: ExtractionSettings) -> Option<Slots> {
    if !input.signal.is_continuation {
        return None;
    }
    let field = input.signal.expected_field?;
    if !input.intent.accepts(field) {
        return None;
    }

    let reply = input.utterance.trim();
    let single_token = !reply.is_empty() && !reply.contains(char::is_whitespace);
    let value = match field {
        SlotField::Password => single_token.then(|| reply.to_string()),
        SlotField::AccountIdentifier => {
            let token = reply.trim_end_matches(['.', ',', '!', '?']);
            (single_token || is_email(token)).then(|| token.to_string())
        }
        SlotField::FirstName | SlotField::LastName => {
            let name = reply.trim_end_matches(['.', '!']);
            let plain = name.split_whitespace().all(|word| {
                word.chars().all(|character| character.is_alphabetic() || matches!(character, '-' | '\''))
            });
            (plain && !name.is_empty() && word_count(name) <= settings.short_reply_max_words)
                .then(|| name.to_string())
        }
        SlotField::ExamName => {
            let name = reply.trim_end_matches(['.', '!', '?']);
            (!name.is_empty()
                && !is_email(name)
                && word_count(name) <= settings.short_reply_max_words)
                .then(|| name.to_string())
        }
        SlotField::ReferenceCode => {
            let code = reply.trim_end_matches(['.', '!']);
            let shaped = !code.is_empty()
                && code.chars().all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'));
            shaped.then(|| code.to_string())
        }
    }?;

    Some(Slots::new().with(field, value))
}

/// Regex and heuristic extraction. No network, fully deterministic.
#[derive(Clone, Debug, Default)]
pub struct RuleBasedExtractor {
    settings: ExtractionSettings,
}

impl RuleBasedExtractor {
    pub fn new(settings: ExtractionSettings) -> Self {
        Self { settings }
    }

    pub fn extract_text(&self, input: &ExtractionInput<'_>) -> Slots {
        let intent = input.intent;
        let mut update = Slots::new();

        if let Some(email) = find_email(input.utterance) {
            update.set(SlotField::AccountIdentifier, email);
        }
        assign_hex_ids(input, &mut update);

        if intent.accepts(SlotField::ReferenceCode) && !update.has(SlotField::ReferenceCode) {
            if let Some(code) = capture(&REFERENCE_RE, input.utterance) {
                update.set(SlotField::ReferenceCode, code);
            }
        }
        if intent.accepts(SlotField::Password) {
            if let Some(password) = capture(&PASSWORD_RE, input.utterance) {
                update.set(SlotField::Password, password);
            }
        }
        if intent.accepts(SlotField::FirstName) {
            extract_labelled_names(input.utterance, &mut update);
        }
        if intent == Intent::CreateStudent {
            self.assign_positional(input, &mut update);
        }
        if intent.accepts(SlotField::ExamName) {
            if let Some(exam_name) = self.exam_name(input) {
                update.set(SlotField::ExamName, exam_name);
            }
        }

        update
    }

    fn exam_name(&self, input: &ExtractionInput<'_>) -> Option<String> {
        if let Some(quoted) = capture(&QUOTED_RE, input.utterance) {
            return Some(quoted);
        }
        if let Some(index) =
            find_known_name(input.utterance, input.known_exam_names, self.settings.fuzzy_max_distance)
        {
            return input.known_exam_names.get(index).cloned();
        }

        let patterns: [&Regex; 3] = [&NAMED_EXAM_RE, &SCHEDULE_EXAM_RE, &RESULTS_EXAM_RE];
        patterns
            .into_iter()
            .filter_map(|pattern| capture(pattern, input.utterance))
            .map(|candidate| candidate.trim_end_matches(['.', '!', '?']).trim().to_string())
            .find(|candidate| plausible_exam_name(candidate))
    }

    /// "Create student John, Doe, secret123": values in order fill the name
    /// and password fields. A create command that starts a new request
    /// overwrites what the session remembers; otherwise only fields nobody has
    /// supplied yet are filled.
    fn assign_positional(&self, input: &ExtractionInput<'_>, update: &mut Slots) {
        let text = input.utterance;
        let (remainder, overwrite) = match CREATE_COMMAND_RE.find(text) {
            Some(command) => (&text[command.end()..], !input.signal.is_continuation),
            None if input.signal.is_continuation || text.contains(',') => (text, false),
            None => return,
        };
        if FIRST_NAME_RE.is_match(remainder)
            || LAST_NAME_RE.is_match(remainder)
            || FULL_NAME_RE.is_match(remainder)
        {
            return;
        }

        let open_fields: Vec<SlotField> =
            [SlotField::FirstName, SlotField::LastName, SlotField::Password]
                .into_iter()
                .filter(|field| !update.has(*field) && (overwrite || !input.slots.has(*field)))
                .collect();

        let mut cleaned = remainder.to_string();
        if let Some(email) = find_email(remainder) {
            cleaned = cleaned.replace(email, " ");
        }
        let separator = if cleaned.contains(',') { ',' } else { ' ' };
        let values: Vec<&str> = cleaned
            .split(separator)
            .map(|value| value.trim().trim_end_matches(['.', '!']))
            .filter(|value| !value.is_empty())
            .filter(|value| !POSITIONAL_STOP_WORDS.contains(&value.to_lowercase().as_str()))
            .collect();
        // Only bare values, no more than there are fields to fill; anything
        // else ("oh sorry, use ...") is chatter, not a field list.
        if values.len() > open_fields.len()
            || values.iter().any(|value| value.contains(char::is_whitespace))
        {
            return;
        }

        let mut open_fields = open_fields.into_iter();
        for value in values {
            let Some(field) = open_fields.next() else {
                break;
            };
            let is_name = value
                .chars()
                .all(|character| character.is_alphabetic() || matches!(character, '-' | '\''));
            if field != SlotField::Password && !is_name {
                break;
            }
            update.set(field, value);
        }
    }
}

#[async_trait]
impl SlotExtractor for RuleBasedExtractor {
    async fn extract(&self, input: &ExtractionInput<'_>) -> Result<Slots, DialogueError> {
        Ok(self.extract_text(input))
    }
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_labelled_names(text: &str, update: &mut Slots) {
    if let Some(captures) = FULL_NAME_RE.captures(text) {
        if let Some(first) = captures.get(1) {
            update.set(SlotField::FirstName, first.as_str());
        }
        if let Some(last) = captures.get(2) {
            update.set(SlotField::LastName, last.as_str());
        }
    }
    if let Some(first) = capture(&FIRST_NAME_RE, text) {
        update.set(SlotField::FirstName, first);
    }
    if let Some(last) = capture(&LAST_NAME_RE, text) {
        update.set(SlotField::LastName, last);
    }
}

/// 32-hex tokens are internal ids. Each fills the first identifier field of
/// the intent that is still unknown, else the last identifier field.
fn assign_hex_ids(input: &ExtractionInput<'_>, update: &mut Slots) {
    let identifier_fields: Vec<SlotField> = input
        .intent
        .schema()
        .iter()
        .map(|entry| entry.field)
        .filter(SlotField::is_identifier)
        .collect();
    let Some(last_field) = identifier_fields.last().copied() else {
        return;
    };

    for hex_id in find_hex_ids(input.utterance) {
        let field = identifier_fields
            .iter()
            .copied()
            .find(|field| !update.has(*field) && !input.slots.has(*field))
            .unwrap_or(last_field);
        update.set(field, hex_id);
    }
}

fn plausible_exam_name(candidate: &str) -> bool {
    !candidate.is_empty()
        && !candidate.contains('@')
        && !is_hex_id(candidate)
        && !EXAM_STOP_PHRASES.contains(&candidate.to_lowercase().as_str())
}

/// Asks a language model for a JSON object of slot values.
pub struct LlmExtractor {
    client: Arc<dyn LlmClient>,
}

impl LlmExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn prompt(input: &ExtractionInput<'_>) -> String {
        let fields: Vec<&str> = input.intent.schema().iter().map(|entry| entry.field.as_str()).collect();
        format!(
            "Extract field values for the `{}` request from the user's message.\n\
             Fields: {}.\n\
             Email addresses always belong in `account_identifier`.\n\
             Known exam names: {}.\n\
             Message: {}\n\
             Reply with a JSON object mapping field names to string values; omit unknown fields.",
            input.intent.as_str(),
            fields.join(", "),
            input.known_exam_names.join(", "),
            input.utterance
        )
    }
}

#[async_trait]
impl SlotExtractor for LlmExtractor {
    async fn extract(&self, input: &ExtractionInput<'_>) -> Result<Slots, DialogueError> {
        let reply = self
            .client
            .complete(&Self::prompt(input))
            .await
            .map_err(|error| DialogueError::ExtractionFailure(error.to_string()))?;
        let value = parse_json_reply(&reply).map_err(DialogueError::ExtractionFailure)?;
        let object = value.as_object().ok_or_else(|| {
            DialogueError::ExtractionFailure("reply is not a JSON object".to_string())
        })?;

        let mut update = Slots::new();
        for (key, value) in object {
            let (Some(field), Some(value)) = (SlotField::parse(key), value.as_str()) else {
                continue;
            };
            let field = if is_email(value) && field != SlotField::Password {
                SlotField::AccountIdentifier
            } else {
                field
            };
            if field.is_secret() && !input.intent.accepts(field) {
                continue;
            }
            update.set(field, value);
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use examdesk_core::domain::{Intent, SlotField, Slots};

    use super::{
        extract_turn, ExtractionInput, ExtractionSettings, LlmExtractor, RuleBasedExtractor,
    };
    use crate::continuity::ContinuationSignal;
    use crate::llm::ScriptedLlmClient;

    const HEX_A: &str = "0123456789abcdef0123456789abcdef";

    fn awaiting(field: SlotField, intent: Intent) -> ContinuationSignal {
        ContinuationSignal {
            is_continuation: true,
            expected_field: Some(field),
            awaiting_selection: false,
            intent: Some(intent),
            source: None,
        }
    }

    fn extract(utterance: &str, intent: Intent, slots: &Slots, known: &[String]) -> Slots {
        let signal = ContinuationSignal::none();
        let input = ExtractionInput { utterance, intent, signal: &signal, slots, known_exam_names: known };
        RuleBasedExtractor::default().extract_text(&input)
    }

    struct Case {
        utterance: &'static str,
        intent: Intent,
        expected: &'static [(SlotField, &'static str)],
    }

    #[test]
    fn rule_extraction_cases() {
        let known = vec![
            "Serengeti Practice Exam".to_string(),
            "Serengeti Certification".to_string(),
        ];
        let cases = [
            Case {
                utterance: "My student ID is a@b.com",
                intent: Intent::GetResults,
                expected: &[(SlotField::AccountIdentifier, "a@b.com")],
            },
            Case {
                utterance: "create student John, Doe, secret123",
                intent: Intent::CreateStudent,
                expected: &[
                    (SlotField::FirstName, "John"),
                    (SlotField::LastName, "Doe"),
                    (SlotField::Password, "secret123"),
                ],
            },
            Case {
                utterance: "create account for Ana Lima ana@example.com",
                intent: Intent::CreateStudent,
                expected: &[
                    (SlotField::FirstName, "Ana"),
                    (SlotField::LastName, "Lima"),
                    (SlotField::AccountIdentifier, "ana@example.com"),
                ],
            },
            Case {
                utterance: "Schedule Biology Midterm for ana.lima@example.com",
                intent: Intent::ScheduleExam,
                expected: &[
                    (SlotField::ExamName, "Biology Midterm"),
                    (SlotField::AccountIdentifier, "ana.lima@example.com"),
                ],
            },
            Case {
                utterance: "results for the serengeti certifcation please",
                intent: Intent::GetResults,
                expected: &[(SlotField::ExamName, "Serengeti Certification")],
            },
            Case {
                utterance: "show the exam called \"Advanced Safety\"",
                intent: Intent::ListExams,
                expected: &[(SlotField::ExamName, "Advanced Safety")],
            },
            Case {
                utterance: "attempt 0123456789abcdef0123456789abcdef",
                intent: Intent::GetExamAttempt,
                expected: &[(SlotField::ReferenceCode, HEX_A)],
            },
            Case {
                utterance: "my first name is Ana and my password is hunter22",
                intent: Intent::ScheduleExam,
                expected: &[],
            },
        ];

        for case in cases {
            let update = extract(case.utterance, case.intent, &Slots::new(), &known);
            let expected = case
                .expected
                .iter()
                .fold(Slots::new(), |slots, (field, value)| slots.with(*field, *value));
            assert_eq!(update, expected, "utterance: {}", case.utterance);
        }
    }

    #[test]
    fn hex_ids_fill_unknown_identifier_fields_in_schema_order() {
        let known_student = Slots::new().with(SlotField::AccountIdentifier, "ana@example.com");
        let update = extract(&format!("stats for {HEX_A}"), Intent::GetExamStatistics, &known_student, &[]);
        assert_eq!(update.get(SlotField::ReferenceCode), Some(HEX_A));
        assert!(!update.has(SlotField::AccountIdentifier));

        let update = extract(&format!("stats for {HEX_A}"), Intent::GetExamStatistics, &Slots::new(), &[]);
        assert_eq!(update.get(SlotField::AccountIdentifier), Some(HEX_A));
    }

    #[test]
    fn new_create_command_replaces_remembered_student_details() {
        let remembered = Slots::new()
            .with(SlotField::FirstName, "Dina")
            .with(SlotField::LastName, "Rocha")
            .with(SlotField::Password, "Pass1234");

        let update =
            extract("create student Eva, Souza, Pass9999", Intent::CreateStudent, &remembered, &[]);

        assert_eq!(update.get(SlotField::FirstName), Some("Eva"));
        assert_eq!(update.get(SlotField::LastName), Some("Souza"));
        assert_eq!(update.get(SlotField::Password), Some("Pass9999"));
    }

    #[test]
    fn continuing_reply_with_a_command_word_keeps_remembered_names() {
        let remembered =
            Slots::new().with(SlotField::FirstName, "Dina").with(SlotField::LastName, "Rocha");
        let signal = awaiting(SlotField::Password, Intent::CreateStudent);
        let input = ExtractionInput {
            utterance: "make it secret1",
            intent: Intent::CreateStudent,
            signal: &signal,
            slots: &remembered,
            known_exam_names: &[],
        };

        let update = RuleBasedExtractor::default().extract_text(&input);

        assert!(!update.has(SlotField::FirstName));
        assert!(!update.has(SlotField::LastName));
    }

    #[tokio::test]
    async fn continuation_assigns_short_reply_to_awaited_field() {
        let slots = Slots::new().with(SlotField::FirstName, "Tim");
        let signal = awaiting(SlotField::LastName, Intent::CreateStudent);
        let input = ExtractionInput {
            utterance: "David",
            intent: Intent::CreateStudent,
            signal: &signal,
            slots: &slots,
            known_exam_names: &[],
        };

        let outcome =
            extract_turn(&RuleBasedExtractor::default(), &input, ExtractionSettings::default()).await;

        assert!(outcome.shortcut);
        assert_eq!(outcome.slots.get(SlotField::LastName), Some("David"));
        assert_eq!(outcome.slots.get(SlotField::FirstName), Some("Tim"));
    }

    #[tokio::test]
    async fn password_reply_is_taken_verbatim_even_if_it_looks_like_an_email() {
        let slots = Slots::new().with(SlotField::AccountIdentifier, "tim@example.com");
        let signal = awaiting(SlotField::Password, Intent::CreateStudent);
        let input = ExtractionInput {
            utterance: "p@ss.word",
            intent: Intent::CreateStudent,
            signal: &signal,
            slots: &slots,
            known_exam_names: &[],
        };

        let outcome =
            extract_turn(&RuleBasedExtractor::default(), &input, ExtractionSettings::default()).await;

        assert_eq!(outcome.slots.get(SlotField::Password), Some("p@ss.word"));
        assert_eq!(outcome.slots.get(SlotField::AccountIdentifier), Some("tim@example.com"));
    }

    #[tokio::test]
    async fn long_reply_falls_through_to_full_extraction() {
        let signal = awaiting(SlotField::LastName, Intent::CreateStudent);
        let slots = Slots::new().with(SlotField::FirstName, "Tim");
        let input = ExtractionInput {
            utterance: "oh sorry, use tim@example.com as my login",
            intent: Intent::CreateStudent,
            signal: &signal,
            slots: &slots,
            known_exam_names: &[],
        };

        let outcome =
            extract_turn(&RuleBasedExtractor::default(), &input, ExtractionSettings::default()).await;

        assert!(!outcome.shortcut);
        assert_eq!(outcome.slots.get(SlotField::AccountIdentifier), Some("tim@example.com"));
        assert_eq!(outcome.slots.get(SlotField::FirstName), Some("Tim"));
    }

    #[tokio::test]
    async fn extractor_failure_keeps_prior_slots() {
        let extractor = LlmExtractor::new(Arc::new(ScriptedLlmClient::new(["definitely not json"])));
        let slots = Slots::new().with(SlotField::ExamName, "Biology Midterm");
        let signal = ContinuationSignal::none();
        let input = ExtractionInput {
            utterance: "for ana please",
            intent: Intent::ScheduleExam,
            signal: &signal,
            slots: &slots,
            known_exam_names: &[],
        };

        let outcome = extract_turn(&extractor, &input, ExtractionSettings::default()).await;

        assert_eq!(outcome.slots, slots);
        assert!(outcome.update.is_empty());
    }

    #[tokio::test]
    async fn llm_extractor_routes_emails_to_the_account_identifier() {
        let extractor = LlmExtractor::new(Arc::new(ScriptedLlmClient::new([
            r#"{"email": "ana@example.com", "exam_name": "Biology Midterm", "favourite_colour": "red"}"#,
        ])));
        let signal = ContinuationSignal::none();
        let slots = Slots::new();
        let input = ExtractionInput {
            utterance: "schedule biology for ana@example.com",
            intent: Intent::ScheduleExam,
            signal: &signal,
            slots: &slots,
            known_exam_names: &[],
        };

        let outcome = extract_turn(&extractor, &input, ExtractionSettings::default()).await;

        assert_eq!(outcome.slots.get(SlotField::AccountIdentifier), Some("ana@example.com"));
        assert_eq!(outcome.slots.get(SlotField::ExamName), Some("Biology Midterm"));
        assert_eq!(outcome.slots.len(), 2);
    }
}
