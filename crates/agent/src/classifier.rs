use std::sync::Arc;

use async_trait::async_trait;
use examdesk_core::domain::{Intent, Turn};
use examdesk_core::errors::DialogueError;
use tracing::{debug, info, warn};

use crate::continuity::ContinuationSignal;
use crate::llm::{parse_json_reply, LlmClient};
use crate::matching::{find_hex_ids, normalize};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
    /// Carried over from the flow the user is answering, not classified afresh.
    pub continued: bool,
}

impl Classification {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self { intent, confidence, continued: false }
    }

    fn fallback() -> Self {
        Self::new(Intent::Help, 0.0)
    }
}

pub struct ClassifierInput<'a> {
    pub utterance: &'a str,
    pub history: &'a [Turn],
    pub signal: &'a ContinuationSignal,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, input: &ClassifierInput<'_>) -> Result<Classification, DialogueError>;
}

struct Rule {
    intent: Intent,
    keywords: &'static [&'static str],
    needs_hex_id: bool,
}

const fn rule(intent: Intent, keywords: &'static [&'static str]) -> Rule {
    Rule { intent, keywords, needs_hex_id: false }
}

// Order matters: "scheduled exams" must win over "schedule", "stats" over "results".
const RULES: &[Rule] = &[
    rule(
        Intent::Unsupported,
        &[" delete ", " remove ", " unschedule ", " cancel ", " update ", " edit ", " rename "],
    ),
    rule(Intent::Help, &[" help ", " what can you do ", " capabilities ", " how does this work "]),
    rule(Intent::Status, &[" status ", " connection ", " connected ", " health ", " ping "]),
    rule(Intent::GetExamStatistics, &[" statistic", " stats ", " breakdown "]),
    Rule {
        intent: Intent::GetExamAttempt,
        keywords: &[" attempt", " result", " score"],
        needs_hex_id: true,
    },
    rule(Intent::GetExamAttempt, &[" user exam id", " attempt id"]),
    rule(
        Intent::ListScheduledExams,
        &[" scheduled ", " upcoming ", " enrolled in ", " my exams ", " schedules "],
    ),
    rule(Intent::GetResults, &[" result", " score", " grade", " how did ", " passed ", " pass "]),
    rule(
        Intent::ScheduleExam,
        &[" schedule ", " enroll ", " assign ", " book ", " register for ", " sign up for "],
    ),
    rule(
        Intent::CreateStudent,
        &[
            " create ",
            " new student",
            " new account",
            " sign up ",
            " sign me up ",
            " register ",
            " add student",
            " add a student",
        ],
    ),
    rule(Intent::ListStudents, &[" students ", " student list ", " who is registered "]),
    rule(Intent::ListExams, &[" exams ", " exam list ", " available ", " tests ", " catalog "]),
    rule(Intent::Help, &[" hi ", " hello ", " hey ", " thanks "]),
];

const REQUEST_VERBS: [&str; 10] =
    ["list", "show", "create", "schedule", "enroll", "register", "get", "check", "find", "view"];

/// Keyword table over the normalized utterance. Deterministic and offline.
#[derive(Clone, Debug, Default)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn classify_text(&self, utterance: &str) -> Classification {
        let padded = format!(" {} ", normalize(utterance));
        let has_hex_id = !find_hex_ids(utterance).is_empty();

        RULES
            .iter()
            .filter(|rule| !rule.needs_hex_id || has_hex_id)
            .find(|rule| rule.keywords.iter().any(|keyword| padded.contains(keyword)))
            .map(|rule| Classification::new(rule.intent, 0.85))
            .unwrap_or_else(|| Classification::new(Intent::Help, 0.2))
    }
}

#[async_trait]
impl IntentClassifier for RuleBasedClassifier {
    async fn classify(&self, input: &ClassifierInput<'_>) -> Result<Classification, DialogueError> {
        Ok(self.classify_text(input.utterance))
    }
}

/// Asks a language model for `{"intent": "<tag>", "confidence": 0..1}`.
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn prompt(input: &ClassifierInput<'_>) -> String {
        let tags: Vec<&str> = Intent::ALL.iter().map(Intent::as_str).collect();
        let history: Vec<String> = input
            .history
            .iter()
            .map(|turn| format!("{}: {}", turn.speaker.as_str(), turn.text))
            .collect();

        format!(
            "Classify the user's latest message for an exam administration assistant.\n\
             Allowed intents: {}.\n\
             Recent conversation:\n{}\n\
             Latest message: {}\n\
             Reply with JSON only: {{\"intent\": \"<one allowed intent>\", \"confidence\": <0..1>}}",
            tags.join(", "),
            history.join("\n"),
            input.utterance
        )
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, input: &ClassifierInput<'_>) -> Result<Classification, DialogueError> {
        let reply = self
            .client
            .complete(&Self::prompt(input))
            .await
            .map_err(|error| DialogueError::ClassificationFailure(error.to_string()))?;
        let value = parse_json_reply(&reply).map_err(DialogueError::ClassificationFailure)?;

        let tag = value["intent"].as_str().unwrap_or_default();
        let intent = Intent::parse(tag).ok_or_else(|| {
            DialogueError::ClassificationFailure(format!("unknown intent tag `{tag}`"))
        })?;
        let confidence = value["confidence"].as_f64().map_or(0.8, |confidence| confidence as f32);

        Ok(Classification::new(intent, confidence.clamp(0.0, 1.0)))
    }
}

/// Classifies one turn, never failing.
///
/// A turn that answers a pending question keeps the prior intent without
/// consulting the classifier, unless it reads as a new request (see
/// [`interrupting_request`]). Errors and low-confidence answers fall back to `Help`.
pub async fn classify_turn(
    classifier: &dyn IntentClassifier,
    input: &ClassifierInput<'_>,
    prior_intent: Option<Intent>,
    min_confidence: f32,
) -> Classification {
    if input.signal.is_continuation {
        if let Some(intent) = input.signal.intent.or(prior_intent) {
            if input.signal.expected_field.is_some() {
                if let Some(request) = interrupting_request(input.utterance, intent) {
                    info!(
                        event_name = "agent.classification.interrupted",
                        from = intent.as_str(),
                        to = request.intent.as_str(),
                        "new request replaces the flow in progress"
                    );
                    return request;
                }
            }
            debug!(
                event_name = "agent.classification.continued",
                intent = intent.as_str(),
                "keeping the intent of the flow in progress"
            );
            return Classification { intent, confidence: 1.0, continued: true };
        }
    }

    match classifier.classify(input).await {
        Ok(classification) if classification.confidence >= min_confidence => classification,
        Ok(classification) => {
            warn!(
                event_name = "agent.classification.fallback",
                reason = "low_confidence",
                intent = classification.intent.as_str(),
                confidence = f64::from(classification.confidence),
                "classifier confidence below threshold, falling back to help"
            );
            Classification::fallback()
        }
        Err(error) => {
            warn!(
                event_name = "agent.classification.fallback",
                reason = "classifier_error",
                error = %error,
                "classifier output unusable, falling back to help"
            );
            Classification::fallback()
        }
    }
}

/// "list exams" while a last name is awaited is a new request, not a surname.
/// It takes a leading request verb plus a keyword hit for another intent that
/// calls the backend.
fn interrupting_request(utterance: &str, current: Intent) -> Option<Classification> {
    let normalized = normalize(utterance);
    let verb = normalized.split_whitespace().next()?;
    if !REQUEST_VERBS.contains(&verb) {
        return None;
    }
    let classification = RuleBasedClassifier.classify_text(utterance);
    (classification.intent != current && classification.intent.dispatches())
        .then_some(classification)
}
