use std::sync::Arc;

use anyhow::Result;
use examdesk_core::config::AppConfig;
use examdesk_core::domain::{
    AmbiguityReason, Intent, OperationResult, Session, SlotField, Slots,
};
use examdesk_core::flows::{DialogueFlow, DialogueState, FlowContext, FlowEngine, FlowEvent};
use examdesk_db::SessionRepository;
use tracing::{debug, info, warn};

use crate::classifier::{classify_turn, ClassifierInput, IntentClassifier, LlmClassifier, RuleBasedClassifier};
use crate::continuity::{self, ContinuationSignal};
use crate::dispatcher::{known_exam_names, resolve_selection, DispatchRequest, Dispatcher, Selection};
use crate::extractor::{
    extract_turn, ExtractionInput, ExtractionSettings, LlmExtractor, RuleBasedExtractor,
    SlotExtractor,
};
use crate::llm::build_llm_client;
use crate::matching::normalize;
use crate::renderer::{render, render_result};
use crate::store::SessionStore;
use crate::tools::OperationRegistry;
use crate::validator::pending_fields;

const START_OVER_PHRASES: [&str; 6] =
    ["start over", "start again", "reset", "cancel", "never mind", "nevermind"];

const HELP_PHRASES: [&str; 3] = ["help", "help me", "what can you do"];

const START_OVER_REPLY: &str =
    "Okay, let's start over. What would you like to do? Say 'help' to see what I can do.";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RuntimeSettings {
    pub history_window: usize,
    pub min_confidence: f32,
    pub extraction: ExtractionSettings,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { history_window: 6, min_confidence: 0.5, extraction: ExtractionSettings::default() }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            history_window: config.dialogue.history_window,
            min_confidence: config.llm.min_confidence,
            extraction: ExtractionSettings {
                short_reply_max_words: config.dialogue.short_reply_max_words,
                fuzzy_max_distance: config.dialogue.fuzzy_max_distance,
            },
        }
    }
}

/// The dialogue engine behind every transport.
///
/// One call to `handle_turn` runs the whole pipeline for a session while
/// holding that session's lock: continuity check, classification, extraction,
/// validation, dispatch and rendering. It always produces a reply.
pub struct AgentRuntime {
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn SlotExtractor>,
    dispatcher: Dispatcher,
    store: SessionStore,
    settings: RuntimeSettings,
    flow: FlowEngine<DialogueFlow>,
}

impl AgentRuntime {
    /// Rule-based classification and extraction, in-memory sessions.
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        let settings = RuntimeSettings::default();
        Self {
            classifier: Arc::new(RuleBasedClassifier),
            extractor: Arc::new(RuleBasedExtractor::new(settings.extraction)),
            dispatcher: Dispatcher::new(registry, settings.extraction.fuzzy_max_distance),
            store: SessionStore::default(),
            settings,
            flow: FlowEngine::default(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        registry: OperationRegistry,
        repository: Option<Arc<dyn SessionRepository>>,
    ) -> Result<Self> {
        let settings = RuntimeSettings::from_config(config);
        let mut runtime = Self::new(Arc::new(registry))
            .with_settings(settings)
            .with_store(SessionStore::new(repository));

        runtime = match build_llm_client(&config.llm)? {
            Some(client) => runtime
                .with_classifier(Arc::new(LlmClassifier::new(client.clone())))
                .with_extractor(Arc::new(LlmExtractor::new(client))),
            None => runtime.with_extractor(Arc::new(RuleBasedExtractor::new(settings.extraction))),
        };

        info!(
            event_name = "agent.runtime.ready",
            llm_provider = ?config.llm.provider,
            operations = runtime.dispatcher.registry().len(),
            persistent_sessions = runtime.store.is_persistent(),
            "agent runtime ready"
        );
        Ok(runtime)
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SlotExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = store;
        self
    }

    /// The extractor keeps its own settings; pass a rebuilt one alongside if needed.
    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self.dispatcher =
            self.dispatcher.with_fuzzy_max_distance(settings.extraction.fuzzy_max_distance);
        self
    }

    pub fn settings(&self) -> RuntimeSettings {
        self.settings
    }

    pub fn operation_names(&self) -> Vec<&str> {
        self.dispatcher.registry().names()
    }

    pub async fn handle_turn(&self, session_id: &str, text: &str) -> String {
        let utterance = text.trim();
        info!(
            event_name = "agent.turn.received",
            session_id,
            chars = utterance.chars().count(),
            "turn received"
        );

        let mut session = self.store.lock(session_id).await;
        session.record_user_turn(utterance);

        let command = normalize(utterance);
        let reply = if START_OVER_PHRASES.contains(&command.as_str()) {
            self.start_over(&mut session)
        } else if HELP_PHRASES.contains(&command.as_str()) {
            // Answered in place; a pending question stays pending.
            render(Some(Intent::Help), &[], None, &session.slots)
        } else {
            let signal = continuity::detect(&session);
            if signal.is_continuation {
                info!(
                    event_name = "agent.turn.continuation",
                    session_id,
                    source = signal.source.map(|source| source.as_str()),
                    expected_field = signal.expected_field.map(|field| field.as_str()),
                    awaiting_selection = signal.awaiting_selection,
                    "turn continues the flow in progress"
                );
            }

            if signal.awaiting_selection {
                self.handle_selection(&mut session, utterance).await
            } else {
                self.handle_request(&mut session, utterance, &signal).await
            }
        };

        session.record_assistant_turn(reply.clone());
        self.store.save(&session).await;

        info!(
            event_name = "agent.turn.completed",
            session_id,
            intent = session.current_intent.map(|intent| intent.as_str()),
            state = session.state.as_str(),
            outcome = session.last_operation_result.as_ref().map(OperationResult::kind),
            "turn completed"
        );
        reply
    }

    /// Waits for any in-flight turn of the session, then clears everything but the id.
    pub async fn reset_session(&self, session_id: &str) {
        self.store.reset(session_id).await;
        info!(event_name = "agent.session.reset", session_id, "session reset");
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        self.store.snapshot(session_id).await
    }

    async fn handle_request(
        &self,
        session: &mut Session,
        utterance: &str,
        signal: &ContinuationSignal,
    ) -> String {
        let classification = {
            // The window ends before the turn being classified.
            let history = session.recent_turns(self.settings.history_window + 1);
            let history = &history[..history.len().saturating_sub(1)];
            let input = ClassifierInput { utterance, history, signal };
            classify_turn(
                self.classifier.as_ref(),
                &input,
                session.current_intent,
                self.settings.min_confidence,
            )
            .await
        };
        let intent = classification.intent;
        session.current_intent = Some(intent);

        if !intent.dispatches() {
            session.missing_fields.clear();
            session.awaiting_field = None;
            return render(Some(intent), &[], None, &session.slots);
        }

        // Only a turn that kept the flow's intent may fill the awaited field directly.
        let extraction_signal =
            if classification.continued { *signal } else { ContinuationSignal::none() };
        let known = known_exam_names(&session.derived_cache);
        let extraction = {
            let input = ExtractionInput {
                utterance,
                intent,
                signal: &extraction_signal,
                slots: &session.slots,
                known_exam_names: &known,
            };
            extract_turn(self.extractor.as_ref(), &input, self.settings.extraction).await
        };
        session.slots = extraction.slots;
        let pending = pending_fields(intent, &session.slots);
        session.missing_fields = pending.clone();

        if let Some(first) = pending.first() {
            self.advance(session, FlowEvent::FieldsMissing, &pending);
            session.awaiting_field = Some(*first);
            debug!(
                event_name = "agent.turn.fields_pending",
                intent = intent.as_str(),
                field = first.as_str(),
                pending = pending.len(),
                "asking for the next field"
            );
            return render(Some(intent), &pending, None, &session.slots);
        }

        self.advance(session, FlowEvent::SlotsCollected, &pending);
        self.dispatch(session, intent, &extraction.update, None).await
    }

    async fn handle_selection(&self, session: &mut Session, utterance: &str) -> String {
        let Some(previous) = session.last_operation_result.clone() else {
            return self.handle_request(session, utterance, &ContinuationSignal::none()).await;
        };
        let intent = previous.intent();
        session.current_intent = Some(intent);
        // A selection inferred from the phrase registry alone carries no explicit state.
        session.state = DialogueState::AwaitingSelection;

        match resolve_selection(utterance, &previous, self.settings.extraction.fuzzy_max_distance) {
            Some(selection) => {
                info!(
                    event_name = "agent.selection.resolved",
                    intent = intent.as_str(),
                    step = %selection.step,
                    candidate = %selection.candidate.label,
                    "selection resolved"
                );
                self.advance(session, FlowEvent::SelectionReceived, &[]);
                session.slots.set(SlotField::ExamName, selection.candidate.label.clone());
                self.dispatch(session, intent, &Slots::new(), Some(&selection)).await
            }
            None => {
                self.advance(session, FlowEvent::SelectionUnresolved, &[]);
                let reprompt = unmatched_selection(previous, utterance);
                let reply = render_result(&reprompt, &session.slots);
                session.last_operation_result = Some(reprompt);
                reply
            }
        }
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        intent: Intent,
        filters: &Slots,
        selection: Option<&Selection>,
    ) -> String {
        let slots = session.slots.clone();
        let request = DispatchRequest { intent, slots: &slots, filters, selection };
        let outcome = self.dispatcher.dispatch(&request, &mut session.derived_cache).await;

        if outcome.listed {
            self.advance(session, FlowEvent::CandidatesListed, &[]);
        }
        let event = match &outcome.result {
            OperationResult::Success { .. } => FlowEvent::OperationSucceeded,
            OperationResult::AlreadyExists { .. } => FlowEvent::AlreadyExists,
            OperationResult::Ambiguous { .. } => FlowEvent::MultipleCandidates,
            OperationResult::Failure { retry_field: Some(_), .. } => FlowEvent::FieldRejected,
            OperationResult::Failure { .. } => FlowEvent::OperationFailed,
        };
        self.advance(session, event, &[]);

        session.awaiting_field = match &outcome.result {
            OperationResult::Failure { retry_field, .. } => *retry_field,
            OperationResult::AlreadyExists { intent: Intent::CreateStudent, .. } => {
                Some(SlotField::AccountIdentifier)
            }
            _ => None,
        };
        session.missing_fields = session.awaiting_field.into_iter().collect();

        let reply = render_result(&outcome.result, &session.slots);
        session.last_operation_result = Some(outcome.result);
        reply
    }

    fn start_over(&self, session: &mut Session) -> String {
        self.advance(session, FlowEvent::ResetRequested, &[]);
        session.current_intent = None;
        session.slots.clear();
        session.missing_fields.clear();
        session.last_operation_result = None;
        session.awaiting_field = None;
        START_OVER_REPLY.to_string()
    }

    fn advance(&self, session: &mut Session, event: FlowEvent, missing: &[SlotField]) {
        let context = FlowContext { missing_required_fields: missing.to_vec() };
        match self.flow.apply(&session.state, &event, &context) {
            Ok(outcome) => {
                debug!(
                    event_name = "agent.flow.transition",
                    from = outcome.from.as_str(),
                    to = outcome.to.as_str(),
                    event = ?outcome.event,
                    "dialogue state changed"
                );
                session.state = outcome.to;
            }
            Err(error) => {
                warn!(
                    event_name = "agent.flow.rejected",
                    session_id = %session.session_id,
                    error = %error,
                    "unexpected dialogue transition, restarting collection"
                );
                session.state = DialogueState::Collecting;
            }
        }
    }
}

/// Same candidates, re-offered because the reply matched none of them.
fn unmatched_selection(previous: OperationResult, reply: &str) -> OperationResult {
    match previous {
        OperationResult::Ambiguous { intent, step, candidates, subject, .. } => {
            OperationResult::Ambiguous {
                intent,
                step,
                query: reply.to_string(),
                reason: AmbiguityReason::NoMatch,
                candidates,
                subject,
            }
        }
        other => other,
    }
}
