//! Decides whether a turn answers the assistant's previous question.
//!
//! Explicit session state (`awaiting_field`, `AwaitingSelection`) wins. The
//! phrase registry is only consulted when that state is absent, e.g. for a
//! session persisted by something other than this engine.

use examdesk_core::domain::{Intent, Session, SlotField};

use crate::phrases::{match_phrase, Expectation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalSource {
    SessionState,
    PhraseRegistry,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionState => "session_state",
            Self::PhraseRegistry => "phrase_registry",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContinuationSignal {
    pub is_continuation: bool,
    pub expected_field: Option<SlotField>,
    pub awaiting_selection: bool,
    /// Intent of the flow being continued, when known.
    pub intent: Option<Intent>,
    pub source: Option<SignalSource>,
}

impl ContinuationSignal {
    pub fn none() -> Self {
        Self::default()
    }

    fn field(field: SlotField, intent: Option<Intent>, source: SignalSource) -> Self {
        Self {
            is_continuation: true,
            expected_field: Some(field),
            awaiting_selection: false,
            intent,
            source: Some(source),
        }
    }

    fn selection(intent: Option<Intent>, source: SignalSource) -> Self {
        Self {
            is_continuation: true,
            expected_field: None,
            awaiting_selection: true,
            intent,
            source: Some(source),
        }
    }
}

pub fn detect(session: &Session) -> ContinuationSignal {
    if session.is_awaiting_selection() {
        let intent = session
            .last_operation_result
            .as_ref()
            .map(|result| result.intent())
            .or(session.current_intent);
        return ContinuationSignal::selection(intent, SignalSource::SessionState);
    }

    if let Some(field) = session.awaiting_field {
        return ContinuationSignal::field(field, session.current_intent, SignalSource::SessionState);
    }

    let Some(message) = session.last_assistant_message() else {
        return ContinuationSignal::none();
    };
    let Some(phrase) = match_phrase(message) else {
        return ContinuationSignal::none();
    };
    let intent = session.current_intent.or(phrase.intent);

    match phrase.expects {
        Expectation::Field(field) => {
            ContinuationSignal::field(field, intent, SignalSource::PhraseRegistry)
        }
        // A selection prompt is only answerable while its candidates are still around.
        Expectation::Selection
            if session.last_operation_result.as_ref().is_some_and(|result| result.is_ambiguous()) =>
        {
            ContinuationSignal::selection(intent, SignalSource::PhraseRegistry)
        }
        Expectation::Selection => ContinuationSignal::none(),
    }
}
