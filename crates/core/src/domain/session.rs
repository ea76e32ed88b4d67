use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intent::Intent;
use crate::domain::operation::OperationResult;
use crate::domain::slots::{SlotField, Slots};
use crate::flows::DialogueState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Accumulated state of one conversation thread.
///
/// `turns` is append-only. `slots` only change when a turn supplies a new
/// non-empty value for a field, or when the session is reset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub turns: Vec<Turn>,
    pub current_intent: Option<Intent>,
    pub slots: Slots,
    pub missing_fields: Vec<SlotField>,
    pub last_operation_result: Option<OperationResult>,
    pub derived_cache: BTreeMap<String, String>,
    pub state: DialogueState,
    /// Field the last assistant prompt asked for, if any.
    pub awaiting_field: Option<SlotField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            current_intent: None,
            slots: Slots::new(),
            missing_fields: Vec::new(),
            last_operation_result: None,
            derived_cache: BTreeMap::new(),
            state: DialogueState::Collecting,
            awaiting_field: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_user_turn(&mut self, text: impl Into<String>) {
        self.push_turn(Speaker::User, text.into());
    }

    pub fn record_assistant_turn(&mut self, text: impl Into<String>) {
        self.push_turn(Speaker::Assistant, text.into());
    }

    fn push_turn(&mut self, speaker: Speaker, text: String) {
        let at = Utc::now();
        self.turns.push(Turn { speaker, text, at });
        self.updated_at = at;
    }

    pub fn last_assistant_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.speaker == Speaker::Assistant)
            .map(|turn| turn.text.as_str())
    }

    /// The last `window` turns, oldest first.
    pub fn recent_turns(&self, window: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    pub fn is_awaiting_selection(&self) -> bool {
        self.state == DialogueState::AwaitingSelection
            && self.last_operation_result.as_ref().is_some_and(OperationResult::is_ambiguous)
    }

    pub fn cached(&self, key: &str) -> Option<&str> {
        self.derived_cache.get(key).map(String::as_str)
    }

    /// Destructive overwrite of everything but the id.
    pub fn reset(&mut self) {
        let session_id = std::mem::take(&mut self.session_id);
        *self = Self::new(session_id);
    }
}
