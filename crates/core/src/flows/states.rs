use serde::{Deserialize, Serialize};

use crate::domain::slots::SlotField;

/// Where a session sits between two turns. Only `AwaitingSelection` survives a
/// dispatch; the other non-terminal states complete within one turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    #[default]
    Collecting,
    Resolving,
    Listing,
    AwaitingSelection,
    Done,
}

impl DialogueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Resolving => "resolving",
            Self::Listing => "listing",
            Self::AwaitingSelection => "awaiting_selection",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "collecting" => Some(Self::Collecting),
            "resolving" => Some(Self::Resolving),
            "listing" => Some(Self::Listing),
            "awaiting_selection" => Some(Self::AwaitingSelection),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    FieldsMissing,
    SlotsCollected,
    CandidatesListed,
    MultipleCandidates,
    SelectionReceived,
    SelectionUnresolved,
    FieldRejected,
    OperationSucceeded,
    OperationFailed,
    AlreadyExists,
    ResetRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<SlotField>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DialogueState,
    pub to: DialogueState,
    pub event: FlowEvent,
}
