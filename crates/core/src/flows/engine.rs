use thiserror::Error;

use crate::domain::slots::SlotField;
use crate::flows::states::{DialogueState, FlowContext, FlowEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn transition(
        &self,
        current: &DialogueState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct DialogueFlow;

impl FlowDefinition for DialogueFlow {
    fn transition(
        &self,
        current: &DialogueState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_dialogue(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn apply(
        &self,
        current: &DialogueState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }
}

impl Default for FlowEngine<DialogueFlow> {
    fn default() -> Self {
        Self::new(DialogueFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before transition from {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: DialogueState, missing_fields: Vec<SlotField> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: DialogueState, event: FlowEvent },
}

fn transition_dialogue(
    current: &DialogueState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use DialogueState::{AwaitingSelection, Collecting, Done, Listing, Resolving};
    use FlowEvent::{
        AlreadyExists, CandidatesListed, FieldRejected, FieldsMissing, MultipleCandidates,
        OperationFailed, OperationSucceeded, ResetRequested, SelectionReceived,
        SelectionUnresolved, SlotsCollected,
    };

    let to = match (current, event) {
        (_, ResetRequested) => Collecting,
        (Collecting | Done | AwaitingSelection, FieldsMissing) => Collecting,
        (Collecting | Done | AwaitingSelection, SlotsCollected) => {
            if !context.missing_required_fields.is_empty() {
                return Err(FlowTransitionError::MissingRequiredFields {
                    state: *current,
                    missing_fields: context.missing_required_fields.clone(),
                });
            }
            Resolving
        }
        (Resolving, CandidatesListed) => Listing,
        (Resolving | Listing, MultipleCandidates) => AwaitingSelection,
        (AwaitingSelection, SelectionReceived) => Resolving,
        (AwaitingSelection, SelectionUnresolved) => AwaitingSelection,
        (Resolving | Listing, FieldRejected) => Collecting,
        (Resolving | Listing, OperationSucceeded | OperationFailed | AlreadyExists) => Done,
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event })
}
