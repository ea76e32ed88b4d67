pub mod engine;
pub mod states;

pub use engine::{DialogueFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{DialogueState, FlowContext, FlowEvent, TransitionOutcome};
