//! Dialogue engine for ExamBuilder administration.
//!
//! `AgentRuntime::handle_turn` takes one user utterance for a session and
//! returns the assistant's reply. Per turn:
//! 1. **Continuity** (`continuity`) - is this an answer to the last question?
//! 2. **Classification** (`classifier`) - which intent, unless continuing
//! 3. **Extraction** (`extractor`) - slot values, merged into session memory
//! 4. **Validation** (`validator`) - which required fields are still pending
//! 5. **Dispatch** (`dispatcher`) - ordered backend steps via the `tools` registry
//! 6. **Rendering** (`renderer`) - one reply, with prompts from `phrases`
//!
//! Sessions live in `store`, one lock per session id.
//!
//! The language model, when configured, only classifies and extracts. It never
//! decides which backend calls run or what they return.

pub mod classifier;
pub mod continuity;
pub mod dispatcher;
pub mod extractor;
pub mod llm;
pub mod matching;
pub mod phrases;
pub mod renderer;
pub mod runtime;
pub mod store;
pub mod tools;
pub mod validator;

pub use runtime::{AgentRuntime, RuntimeSettings};
pub use store::SessionStore;
pub use tools::{Operation, OperationParams, OperationRegistry, OperationResponse};
