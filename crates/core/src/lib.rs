pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use chrono;
pub use domain::{Intent, OperationResult, Session, SlotField, Slots};
pub use errors::{ApplicationError, DialogueError, DomainError, InterfaceError};
