//! ExamBuilder provider: the backend operations the dialogue engine dispatches to.
//!
//! `ExamBackend` is the typed seam. `ExamBuilderClient` talks to the hosted
//! instructor API, `InMemoryExamBuilder` serves a seeded demo catalog, and
//! `operations` adapts either one to the engine's named operation registry.

pub mod backend;
pub mod client;
pub mod demo;
pub mod error;
pub mod mapping;
pub mod operations;

pub use backend::ExamBackend;
pub use client::ExamBuilderClient;
pub use demo::InMemoryExamBuilder;
pub use error::ProviderError;
pub use operations::{register_backend, registry_from_config, BackendOperation, BackendOperationKind};
