//! `engine` crate: board domain model and the automation engine.
//!
//! Leaves first: placeholder resolution, condition evaluation, trigger
//! matching, action execution, and the orchestrator that ties them together
//! and runs cascades. Persistence is reached only through [`BoardStore`].

pub mod models;
pub mod error;
pub mod config;
pub mod placeholder;
pub mod conditions;
pub mod triggers;
pub mod event;
pub mod store;
pub mod actions;
pub mod orchestrator;
pub mod validate;
pub mod duplicate;

pub use config::EngineConfig;
pub use error::{ActionError, ConditionError, EngineError, StoreError};
pub use event::{ActionResult, DispatchReport, Event, EventPayload};
pub use models::{Action, Automation, Card, Pipe, Trigger, TriggerKind};
pub use orchestrator::{Orchestrator, SubmissionOutcome};
pub use placeholder::PlaceholderResolver;
pub use store::{BoardStore, MemoryStore, PgStore};
pub use validate::{validate_automation, validate_pipe};

#[cfg(test)]
mod orchestrator_tests;
