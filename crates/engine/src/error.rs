//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the automation engine (validation + dispatch).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Dispatch errors ------

    /// The event is missing a required field or is otherwise unusable.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("pipe not found: {0}")]
    PipeNotFound(String),

    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("automation not found: {0}")]
    AutomationNotFound(String),

    /// A chain of `card_enters_stage` follow-ups hit the configured bound.
    /// Recorded in the dispatch report, never returned.
    #[error("cascade limit of {limit} exceeded entering stage {stage_id}")]
    CascadeLimitExceeded { limit: u32, stage_id: String },

    /// The card already has a submission for this form.
    #[error("form {form_id} already submitted for card {card_id}")]
    DuplicateSubmission { card_id: String, form_id: String },

    // ------ Save-time validation errors ------

    /// An automation definition failed validation.
    #[error("automation '{automation}' is invalid: {reason}")]
    InvalidAutomation { automation: String, reason: String },

    /// Two automations in a pipe share an id.
    #[error("duplicate automation ID: '{0}'")]
    DuplicateAutomationId(String),

    /// Two stages of a pipe share a position.
    #[error("stages '{first}' and '{second}' share position {position}")]
    DuplicateStagePosition {
        first: String,
        second: String,
        position: i32,
    },

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single action failed. Recorded against that action only.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Form not found: {0}")]
    FormNotFound(String),

    #[error("Stage {0} does not belong to this pipe")]
    StageNotInPipe(String),

    /// The stored action config cannot be executed.
    #[error("Invalid action config: {0}")]
    InvalidConfig(String),

    /// Neither the card field nor the template supplied a recipient.
    #[error("No recipient: {0}")]
    NoRecipient(String),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A malformed condition rule. Evaluation treats it as "not met".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("rule has an empty field key")]
    EmptyFieldKey,
}

/// Errors surfaced by a [`crate::store::BoardStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// A conditional write lost (e.g. a second submission of the same form).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored JSON did not decode into the domain type.
    #[error("malformed stored {what}: {message}")]
    Malformed { what: &'static str, message: String },

    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
