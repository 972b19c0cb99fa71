//! The persistence seam the engine reads and writes board state through.
//!
//! Everything is read fresh per call; implementations must not cache pipe or
//! automation definitions between dispatches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::StoreError;
use crate::models::{Automation, Card, CardField, FormSubmission, MessageLog, NewFormSubmission, Pipe};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait BoardStore: Send + Sync {
    /// Pipe with stages, forms, automations, templates and global variables.
    async fn get_pipe_with_automations(&self, pipe_id: &str) -> Result<Option<Pipe>, StoreError>;

    /// Card with fields and form submissions (newest first).
    async fn get_card(&self, card_id: &str) -> Result<Option<Card>, StoreError>;

    /// Move the card; returns the new `updated_at`.
    async fn update_card_stage(&self, card_id: &str, stage_id: &str) -> Result<DateTime<Utc>, StoreError>;

    async fn upsert_card_field(&self, card_id: &str, key: &str, value: &Value) -> Result<CardField, StoreError>;

    /// Conditional write: fails with [`StoreError::Conflict`] if the card
    /// already has a submission for the form, and with
    /// [`StoreError::NotFound`] if the card is missing or the form is not part
    /// of the card's pipe.
    async fn create_form_submission(&self, submission: &NewFormSubmission) -> Result<FormSubmission, StoreError>;

    async fn log_message(&self, log: &MessageLog) -> Result<(), StoreError>;

    async fn list_messages(&self, card_id: &str) -> Result<Vec<MessageLog>, StoreError>;

    /// Insert or replace an automation definition of `pipe_id`.
    async fn save_automation(&self, pipe_id: &str, automation: &Automation) -> Result<(), StoreError>;

    async fn delete_automation(&self, pipe_id: &str, automation_id: &str) -> Result<(), StoreError>;

    /// Persist a whole pipe definition (used by duplication). Cards are not
    /// part of the definition.
    async fn insert_pipe(&self, pipe: &Pipe) -> Result<(), StoreError>;
}
