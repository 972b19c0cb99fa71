//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models and carry no domain behaviour.
//! Domain types live in the `engine` crate; JSONB columns are kept as raw
//! `serde_json::Value` here and decoded there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// pipes / stages / forms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipeRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StageRow {
    pub id: String,
    pub pipe_id: String,
    pub name: String,
    pub position: i32,
    pub background_color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormRow {
    pub id: String,
    pub pipe_id: String,
    pub stage_id: Option<String>,
    pub name: String,
}

// ---------------------------------------------------------------------------
// cards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardRow {
    pub id: String,
    pub pipe_id: String,
    pub stage_id: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardFieldRow {
    pub card_id: String,
    pub key: String,
    pub field_type: String,
    pub value: serde_json::Value,
    pub position: i32,
}

/// A submission joined with its form's name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormSubmissionRow {
    pub id: String,
    pub card_id: String,
    pub form_id: String,
    pub form_name: String,
    pub responses: serde_json::Value,
    pub submitter_email: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// automations
// ---------------------------------------------------------------------------

/// A persisted automation. `trigger`, `conditions` and `actions` hold the
/// serialised domain types.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AutomationRow {
    pub id: String,
    pub pipe_id: String,
    /// `None` when the automation is attached to the pipe itself.
    pub owner_stage_id: Option<String>,
    pub name: String,
    pub enabled: bool,
    pub trigger: serde_json::Value,
    pub conditions: Option<serde_json::Value>,
    pub actions: serde_json::Value,
    pub position: i32,
}

// ---------------------------------------------------------------------------
// templates and variables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailTemplateRow {
    pub id: String,
    pub pipe_id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub to_email: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SmsTemplateRow {
    pub id: String,
    pub pipe_id: String,
    pub name: String,
    pub body: String,
    pub to_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GlobalVariableRow {
    pub pipe_id: String,
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// message_logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageLogRow {
    pub id: String,
    pub card_id: String,
    /// `email` or `sms`.
    pub channel: String,
    /// Always `sent` for automation-originated messages.
    pub direction: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub provider_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
