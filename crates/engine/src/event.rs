//! Inbound events and the report a dispatch hands back to its caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::models::TriggerKind;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
}

/// An event as it arrives over the wire. Every field is optional here so that
/// a missing one is reported as [`EngineError::InvalidEvent`] rather than a
/// deserialisation failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default)]
    pub trigger_type: Option<String>,
    #[serde(default)]
    pub card_id: Option<String>,
    #[serde(default)]
    pub pipe_id: Option<String>,
    #[serde(default)]
    pub context: EventContext,
}

/// A validated event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: TriggerKind,
    pub card_id: String,
    pub pipe_id: String,
    pub context: EventContext,
}

impl Event {
    pub fn new(kind: TriggerKind, pipe_id: impl Into<String>, card_id: impl Into<String>) -> Self {
        Self {
            kind,
            card_id: card_id.into(),
            pipe_id: pipe_id.into(),
            context: EventContext::default(),
        }
    }

    pub fn with_stage(mut self, stage_id: impl Into<String>) -> Self {
        self.context.stage_id = Some(stage_id.into());
        self
    }

    pub fn with_form(mut self, form_id: impl Into<String>) -> Self {
        self.context.form_id = Some(form_id.into());
        self
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, EngineError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EngineError::InvalidEvent(format!("missing {name}"))),
    }
}

impl TryFrom<EventPayload> for Event {
    type Error = EngineError;

    fn try_from(payload: EventPayload) -> Result<Self, Self::Error> {
        let kind = required(payload.trigger_type, "triggerType")?
            .parse::<TriggerKind>()
            .map_err(EngineError::InvalidEvent)?;
        let card_id = required(payload.card_id, "cardId")?;
        let pipe_id = required(payload.pipe_id, "pipeId")?;

        // Blank context ids mean "not given".
        let context = EventContext {
            stage_id: payload.context.stage_id.filter(|s| !s.trim().is_empty()),
            form_id: payload.context.form_id.filter(|s| !s.trim().is_empty()),
        };

        Ok(Self { kind, card_id, pipe_id, context })
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Error,
}

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Action type, e.g. `send_email`.
    pub action: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl ActionResult {
    pub fn success(action: &str, output: Option<Value>) -> Self {
        Self { action: action.to_string(), status: ActionStatus::Success, error: None, output }
    }

    pub fn error(action: &str, error: impl ToString) -> Self {
        Self {
            action: action.to_string(),
            status: ActionStatus::Error,
            error: Some(error.to_string()),
            output: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ActionStatus::Error
    }
}

/// One automation whose actions were run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRun {
    pub automation_id: String,
    pub name: String,
    /// 0 for the original event, n for the n-th cascade hop.
    pub depth: u32,
    pub actions: Vec<ActionResult>,
}

impl AutomationRun {
    /// Errors of the failed actions, joined with `"; "`, if any failed.
    pub fn failure(&self) -> Option<String> {
        let errors: Vec<&str> = self
            .actions
            .iter()
            .filter(|a| a.is_error())
            .filter_map(|a| a.error.as_deref())
            .collect();
        (!errors.is_empty()).then(|| errors.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAutomation {
    pub name: String,
    pub error: String,
}

/// A `card_enters_stage` follow-up that ran because an action moved the card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeStep {
    pub depth: u32,
    pub stage_id: String,
    pub automations_executed: Vec<String>,
}

/// Aggregate result of one dispatch, cascades included.
///
/// Every automation whose actions were attempted is listed in
/// `automations_executed`; those with at least one failed action are also
/// listed in `automations_failed`. `success` is false only when the dispatch
/// itself could not run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub success: bool,
    pub automations_found: usize,
    pub automations_matched: usize,
    pub automations_executed: Vec<String>,
    pub automations_failed: Vec<FailedAutomation>,
    /// Matched, but their conditions did not hold.
    pub automations_skipped: Vec<String>,
    pub cascaded: Vec<CascadeStep>,
    pub runs: Vec<AutomationRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for DispatchReport {
    fn default() -> Self {
        Self {
            success: true,
            automations_found: 0,
            automations_matched: 0,
            automations_executed: Vec::new(),
            automations_failed: Vec::new(),
            automations_skipped: Vec::new(),
            cascaded: Vec::new(),
            runs: Vec::new(),
            cascade_error: None,
            error: None,
        }
    }
}

impl DispatchReport {
    pub fn failed(error: &EngineError) -> Self {
        Self { success: false, error: Some(error.to_string()), ..Self::default() }
    }

    pub(crate) fn record_run(&mut self, run: AutomationRun) {
        self.automations_executed.push(run.name.clone());
        if let Some(error) = run.failure() {
            self.automations_failed.push(FailedAutomation { name: run.name.clone(), error });
        }
        self.runs.push(run);
    }
}
