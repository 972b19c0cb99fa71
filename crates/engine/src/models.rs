//! Core domain models for the board and its automations.
//!
//! These types are the source of truth for what a pipe, a card and an
//! automation look like in memory. Automation triggers, conditions and
//! actions serialise to/from the JSONB columns of the `automations` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

/// A workflow container, loaded together with everything automations need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipe {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// Client forms that can be sent to a card's contact.
    #[serde(default)]
    pub forms: Vec<Form>,
    /// Pipe- and stage-attached automations alike; see [`OwnerRef`].
    #[serde(default)]
    pub automations: Vec<Automation>,
    #[serde(default)]
    pub email_templates: Vec<EmailTemplate>,
    #[serde(default)]
    pub sms_templates: Vec<SmsTemplate>,
    #[serde(default)]
    pub global_variables: Vec<GlobalVariable>,
}

impl Pipe {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn form(&self, id: &str) -> Option<&Form> {
        self.forms.iter().find(|f| f.id == id)
    }

    /// Case-insensitive lookup, the way placeholders name forms.
    pub fn form_by_name(&self, name: &str) -> Option<&Form> {
        self.forms.iter().find(|f| f.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn email_template(&self, id: &str) -> Option<&EmailTemplate> {
        self.email_templates.iter().find(|t| t.id == id)
    }

    pub fn sms_template(&self, id: &str) -> Option<&SmsTemplate> {
        self.sms_templates.iter().find(|t| t.id == id)
    }

    pub fn automation(&self, id: &str) -> Option<&Automation> {
        self.automations.iter().find(|a| a.id == id)
    }
}

/// An ordered step within a pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    /// Display and dropdown order; unique within a pipe.
    pub position: i32,
    #[serde(default)]
    pub background_color: Option<String>,
}

impl Stage {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            background_color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: String,
    pub name: String,
    /// Stage the form is attached to, if any.
    #[serde(default)]
    pub stage_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// A unit of work moving through a pipe's stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub pipe_id: String,
    /// Current stage; mutable.
    pub stage_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub fields: Vec<CardField>,
    /// Newest first.
    #[serde(default)]
    pub form_submissions: Vec<FormSubmission>,
}

impl Card {
    /// Convenience constructor for tests and intake.
    pub fn new(
        id: impl Into<String>,
        pipe_id: impl Into<String>,
        stage_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            pipe_id: pipe_id.into(),
            stage_id: stage_id.into(),
            title: title.into(),
            description: None,
            created_at: now,
            updated_at: now,
            fields: Vec::new(),
            form_submissions: Vec::new(),
        }
    }

    /// Builder-style [`Card::set_field`].
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_field(key, value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&CardField> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Insert or overwrite a field in memory. New keys go last; the type is
    /// inferred from the new value either way.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) -> &CardField {
        let key = key.into();
        let idx = match self.fields.iter().position(|f| f.key == key) {
            Some(idx) => {
                let field = &mut self.fields[idx];
                field.field_type = FieldType::infer(&value);
                field.value = value;
                idx
            }
            None => {
                let position = self.fields.iter().map(|f| f.position + 1).max().unwrap_or(0);
                self.fields.push(CardField {
                    field_type: FieldType::infer(&value),
                    key,
                    value,
                    position,
                });
                self.fields.len() - 1
            }
        };
        &self.fields[idx]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    /// An uploaded file: an object carrying at least `url` and `name`.
    File,
}

impl FieldType {
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Number(_) => Self::Number,
            Value::Object(obj) if obj.contains_key("url") => Self::File,
            _ => Self::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "number" => Self::Number,
            "file" => Self::File,
            _ => Self::Text,
        }
    }
}

/// A key/value custom attribute on a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardField {
    /// Field label; unique per card.
    pub key: String,
    #[serde(default)]
    pub field_type: FieldType,
    pub value: Value,
    #[serde(default)]
    pub position: i32,
}

/// One completed instance of a form for a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: String,
    pub card_id: String,
    pub form_id: String,
    pub form_name: String,
    pub responses: Map<String, Value>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub submitter_email: Option<String>,
}

/// Input for recording a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFormSubmission {
    pub card_id: String,
    pub form_id: String,
    #[serde(default)]
    pub responses: Map<String, Value>,
    #[serde(default)]
    pub submitter_email: Option<String>,
}

// ---------------------------------------------------------------------------
// Templates and variables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    /// Fallback recipient when the card has none.
    #[serde(default)]
    pub to_email: Option<String>,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
}

impl EmailTemplate {
    pub fn new(id: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            subject: subject.into(),
            body: body.into(),
            from_email: None,
            from_name: None,
            to_email: None,
            cc: None,
            bcc: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsTemplate {
    pub id: String,
    pub name: String,
    pub body: String,
    /// Fallback recipient when the card has none.
    #[serde(default)]
    pub to_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

/// Where an automation is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum OwnerRef {
    Pipe(String),
    /// Only fires while the card is in (or entering) this stage.
    Stage(String),
}

/// The event kinds automations can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    FormSubmission,
    CardEntersStage,
    CardFieldValue,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormSubmission => "form_submission",
            Self::CardEntersStage => "card_enters_stage",
            Self::CardFieldValue => "card_field_value",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "form_submission"   => Ok(Self::FormSubmission),
            "card_enters_stage" => Ok(Self::CardEntersStage),
            "card_field_value"  => Ok(Self::CardFieldValue),
            "manual"            => Ok(Self::Manual),
            other               => Err(format!("unknown trigger type: {other}")),
        }
    }
}

/// What starts an automation, with its per-kind configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum Trigger {
    FormSubmission {
        /// `None` matches a submission of any form of the pipe.
        #[serde(default)]
        form_id: Option<String>,
    },
    CardEntersStage {
        stage_id: String,
    },
    /// Matches while the named field satisfies the comparison.
    CardFieldValue(ConditionRule),
    /// Never dispatched automatically; run on explicit request only.
    Manual,
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::FormSubmission { .. } => TriggerKind::FormSubmission,
            Self::CardEntersStage { .. } => TriggerKind::CardEntersStage,
            Self::CardFieldValue(_) => TriggerKind::CardFieldValue,
            Self::Manual => TriggerKind::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Logic {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Rules combined with AND/OR.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub rules: Vec<ConditionRule>,
}

/// One atomic comparison. `operator` stays a string so a stored rule with an
/// unknown operator still loads; it is rejected at save time and fails closed
/// at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub field_key: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

impl ConditionRule {
    pub fn new(field_key: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field_key: field_key.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// One step of an automation, executed in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum Action {
    MoveCard {
        target_stage_id: String,
    },
    SendEmail {
        template_id: String,
        #[serde(default)]
        recipient_field: Option<String>,
    },
    SendFormLink {
        form_id: String,
        #[serde(default)]
        template_id: Option<String>,
        #[serde(default)]
        recipient_field: Option<String>,
    },
    SendSms {
        template_id: String,
        #[serde(default)]
        recipient_field: Option<String>,
    },
    UpdateField {
        field_key: String,
        value: Value,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MoveCard { .. } => "move_card",
            Self::SendEmail { .. } => "send_email",
            Self::SendFormLink { .. } => "send_form_link",
            Self::SendSms { .. } => "send_sms",
            Self::UpdateField { .. } => "update_field",
        }
    }
}

/// A rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub owner: OwnerRef,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Option<ConditionGroup>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub position: i32,
}

fn enabled_default() -> bool {
    true
}

impl Automation {
    /// Convenience constructor for tests: enabled, pipe-attached, no conditions.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        pipe_id: impl Into<String>,
        trigger: Trigger,
        actions: Vec<Action>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            owner: OwnerRef::Pipe(pipe_id.into()),
            trigger,
            conditions: None,
            actions,
            position: 0,
        }
    }

    pub fn with_conditions(mut self, conditions: ConditionGroup) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn at_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }
}

// ---------------------------------------------------------------------------
// Message log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

/// A message the automation engine sent on behalf of a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: String,
    pub card_id: String,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub provider_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn automation_definition_deserializes_from_stored_json() {
        let raw = json!({
            "id": "a1",
            "name": "Welcome",
            "owner": { "type": "stage", "id": "S2" },
            "trigger": { "type": "card_enters_stage", "config": { "stage_id": "S2" } },
            "conditions": { "logic": "OR", "rules": [
                { "field_key": "status", "operator": "equals", "value": "approved" }
            ]},
            "actions": [
                { "type": "send_email", "config": { "template_id": "T1", "recipient_field": "email" } },
                { "type": "move_card", "config": { "target_stage_id": "S3" } }
            ]
        });

        let automation: Automation = serde_json::from_value(raw).expect("valid automation");
        assert!(automation.enabled);
        assert_eq!(automation.owner, OwnerRef::Stage("S2".into()));
        assert_eq!(automation.trigger.kind(), TriggerKind::CardEntersStage);
        assert_eq!(automation.conditions.unwrap().logic, Logic::Or);
        assert_eq!(automation.actions[1].kind(), "move_card");
    }

    #[test]
    fn manual_trigger_needs_no_config() {
        let trigger: Trigger = serde_json::from_value(json!({ "type": "manual" })).unwrap();
        assert_eq!(trigger, Trigger::Manual);
    }

    #[test]
    fn form_submission_trigger_without_form_matches_any() {
        let trigger: Trigger =
            serde_json::from_value(json!({ "type": "form_submission", "config": {} })).unwrap();
        assert_eq!(trigger, Trigger::FormSubmission { form_id: None });
    }

    #[test]
    fn set_field_overwrites_existing_key_in_place() {
        let mut card = Card::new("c1", "p1", "s1", "t")
            .with_field("email", "a@b.com")
            .with_field("amount", 10);
        card.set_field("email", json!("z@b.com"));
        assert_eq!(card.fields.len(), 2);
        assert_eq!(card.field("email").unwrap().value, json!("z@b.com"));
        assert_eq!(card.field("amount").unwrap().field_type, FieldType::Number);
        assert_eq!(card.field("amount").unwrap().position, 1);
    }

    #[test]
    fn overwriting_a_field_retypes_it() {
        let mut card = Card::new("c1", "p1", "s1", "t").with_field("score", "pending");
        assert_eq!(card.field("score").unwrap().field_type, FieldType::Text);

        card.set_field("score", json!(92));
        assert_eq!(card.field("score").unwrap().field_type, FieldType::Number);

        card.set_field("score", json!({ "url": "/f/a.pdf", "name": "a.pdf" }));
        assert_eq!(card.field("score").unwrap().field_type, FieldType::File);
    }

    #[test]
    fn form_lookup_by_name_ignores_case() {
        let mut pipe = Pipe::new("p1", "Sales");
        pipe.forms.push(Form { id: "f1".into(), name: "Onboarding".into(), stage_id: None });
        assert_eq!(pipe.form_by_name("onboarding").map(|f| f.id.as_str()), Some("f1"));
        assert!(pipe.form_by_name("other").is_none());
    }
}
