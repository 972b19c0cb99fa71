//! Action execution: runs one automation's action list against the store and
//! the outbound transports.
//!
//! Actions run strictly in order and each sees the card as left by the ones
//! before it. A failing action is recorded and the next one still runs.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use transport::{EmailMessage, EmailTransport, SmsMessage, SmsTransport, TransportError};

use crate::conditions::{coerce, CardFieldLookup, FieldLookup};
use crate::config::EngineConfig;
use crate::error::ActionError;
use crate::event::ActionResult;
use crate::models::{Action, Automation, Card, Channel, EmailTemplate, Form, MessageLog, Pipe};
use crate::placeholder::{form_link, PlaceholderContext, PlaceholderResolver};
use crate::store::BoardStore;

/// Result of running one automation's actions.
#[derive(Debug, Default)]
pub struct ActionOutcome {
    pub results: Vec<ActionResult>,
    /// Every stage the card entered, in move order. Same-stage moves are not
    /// listed.
    pub entered: Vec<String>,
}

/// What one `move_card` did. Serialised as the action's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMove {
    pub from_stage_id: String,
    pub to_stage_id: String,
    pub moved: bool,
}

pub struct ActionExecutor {
    store: Arc<dyn BoardStore>,
    email: Arc<dyn EmailTransport>,
    sms: Arc<dyn SmsTransport>,
    resolver: PlaceholderResolver,
    config: EngineConfig,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<dyn BoardStore>,
        email: Arc<dyn EmailTransport>,
        sms: Arc<dyn SmsTransport>,
        config: EngineConfig,
    ) -> Self {
        Self {
            resolver: PlaceholderResolver::from_config(&config),
            store,
            email,
            sms,
            config,
        }
    }

    /// Run every action of `automation` in order. `card` is kept in step with
    /// what was persisted. `form_id` is the form of the triggering event, if
    /// any, and feeds `{{form_name}}`.
    pub async fn execute(
        &self,
        automation: &Automation,
        pipe: &Pipe,
        card: &mut Card,
        form_id: Option<&str>,
    ) -> ActionOutcome {
        let mut outcome = ActionOutcome::default();

        for action in &automation.actions {
            let kind = action.kind();
            let result = match action {
                Action::MoveCard { target_stage_id } => {
                    self.move_card(pipe, card, target_stage_id).await.map(|mv| {
                        if mv.moved {
                            outcome.entered.push(mv.to_stage_id.clone());
                        }
                        Some(json!(mv))
                    })
                }
                Action::SendEmail { template_id, recipient_field } => self
                    .send_email(pipe, card, form_id, template_id, recipient_field.as_deref())
                    .await
                    .map(Some),
                Action::SendFormLink { form_id: link_form, template_id, recipient_field } => self
                    .send_form_link(pipe, card, link_form, template_id.as_deref(), recipient_field.as_deref())
                    .await
                    .map(Some),
                Action::SendSms { template_id, recipient_field } => self
                    .send_sms(pipe, card, form_id, template_id, recipient_field.as_deref())
                    .await
                    .map(Some),
                Action::UpdateField { field_key, value } => self
                    .update_field(pipe, card, form_id, field_key, value)
                    .await
                    .map(Some),
            };

            match result {
                Ok(output) => outcome.results.push(ActionResult::success(kind, output)),
                Err(e) => {
                    warn!(
                        automation = %automation.name,
                        card_id = %card.id,
                        action = kind,
                        "action failed: {e}"
                    );
                    outcome.results.push(ActionResult::error(kind, e));
                }
            }
        }

        outcome
    }

    // -----------------------------------------------------------------------
    // move_card
    // -----------------------------------------------------------------------

    async fn move_card(&self, pipe: &Pipe, card: &mut Card, target: &str) -> Result<StageMove, ActionError> {
        if pipe.stage(target).is_none() {
            return Err(ActionError::StageNotInPipe(target.to_string()));
        }

        let mut mv = StageMove {
            from_stage_id: card.stage_id.clone(),
            to_stage_id: target.to_string(),
            moved: false,
        };
        if mv.from_stage_id == target {
            return Ok(mv);
        }

        card.updated_at = self.store.update_card_stage(&card.id, target).await?;
        card.stage_id = target.to_string();
        mv.moved = true;
        info!(card_id = %card.id, from = %mv.from_stage_id, to = %target, "card moved");

        Ok(mv)
    }

    // -----------------------------------------------------------------------
    // send_email / send_form_link
    // -----------------------------------------------------------------------

    async fn send_email(
        &self,
        pipe: &Pipe,
        card: &Card,
        form_id: Option<&str>,
        template_id: &str,
        recipient_field: Option<&str>,
    ) -> Result<Value, ActionError> {
        let template = pipe
            .email_template(template_id)
            .ok_or_else(|| ActionError::TemplateNotFound(template_id.to_string()))?;

        let form_name = form_id.and_then(|id| pipe.form(id)).map(|f| f.name.as_str());
        let ctx = self.context(pipe, card, form_name, None);

        let to = self.recipient(card, recipient_field, template.to_email.as_deref(), &ctx)?;
        let subject = format!("{} [#{}]", self.resolver.resolve(&template.subject, &ctx), card.id);
        let body = self.resolver.resolve(&template.body, &ctx);

        self.deliver_email(template, &ctx, to, subject, body, card).await
    }

    async fn send_form_link(
        &self,
        pipe: &Pipe,
        card: &Card,
        form_id: &str,
        template_id: Option<&str>,
        recipient_field: Option<&str>,
    ) -> Result<Value, ActionError> {
        let form = pipe
            .form(form_id)
            .ok_or_else(|| ActionError::FormNotFound(form_id.to_string()))?;
        let link = form_link(self.resolver.base_url(), &card.id, &form.id);
        let ctx = self.context(pipe, card, Some(&form.name), Some(&link));

        let template = match template_id {
            Some(id) => Some(
                pipe.email_template(id)
                    .ok_or_else(|| ActionError::TemplateNotFound(id.to_string()))?,
            ),
            None => None,
        };

        let default_template;
        let template = match template {
            Some(t) => t,
            None => {
                default_template = default_form_link_template(form);
                &default_template
            }
        };

        let to = self.recipient(card, recipient_field, template.to_email.as_deref(), &ctx)?;
        let subject = self.resolver.resolve(&template.subject, &ctx);
        let body = self.resolver.resolve(&template.body, &ctx);

        let mut output = self.deliver_email(template, &ctx, to, subject, body, card).await?;
        output["formLink"] = Value::String(link);
        Ok(output)
    }

    async fn deliver_email(
        &self,
        template: &EmailTemplate,
        ctx: &PlaceholderContext<'_>,
        to: String,
        subject: String,
        body: String,
        card: &Card,
    ) -> Result<Value, ActionError> {
        let optional = |s: &Option<String>| {
            s.as_deref()
                .map(|v| self.resolver.resolve(v, ctx))
                .filter(|v| !v.trim().is_empty())
        };

        let message = EmailMessage {
            to,
            from: optional(&template.from_email).unwrap_or_else(|| self.config.default_from_email.clone()),
            from_name: optional(&template.from_name).or_else(|| self.config.default_from_name.clone()),
            cc: optional(&template.cc),
            bcc: optional(&template.bcc),
            subject,
            body,
            card_id: card.id.clone(),
        };

        self.bounded(self.email.send_email(&message)).await?;
        info!(card_id = %card.id, to = %message.to, "email sent");

        self.log(MessageLog {
            id: Uuid::new_v4().to_string(),
            card_id: card.id.clone(),
            channel: Channel::Email,
            recipient: message.to.clone(),
            subject: Some(message.subject.clone()),
            body: message.body.clone(),
            provider_id: None,
            status: "sent".into(),
            created_at: Utc::now(),
        })
        .await;

        Ok(json!({ "to": message.to, "subject": message.subject }))
    }

    // -----------------------------------------------------------------------
    // send_sms
    // -----------------------------------------------------------------------

    async fn send_sms(
        &self,
        pipe: &Pipe,
        card: &Card,
        form_id: Option<&str>,
        template_id: &str,
        recipient_field: Option<&str>,
    ) -> Result<Value, ActionError> {
        let template = pipe
            .sms_template(template_id)
            .ok_or_else(|| ActionError::TemplateNotFound(template_id.to_string()))?;

        let form_name = form_id.and_then(|id| pipe.form(id)).map(|f| f.name.as_str());
        let ctx = self.context(pipe, card, form_name, None);

        let message = SmsMessage {
            to: self.recipient(card, recipient_field, template.to_phone.as_deref(), &ctx)?,
            body: self.resolver.resolve(&template.body, &ctx),
            card_id: card.id.clone(),
        };

        let receipt = self.bounded(self.sms.send_sms(&message)).await?;
        info!(card_id = %card.id, to = %message.to, status = %receipt.status, "sms sent");

        self.log(MessageLog {
            id: Uuid::new_v4().to_string(),
            card_id: card.id.clone(),
            channel: Channel::Sms,
            recipient: message.to.clone(),
            subject: None,
            body: message.body.clone(),
            provider_id: receipt.provider_id.clone(),
            status: receipt.status.clone(),
            created_at: Utc::now(),
        })
        .await;

        Ok(json!({
            "to": message.to,
            "providerId": receipt.provider_id,
            "status": receipt.status,
        }))
    }

    // -----------------------------------------------------------------------
    // update_field
    // -----------------------------------------------------------------------

    async fn update_field(
        &self,
        pipe: &Pipe,
        card: &mut Card,
        form_id: Option<&str>,
        key: &str,
        value: &Value,
    ) -> Result<Value, ActionError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ActionError::InvalidConfig("update_field has an empty field key".into()));
        }

        let value = match value {
            Value::String(s) => {
                let form_name = form_id.and_then(|id| pipe.form(id)).map(|f| f.name.as_str());
                let ctx = self.context(pipe, card, form_name, None);
                Value::String(self.resolver.resolve(s, &ctx))
            }
            other => other.clone(),
        };

        let stored = self.store.upsert_card_field(&card.id, key, &value).await?;
        card.set_field(stored.key.clone(), stored.value.clone());

        Ok(json!({ "fieldKey": stored.key, "value": stored.value }))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn context<'a>(
        &self,
        pipe: &'a Pipe,
        card: &'a Card,
        form_name: Option<&'a str>,
        link: Option<&'a str>,
    ) -> PlaceholderContext<'a> {
        PlaceholderContext {
            card: Some(card),
            stage_name: pipe.stage(&card.stage_id).map(|s| s.name.as_str()),
            pipe_name: Some(&pipe.name),
            form_name,
            form_link: link,
            global_variables: &pipe.global_variables,
            client_forms: &pipe.forms,
        }
    }

    /// The card field named by `field` if it holds something, else the
    /// template's own recipient (placeholders resolved).
    fn recipient(
        &self,
        card: &Card,
        field: Option<&str>,
        fallback: Option<&str>,
        ctx: &PlaceholderContext<'_>,
    ) -> Result<String, ActionError> {
        let from_field = field
            .filter(|k| !k.trim().is_empty())
            .and_then(|k| CardFieldLookup::new(card).value(k))
            .map(|v| coerce(&v).trim().to_string())
            .filter(|v| !v.is_empty());
        if let Some(to) = from_field {
            return Ok(to);
        }

        let from_template = fallback
            .map(|t| self.resolver.resolve(t, ctx).trim().to_string())
            .filter(|v| !v.is_empty() && !v.contains("{{"));
        if let Some(to) = from_template {
            return Ok(to);
        }

        Err(ActionError::NoRecipient(match field {
            Some(k) => format!("field '{k}' is empty and the template has no recipient"),
            None => "the template has no recipient".into(),
        }))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        let limit = self.config.transport_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| TransportError::Timeout(limit.as_millis() as u64))?
    }

    /// The message already went out; a failed log write does not fail the action.
    async fn log(&self, entry: MessageLog) {
        if let Err(e) = self.store.log_message(&entry).await {
            warn!(card_id = %entry.card_id, "failed to log {} message: {e}", entry.channel.as_str());
        }
    }
}

fn default_form_link_template(form: &Form) -> EmailTemplate {
    EmailTemplate::new(
        format!("default-form-link-{}", form.id),
        "Please complete: {{form_name}}",
        "<p>Hello,</p>\
         <p>Please fill out the form <strong>{{form_name}}</strong> for {{card_title}}:</p>\
         <p><a href=\"{{form.link}}\">{{form.link}}</a></p>",
    )
}
