//! [`BoardStore`] over the `db` crate's Postgres repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use db::models::{
    AutomationRow, CardFieldRow, EmailTemplateRow, FormRow, FormSubmissionRow, GlobalVariableRow,
    MessageLogRow, PipeRow, SmsTemplateRow, StageRow,
};
use db::repository::{automations, cards, messages, pipes, submissions, templates};
use db::{DbError, DbPool};

use super::BoardStore;
use crate::error::StoreError;
use crate::models::{
    Automation, Card, CardField, Channel, EmailTemplate, FieldType, Form, FormSubmission,
    GlobalVariable, MessageLog, NewFormSubmission, OwnerRef, Pipe, SmsTemplate, Stage,
};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// `DbError::NotFound` becomes `Ok(None)`.
fn optional<T>(result: Result<T, DbError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(DbError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn not_found_as(what: &str, id: &str) -> impl FnOnce(DbError) -> StoreError {
    let label = format!("{what} {id}");
    move |e| match e {
        DbError::NotFound => StoreError::NotFound(label),
        DbError::Conflict(msg) => StoreError::Conflict(msg),
        other => StoreError::Database(other),
    }
}

fn malformed(what: &'static str, err: serde_json::Error) -> StoreError {
    StoreError::Malformed { what, message: err.to_string() }
}

// ---------------------------------------------------------------------------
// Row <-> domain conversion
// ---------------------------------------------------------------------------

fn automation_from_row(row: AutomationRow) -> Result<Automation, StoreError> {
    Ok(Automation {
        owner: match row.owner_stage_id {
            Some(stage_id) => OwnerRef::Stage(stage_id),
            None => OwnerRef::Pipe(row.pipe_id),
        },
        trigger: serde_json::from_value(row.trigger).map_err(|e| malformed("automation trigger", e))?,
        conditions: row
            .conditions
            .filter(|c| !c.is_null())
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| malformed("automation conditions", e))?,
        actions: serde_json::from_value(row.actions).map_err(|e| malformed("automation actions", e))?,
        id: row.id,
        name: row.name,
        enabled: row.enabled,
        position: row.position,
    })
}

fn automation_to_row(pipe_id: &str, automation: &Automation) -> Result<AutomationRow, StoreError> {
    Ok(AutomationRow {
        id: automation.id.clone(),
        pipe_id: pipe_id.to_string(),
        owner_stage_id: match &automation.owner {
            OwnerRef::Stage(stage_id) => Some(stage_id.clone()),
            OwnerRef::Pipe(_) => None,
        },
        name: automation.name.clone(),
        enabled: automation.enabled,
        trigger: serde_json::to_value(&automation.trigger).map_err(|e| malformed("automation trigger", e))?,
        conditions: automation
            .conditions
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| malformed("automation conditions", e))?,
        actions: serde_json::to_value(&automation.actions).map_err(|e| malformed("automation actions", e))?,
        position: automation.position,
    })
}

fn field_from_row(row: CardFieldRow) -> CardField {
    CardField {
        key: row.key,
        field_type: FieldType::parse(&row.field_type),
        value: row.value,
        position: row.position,
    }
}

fn submission_from_row(row: FormSubmissionRow) -> FormSubmission {
    FormSubmission {
        id: row.id,
        card_id: row.card_id,
        form_id: row.form_id,
        form_name: row.form_name,
        responses: match row.responses {
            Value::Object(map) => map,
            _ => Default::default(),
        },
        submitted_at: row.submitted_at,
        submitter_email: row.submitter_email,
    }
}

fn message_from_row(row: MessageLogRow) -> MessageLog {
    MessageLog {
        id: row.id,
        card_id: row.card_id,
        channel: if row.channel == "sms" { Channel::Sms } else { Channel::Email },
        recipient: row.recipient,
        subject: row.subject,
        body: row.body,
        provider_id: row.provider_id,
        status: row.status,
        created_at: row.created_at,
    }
}

#[async_trait]
impl BoardStore for PgStore {
    async fn get_pipe_with_automations(&self, pipe_id: &str) -> Result<Option<Pipe>, StoreError> {
        let Some(row) = optional(pipes::get_pipe(&self.pool, pipe_id).await)? else {
            return Ok(None);
        };

        let stages = pipes::list_stages(&self.pool, pipe_id)
            .await?
            .into_iter()
            .map(|s| Stage {
                id: s.id,
                name: s.name,
                position: s.position,
                background_color: s.background_color,
            })
            .collect();

        let forms = pipes::list_forms(&self.pool, pipe_id)
            .await?
            .into_iter()
            .map(|f| Form { id: f.id, name: f.name, stage_id: f.stage_id })
            .collect();

        // A definition that no longer decodes is skipped, not fatal to the pipe.
        let automations = automations::list_automations(&self.pool, pipe_id)
            .await?
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match automation_from_row(row) {
                    Ok(a) => Some(a),
                    Err(e) => {
                        warn!(automation_id = %id, "skipping stored automation: {e}");
                        None
                    }
                }
            })
            .collect();

        let email_templates = templates::list_email_templates(&self.pool, pipe_id)
            .await?
            .into_iter()
            .map(|t| EmailTemplate {
                id: t.id,
                name: t.name,
                subject: t.subject,
                body: t.body,
                from_email: t.from_email,
                from_name: t.from_name,
                to_email: t.to_email,
                cc: t.cc,
                bcc: t.bcc,
            })
            .collect();

        let sms_templates = templates::list_sms_templates(&self.pool, pipe_id)
            .await?
            .into_iter()
            .map(|t| SmsTemplate { id: t.id, name: t.name, body: t.body, to_phone: t.to_phone })
            .collect();

        let global_variables = pipes::list_global_variables(&self.pool, pipe_id)
            .await?
            .into_iter()
            .map(|v| GlobalVariable { name: v.name, value: v.value })
            .collect();

        Ok(Some(Pipe {
            id: row.id,
            name: row.name,
            stages,
            forms,
            automations,
            email_templates,
            sms_templates,
            global_variables,
        }))
    }

    async fn get_card(&self, card_id: &str) -> Result<Option<Card>, StoreError> {
        let Some(row) = optional(cards::get_card(&self.pool, card_id).await)? else {
            return Ok(None);
        };
        let fields = cards::list_card_fields(&self.pool, card_id).await?;
        let subs = submissions::list_submissions(&self.pool, card_id).await?;

        Ok(Some(Card {
            id: row.id,
            pipe_id: row.pipe_id,
            stage_id: row.stage_id,
            title: row.title,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            fields: fields.into_iter().map(field_from_row).collect(),
            form_submissions: subs.into_iter().map(submission_from_row).collect(),
        }))
    }

    async fn update_card_stage(&self, card_id: &str, stage_id: &str) -> Result<DateTime<Utc>, StoreError> {
        cards::update_card_stage(&self.pool, card_id, stage_id)
            .await
            .map_err(not_found_as("card", card_id))
    }

    async fn upsert_card_field(&self, card_id: &str, key: &str, value: &Value) -> Result<CardField, StoreError> {
        let field_type = FieldType::infer(value);
        let row = cards::upsert_card_field(&self.pool, card_id, key, field_type.as_str(), value)
            .await
            .map_err(not_found_as("card", card_id))?;
        Ok(field_from_row(row))
    }

    async fn create_form_submission(&self, submission: &NewFormSubmission) -> Result<FormSubmission, StoreError> {
        let responses = Value::Object(submission.responses.clone());
        let row = submissions::create_submission(
            &self.pool,
            &Uuid::new_v4().to_string(),
            &submission.card_id,
            &submission.form_id,
            &responses,
            submission.submitter_email.as_deref(),
            Utc::now(),
        )
        .await
        .map_err(not_found_as("form", &submission.form_id))?;
        Ok(submission_from_row(row))
    }

    async fn log_message(&self, log: &MessageLog) -> Result<(), StoreError> {
        let row = MessageLogRow {
            id: log.id.clone(),
            card_id: log.card_id.clone(),
            channel: log.channel.as_str().to_string(),
            direction: "sent".into(),
            recipient: log.recipient.clone(),
            subject: log.subject.clone(),
            body: log.body.clone(),
            provider_id: log.provider_id.clone(),
            status: log.status.clone(),
            created_at: log.created_at,
        };
        messages::insert_message_log(&self.pool, &row).await?;
        Ok(())
    }

    async fn list_messages(&self, card_id: &str) -> Result<Vec<MessageLog>, StoreError> {
        let rows = messages::list_message_logs(&self.pool, card_id).await?;
        Ok(rows.into_iter().map(message_from_row).collect())
    }

    async fn save_automation(&self, pipe_id: &str, automation: &Automation) -> Result<(), StoreError> {
        let row = automation_to_row(pipe_id, automation)?;
        automations::upsert_automation(&self.pool, &row)
            .await
            .map_err(not_found_as("automation", &automation.id))
    }

    async fn delete_automation(&self, pipe_id: &str, automation_id: &str) -> Result<(), StoreError> {
        automations::delete_automation(&self.pool, pipe_id, automation_id)
            .await
            .map_err(not_found_as("automation", automation_id))
    }

    async fn insert_pipe(&self, pipe: &Pipe) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        pipes::insert_pipe(
            &mut *tx,
            &PipeRow { id: pipe.id.clone(), name: pipe.name.clone(), created_at: Utc::now() },
        )
        .await
        .map_err(not_found_as("pipe", &pipe.id))?;

        for stage in &pipe.stages {
            let row = StageRow {
                id: stage.id.clone(),
                pipe_id: pipe.id.clone(),
                name: stage.name.clone(),
                position: stage.position,
                background_color: stage.background_color.clone(),
            };
            pipes::insert_stage(&mut *tx, &row).await?;
        }

        for form in &pipe.forms {
            let row = FormRow {
                id: form.id.clone(),
                pipe_id: pipe.id.clone(),
                stage_id: form.stage_id.clone(),
                name: form.name.clone(),
            };
            pipes::insert_form(&mut *tx, &row).await?;
        }

        for template in &pipe.email_templates {
            let row = EmailTemplateRow {
                id: template.id.clone(),
                pipe_id: pipe.id.clone(),
                name: template.name.clone(),
                subject: template.subject.clone(),
                body: template.body.clone(),
                from_email: template.from_email.clone(),
                from_name: template.from_name.clone(),
                to_email: template.to_email.clone(),
                cc: template.cc.clone(),
                bcc: template.bcc.clone(),
            };
            templates::insert_email_template(&mut *tx, &row).await?;
        }

        for template in &pipe.sms_templates {
            let row = SmsTemplateRow {
                id: template.id.clone(),
                pipe_id: pipe.id.clone(),
                name: template.name.clone(),
                body: template.body.clone(),
                to_phone: template.to_phone.clone(),
            };
            templates::insert_sms_template(&mut *tx, &row).await?;
        }

        for variable in &pipe.global_variables {
            let row = GlobalVariableRow {
                pipe_id: pipe.id.clone(),
                name: variable.name.clone(),
                value: variable.value.clone(),
            };
            pipes::upsert_global_variable(&mut *tx, &row).await?;
        }

        for automation in &pipe.automations {
            let row = automation_to_row(&pipe.id, automation)?;
            automations::upsert_automation(&mut *tx, &row).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}
