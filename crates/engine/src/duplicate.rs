//! Pipe duplication.
//!
//! Every stage, form, template and automation gets a fresh id, and every
//! reference to one of them (owners, trigger configs, action configs, form
//! stages) is rewritten through an explicit old-id -> new-id map. Free text
//! such as template bodies and field values is copied untouched.

use std::collections::HashMap;

use tracing::info;
use uuid::Uuid;

use crate::models::{Action, Automation, OwnerRef, Pipe, Trigger};
use crate::store::BoardStore;
use crate::validate::validate_pipe;
use crate::EngineError;

/// Copy `source` under `name` with fresh uuids.
pub fn duplicate_pipe(source: &Pipe, name: &str) -> Pipe {
    duplicate_pipe_with(source, name, || Uuid::new_v4().to_string())
}

/// Copy `source` under `name`, drawing every new id from `next_id`.
pub fn duplicate_pipe_with(source: &Pipe, name: &str, mut next_id: impl FnMut() -> String) -> Pipe {
    let mut ids = IdMap::default();
    let pipe_id = next_id();
    ids.insert(&source.id, &pipe_id);

    let stages = source
        .stages
        .iter()
        .map(|s| {
            let mut stage = s.clone();
            stage.id = ids.fresh(&s.id, &mut next_id);
            stage
        })
        .collect();

    let email_templates = source
        .email_templates
        .iter()
        .map(|t| {
            let mut template = t.clone();
            template.id = ids.fresh(&t.id, &mut next_id);
            template
        })
        .collect();

    let sms_templates = source
        .sms_templates
        .iter()
        .map(|t| {
            let mut template = t.clone();
            template.id = ids.fresh(&t.id, &mut next_id);
            template
        })
        .collect();

    let forms = source
        .forms
        .iter()
        .map(|f| {
            let mut form = f.clone();
            form.id = ids.fresh(&f.id, &mut next_id);
            form.stage_id = f.stage_id.as_deref().map(|s| ids.get(s));
            form
        })
        .collect();

    let automations = source
        .automations
        .iter()
        .map(|a| {
            let id = ids.fresh(&a.id, &mut next_id);
            remap_automation(a, id, &ids)
        })
        .collect();

    Pipe {
        id: pipe_id,
        name: name.to_string(),
        stages,
        forms,
        automations,
        email_templates,
        sms_templates,
        global_variables: source.global_variables.clone(),
    }
}

/// Load `pipe_id`, duplicate it, validate the copy and persist it.
///
/// # Errors
/// [`EngineError::PipeNotFound`], validation errors for the copy, or a store
/// failure.
pub async fn copy_pipe(store: &dyn BoardStore, pipe_id: &str, name: &str) -> Result<Pipe, EngineError> {
    let source = store
        .get_pipe_with_automations(pipe_id)
        .await?
        .ok_or_else(|| EngineError::PipeNotFound(pipe_id.to_string()))?;

    let copy = duplicate_pipe(&source, name);
    validate_pipe(&copy)?;
    store.insert_pipe(&copy).await?;

    info!(source = %pipe_id, copy = %copy.id, "pipe duplicated");
    Ok(copy)
}

fn remap_automation(a: &Automation, id: String, ids: &IdMap) -> Automation {
    Automation {
        id,
        name: a.name.clone(),
        enabled: a.enabled,
        owner: match &a.owner {
            OwnerRef::Pipe(p) => OwnerRef::Pipe(ids.get(p)),
            OwnerRef::Stage(s) => OwnerRef::Stage(ids.get(s)),
        },
        trigger: match &a.trigger {
            Trigger::CardEntersStage { stage_id } => Trigger::CardEntersStage { stage_id: ids.get(stage_id) },
            Trigger::FormSubmission { form_id } => Trigger::FormSubmission {
                form_id: form_id.as_deref().map(|f| ids.get(f)),
            },
            other => other.clone(),
        },
        conditions: a.conditions.clone(),
        actions: a.actions.iter().map(|action| remap_action(action, ids)).collect(),
        position: a.position,
    }
}

fn remap_action(action: &Action, ids: &IdMap) -> Action {
    match action {
        Action::MoveCard { target_stage_id } => Action::MoveCard { target_stage_id: ids.get(target_stage_id) },
        Action::SendEmail { template_id, recipient_field } => Action::SendEmail {
            template_id: ids.get(template_id),
            recipient_field: recipient_field.clone(),
        },
        Action::SendFormLink { form_id, template_id, recipient_field } => Action::SendFormLink {
            form_id: ids.get(form_id),
            template_id: template_id.as_deref().map(|t| ids.get(t)),
            recipient_field: recipient_field.clone(),
        },
        Action::SendSms { template_id, recipient_field } => Action::SendSms {
            template_id: ids.get(template_id),
            recipient_field: recipient_field.clone(),
        },
        Action::UpdateField { .. } => action.clone(),
    }
}

#[derive(Default)]
struct IdMap(HashMap<String, String>);

impl IdMap {
    fn insert(&mut self, old: &str, new: &str) {
        self.0.insert(old.to_string(), new.to_string());
    }

    fn fresh(&mut self, old: &str, next_id: &mut impl FnMut() -> String) -> String {
        let new = next_id();
        self.insert(old, &new);
        new
    }

    /// Ids pointing outside the pipe are kept as they are.
    fn get(&self, old: &str) -> String {
        self.0.get(old).cloned().unwrap_or_else(|| old.to_string())
    }
}
