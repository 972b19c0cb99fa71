//! Trigger matching: which of a pipe's automations an event starts.

use tracing::warn;

use crate::conditions::{evaluate_rule, FieldLookup};
use crate::models::{Automation, OwnerRef, Trigger, TriggerKind};

/// The facts about an event that triggers are matched against.
pub struct MatchContext<'a> {
    pub kind: TriggerKind,
    /// Stage the card is entering, or currently in.
    pub stage_id: Option<&'a str>,
    /// Submitted form, for `form_submission` events.
    pub form_id: Option<&'a str>,
    /// Card fields, for `card_field_value` triggers.
    pub lookup: &'a dyn FieldLookup,
}

/// Outcome of matching one event against a pipe's automations.
#[derive(Debug)]
pub struct TriggerMatches<'a> {
    /// Enabled automations with the event's trigger type.
    pub found: usize,
    /// The subset whose trigger config (and owner) accepted the event.
    pub matched: Vec<&'a Automation>,
}

/// Select the enabled automations whose trigger type and config match.
///
/// `manual` automations are never matched here; they only run through an
/// explicit request. Matches keep the order of `automations`.
pub fn match_automations<'a>(ctx: &MatchContext<'_>, automations: &'a [Automation]) -> TriggerMatches<'a> {
    let candidates: Vec<&Automation> = automations
        .iter()
        .filter(|a| a.enabled && a.trigger.kind() == ctx.kind)
        .collect();

    let found = candidates.len();
    let matched = candidates
        .into_iter()
        .filter(|a| owner_accepts(&a.owner, ctx) && trigger_accepts(&a.trigger, ctx))
        .collect();

    TriggerMatches { found, matched }
}

/// Does the trigger config accept the event? Assumes the kinds already agree.
pub fn trigger_accepts(trigger: &Trigger, ctx: &MatchContext<'_>) -> bool {
    match trigger {
        Trigger::CardEntersStage { stage_id } => ctx.stage_id == Some(stage_id.as_str()),
        Trigger::FormSubmission { form_id: None } => ctx.form_id.is_some(),
        Trigger::FormSubmission { form_id: Some(form_id) } => ctx.form_id == Some(form_id.as_str()),
        Trigger::CardFieldValue(rule) => match evaluate_rule(rule, ctx.lookup) {
            Ok(passed) => passed,
            Err(e) => {
                warn!(field = %rule.field_key, "field-value trigger skipped: {e}");
                false
            }
        },
        Trigger::Manual => false,
    }
}

/// Stage-attached automations only see events for their own stage.
fn owner_accepts(owner: &OwnerRef, ctx: &MatchContext<'_>) -> bool {
    match owner {
        OwnerRef::Pipe(_) => true,
        OwnerRef::Stage(stage_id) => ctx.stage_id == Some(stage_id.as_str()),
    }
}
