//! Save-time validation. Run this before persisting an automation or a pipe.
//!
//! Rules enforced for an automation:
//! 1. Name is non-empty.
//! 2. The owner is this pipe or one of its stages.
//! 3. Every stage, form and template the trigger or an action names exists
//!    in the pipe.
//! 4. Condition and field-value rules have a field key and a known operator.
//! 5. `update_field` keys are non-empty.
//!
//! And for a pipe: stage positions and automation ids are unique, and every
//! automation passes the rules above.

use std::collections::{HashMap, HashSet};

use crate::conditions::Operator;
use crate::models::{Action, Automation, ConditionRule, OwnerRef, Pipe, Trigger};
use crate::EngineError;

/// Validate one automation definition against the pipe it belongs to.
///
/// # Errors
/// [`EngineError::InvalidAutomation`] naming the first rule broken.
pub fn validate_automation(automation: &Automation, pipe: &Pipe) -> Result<(), EngineError> {
    let invalid = |reason: String| EngineError::InvalidAutomation {
        automation: automation.name.clone(),
        reason,
    };

    if automation.name.trim().is_empty() {
        return Err(EngineError::InvalidAutomation {
            automation: automation.id.clone(),
            reason: "name is empty".into(),
        });
    }

    // ------------------------------------------------------------------
    // Owner
    // ------------------------------------------------------------------
    match &automation.owner {
        OwnerRef::Pipe(id) if id != &pipe.id => {
            return Err(invalid(format!("owned by pipe {id}, not {}", pipe.id)));
        }
        OwnerRef::Stage(id) if pipe.stage(id).is_none() => {
            return Err(invalid(format!("owner stage {id} is not in this pipe")));
        }
        _ => {}
    }

    // ------------------------------------------------------------------
    // Trigger
    // ------------------------------------------------------------------
    match &automation.trigger {
        Trigger::CardEntersStage { stage_id } if pipe.stage(stage_id).is_none() => {
            return Err(invalid(format!("trigger stage {stage_id} is not in this pipe")));
        }
        Trigger::FormSubmission { form_id: Some(form_id) } if pipe.form(form_id).is_none() => {
            return Err(invalid(format!("trigger form {form_id} is not in this pipe")));
        }
        Trigger::CardFieldValue(rule) => check_rule(rule).map_err(|r| invalid(format!("trigger: {r}")))?,
        _ => {}
    }

    // ------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------
    if let Some(group) = &automation.conditions {
        for (i, rule) in group.rules.iter().enumerate() {
            check_rule(rule).map_err(|r| invalid(format!("condition {}: {r}", i + 1)))?;
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------
    for (i, action) in automation.actions.iter().enumerate() {
        check_action(action, pipe)
            .map_err(|r| invalid(format!("action {} ({}): {r}", i + 1, action.kind())))?;
    }

    Ok(())
}

/// Validate a whole pipe definition.
///
/// # Errors
/// - [`EngineError::DuplicateStagePosition`] if two stages share a position.
/// - [`EngineError::DuplicateAutomationId`] if two automations share an id.
/// - [`EngineError::InvalidAutomation`] for the first invalid automation.
pub fn validate_pipe(pipe: &Pipe) -> Result<(), EngineError> {
    let mut positions: HashMap<i32, &str> = HashMap::new();
    for stage in &pipe.stages {
        if let Some(first) = positions.insert(stage.position, stage.id.as_str()) {
            return Err(EngineError::DuplicateStagePosition {
                first: first.to_string(),
                second: stage.id.clone(),
                position: stage.position,
            });
        }
    }

    let mut ids: HashSet<&str> = HashSet::new();
    for automation in &pipe.automations {
        if !ids.insert(automation.id.as_str()) {
            return Err(EngineError::DuplicateAutomationId(automation.id.clone()));
        }
        validate_automation(automation, pipe)?;
    }

    Ok(())
}

fn check_rule(rule: &ConditionRule) -> Result<(), String> {
    if rule.field_key.trim().is_empty() {
        return Err("field key is empty".into());
    }
    rule.operator
        .parse::<Operator>()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn check_action(action: &Action, pipe: &Pipe) -> Result<(), String> {
    let email_template = |id: &str| {
        pipe.email_template(id)
            .map(|_| ())
            .ok_or_else(|| format!("email template {id} is not in this pipe"))
    };

    match action {
        Action::MoveCard { target_stage_id } => pipe
            .stage(target_stage_id)
            .map(|_| ())
            .ok_or_else(|| format!("stage {target_stage_id} is not in this pipe")),
        Action::SendEmail { template_id, .. } => email_template(template_id),
        Action::SendFormLink { form_id, template_id, .. } => {
            pipe.form(form_id)
                .ok_or_else(|| format!("form {form_id} is not in this pipe"))?;
            template_id.as_deref().map_or(Ok(()), email_template)
        }
        Action::SendSms { template_id, .. } => pipe
            .sms_template(template_id)
            .map(|_| ())
            .ok_or_else(|| format!("sms template {template_id} is not in this pipe")),
        Action::UpdateField { field_key, .. } if field_key.trim().is_empty() => {
            Err("field key is empty".into())
        }
        Action::UpdateField { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConditionGroup, EmailTemplate, Form, Logic, Stage};
    use serde_json::json;

    fn pipe() -> Pipe {
        let mut pipe = Pipe::new("p1", "Sales");
        pipe.stages = vec![Stage::new("S1", "Lead", 0), Stage::new("S2", "Won", 1)];
        pipe.forms = vec![Form { id: "F1".into(), name: "Intake".into(), stage_id: Some("S1".into()) }];
        pipe.email_templates = vec![EmailTemplate::new("T1", "s", "b")];
        pipe
    }

    fn automation(trigger: Trigger, actions: Vec<Action>) -> Automation {
        Automation::new("a1", "Rule", "p1", trigger, actions)
    }

    #[test]
    fn well_formed_automation_passes() {
        let a = automation(
            Trigger::CardEntersStage { stage_id: "S1".into() },
            vec![
                Action::MoveCard { target_stage_id: "S2".into() },
                Action::SendFormLink { form_id: "F1".into(), template_id: Some("T1".into()), recipient_field: None },
            ],
        )
        .with_conditions(ConditionGroup {
            logic: Logic::And,
            rules: vec![ConditionRule::new("status", "equals", "ok")],
        });
        assert!(validate_automation(&a, &pipe()).is_ok());
    }

    #[test]
    fn unknown_operator_is_rejected_with_position() {
        let a = automation(Trigger::Manual, vec![]).with_conditions(ConditionGroup {
            logic: Logic::Or,
            rules: vec![
                ConditionRule::new("a", "equals", 1),
                ConditionRule::new("b", "roughly", 1),
            ],
        });
        let err = validate_automation(&a, &pipe()).unwrap_err();
        assert!(err.to_string().contains("condition 2"), "{err}");
    }

    #[test]
    fn references_outside_the_pipe_are_rejected() {
        let cases = vec![
            automation(Trigger::CardEntersStage { stage_id: "X".into() }, vec![]),
            automation(Trigger::FormSubmission { form_id: Some("X".into()) }, vec![]),
            automation(Trigger::Manual, vec![Action::MoveCard { target_stage_id: "X".into() }]),
            automation(Trigger::Manual, vec![Action::SendEmail { template_id: "X".into(), recipient_field: None }]),
            automation(Trigger::Manual, vec![Action::SendSms { template_id: "X".into(), recipient_field: None }]),
            automation(Trigger::Manual, vec![Action::UpdateField { field_key: " ".into(), value: json!(1) }]),
        ];
        for a in cases {
            assert!(
                matches!(validate_automation(&a, &pipe()), Err(EngineError::InvalidAutomation { .. })),
                "{a:?} should be rejected"
            );
        }
    }

    #[test]
    fn stage_owner_must_exist() {
        let mut a = automation(Trigger::Manual, vec![]);
        a.owner = OwnerRef::Stage("S9".into());
        assert!(validate_automation(&a, &pipe()).is_err());
    }

    #[test]
    fn bundled_demo_pipe_is_valid() {
        let pipe: Pipe = serde_json::from_str(include_str!("../../../demos/onboarding-pipe.json")).unwrap();
        validate_pipe(&pipe).unwrap();
        assert_eq!(pipe.automations[1].owner, OwnerRef::Stage("stage-intake".into()));
    }

    #[test]
    fn duplicate_stage_positions_are_rejected() {
        let mut p = pipe();
        p.stages.push(Stage::new("S3", "Lost", 1));
        assert!(matches!(
            validate_pipe(&p),
            Err(EngineError::DuplicateStagePosition { position: 1, .. })
        ));
    }

    #[test]
    fn duplicate_automation_ids_are_rejected() {
        let mut p = pipe();
        p.automations = vec![automation(Trigger::Manual, vec![]), automation(Trigger::Manual, vec![])];
        assert!(matches!(validate_pipe(&p), Err(EngineError::DuplicateAutomationId(id)) if id == "a1"));
    }
}
