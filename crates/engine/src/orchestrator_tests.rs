//! Scenario tests for the orchestrator.
//!
//! Everything runs against `MemoryStore` and the recording transports from
//! `transport::mock`, so no database or network is needed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use transport::mock::{MockEmailTransport, MockNotifier, MockSmsTransport};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::event::{Event, EventContext, EventPayload};
use crate::models::{
    Action, Automation, Card, CardField, ConditionGroup, ConditionRule, EmailTemplate, Form,
    FormSubmission, Logic, MessageLog, NewFormSubmission, OwnerRef, Pipe, Stage, Trigger,
    TriggerKind,
};
use crate::orchestrator::Orchestrator;
use crate::store::{BoardStore, MemoryStore};
use crate::EngineError;

struct Board {
    store: Arc<MemoryStore>,
    email: MockEmailTransport,
    engine: Orchestrator,
}

fn base_pipe(automations: Vec<Automation>) -> Pipe {
    let mut pipe = Pipe::new("P", "Onboarding");
    pipe.stages = vec![
        Stage::new("S1", "New", 0),
        Stage::new("S2", "Contacted", 1),
        Stage::new("S3", "Won", 2),
    ];
    pipe.forms = vec![Form { id: "F1".into(), name: "Intake".into(), stage_id: Some("S1".into()) }];
    pipe.email_templates = vec![EmailTemplate::new("T1", "Welcome {{card_title}}", "You are in {{stage_name}}")];
    pipe.automations = automations;
    pipe
}

async fn board_with(automations: Vec<Automation>, card: Card, config: EngineConfig) -> Board {
    let store = Arc::new(MemoryStore::new());
    store.put_pipe(base_pipe(automations)).await;
    store.put_card(card).await;

    let email = MockEmailTransport::accepting();
    let engine = Orchestrator::new(
        store.clone(),
        Arc::new(email.clone()),
        Arc::new(MockSmsTransport::accepting()),
        config,
    );
    Board { store, email, engine }
}

async fn board(automations: Vec<Automation>, card: Card) -> Board {
    board_with(automations, card, EngineConfig::default()).await
}

fn card_in(stage: &str) -> Card {
    Card::new("C", "P", stage, "Acme").with_field("email", "a@b.com")
}

fn on_enter(id: &str, stage: &str, actions: Vec<Action>) -> Automation {
    Automation::new(id, id, "P", Trigger::CardEntersStage { stage_id: stage.into() }, actions)
}

fn move_to(stage: &str) -> Action {
    Action::MoveCard { target_stage_id: stage.into() }
}

fn email(template: &str) -> Action {
    Action::SendEmail { template_id: template.into(), recipient_field: Some("email".into()) }
}

fn enters(stage: &str) -> Event {
    Event::new(TriggerKind::CardEntersStage, "P", "C").with_stage(stage)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn entering_a_stage_sends_one_email_to_the_card_field() {
    let b = board(vec![on_enter("greet", "S2", vec![email("T1")])], card_in("S2")).await;

    let report = b.engine.dispatch_event(enters("S2")).await.unwrap();

    assert!(report.success);
    assert_eq!(report.automations_found, 1);
    assert_eq!(report.automations_matched, 1);
    assert_eq!(report.automations_executed, vec!["greet"]);
    let sent = b.email.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@b.com");
    assert_eq!(sent[0].subject, "Welcome Acme [#C]");
}

#[tokio::test]
async fn failed_condition_is_matched_but_not_executed() {
    let gated = on_enter("approve", "S2", vec![email("T1")]).with_conditions(ConditionGroup {
        logic: Logic::And,
        rules: vec![ConditionRule::new("status", "equals", "approved")],
    });
    let b = board(vec![gated], card_in("S2").with_field("status", "pending")).await;

    let report = b.engine.dispatch_event(enters("S2")).await.unwrap();

    assert_eq!(report.automations_matched, 1);
    assert!(report.automations_executed.is_empty());
    assert_eq!(report.automations_skipped, vec!["approve"]);
    assert_eq!(b.email.call_count(), 0);
}

#[tokio::test]
async fn move_cascades_into_the_destination_stage() {
    let b = board(
        vec![
            on_enter("X", "S1", vec![move_to("S2")]),
            on_enter("Y", "S2", vec![email("T1")]),
        ],
        card_in("S1"),
    )
    .await;

    let report = b.engine.dispatch_event(enters("S1")).await.unwrap();

    assert_eq!(report.automations_executed, vec!["X", "Y"]);
    assert_eq!(report.cascaded.len(), 1);
    assert_eq!(report.cascaded[0].stage_id, "S2");
    assert_eq!(report.cascaded[0].automations_executed, vec!["Y"]);
    assert_eq!(b.store.card("C").await.unwrap().stage_id, "S2");
    // The email rendered after the move sees the new stage.
    assert_eq!(b.email.messages()[0].body, "You are in Contacted");
}

#[tokio::test]
async fn competing_moves_both_run_and_the_later_position_wins() {
    let b = board(
        vec![
            on_enter("to-won", "S1", vec![move_to("S3")]).at_position(2),
            on_enter("to-contacted", "S1", vec![move_to("S2")]).at_position(1),
        ],
        card_in("S1"),
    )
    .await;

    let report = b.engine.dispatch_event(enters("S1")).await.unwrap();

    assert_eq!(report.automations_executed, vec!["to-contacted", "to-won"]);
    assert!(report.runs.iter().all(|r| r.actions[0].error.is_none()));
    assert_eq!(b.store.card("C").await.unwrap().stage_id, "S3");
    let stages: Vec<_> = report.cascaded.iter().map(|c| c.stage_id.as_str()).collect();
    assert_eq!(stages, vec!["S2", "S3"]);
}

#[tokio::test]
async fn each_stage_passed_through_cascades() {
    let b = board(
        vec![
            on_enter("X", "S1", vec![move_to("S2"), move_to("S3")]),
            on_enter("Y", "S2", vec![email("T1")]),
            on_enter("Z", "S3", vec![Action::UpdateField { field_key: "won".into(), value: json!(true) }]),
        ],
        card_in("S1"),
    )
    .await;

    let report = b.engine.dispatch_event(enters("S1")).await.unwrap();

    assert_eq!(report.automations_executed, vec!["X", "Y", "Z"]);
    let stages: Vec<_> = report.cascaded.iter().map(|c| c.stage_id.as_str()).collect();
    assert_eq!(stages, vec!["S2", "S3"]);
    assert_eq!(report.cascaded[0].automations_executed, vec!["Y"]);
    assert_eq!(b.email.call_count(), 1);
    let card = b.store.card("C").await.unwrap();
    assert_eq!(card.stage_id, "S3");
    assert_eq!(card.field("won").unwrap().value, json!(true));
}

#[tokio::test]
async fn missing_template_counts_as_executed_and_failed() {
    let b = board(
        vec![on_enter("broken", "S2", vec![email("T404"), Action::UpdateField {
            field_key: "touched".into(),
            value: json!(true),
        }])],
        card_in("S2"),
    )
    .await;

    let report = b.engine.dispatch_event(enters("S2")).await.unwrap();

    assert!(report.success);
    assert_eq!(report.automations_executed, vec!["broken"]);
    assert_eq!(report.automations_failed.len(), 1);
    assert_eq!(report.automations_failed[0].error, "Template not found: T404");
    let actions = &report.runs[0].actions;
    assert_eq!(actions[0].error.as_deref(), Some("Template not found: T404"));
    assert!(actions[1].error.is_none());
    assert_eq!(b.store.card("C").await.unwrap().field("touched").unwrap().value, json!(true));
}

// ---------------------------------------------------------------------------
// Cascade termination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stage_cycle_stops_at_the_cascade_limit() {
    let config = EngineConfig { max_cascade_depth: 3, ..EngineConfig::default() };
    let b = board_with(
        vec![
            on_enter("forward", "S1", vec![move_to("S2")]),
            on_enter("back", "S2", vec![move_to("S1")]),
        ],
        card_in("S1"),
        config,
    )
    .await;

    let report = b.engine.dispatch_event(enters("S1")).await.unwrap();

    assert!(report.success);
    assert_eq!(report.runs.len(), 4);
    assert_eq!(report.cascaded.len(), 3);
    let err = report.cascade_error.expect("cascade error recorded");
    assert!(err.contains("cascade limit of 3"), "{err}");
    assert_eq!(b.store.card("C").await.unwrap().stage_id, "S1");
}

#[tokio::test]
async fn moving_to_the_current_stage_does_not_cascade() {
    let b = board(vec![on_enter("stay", "S1", vec![move_to("S1")])], card_in("S1")).await;

    let report = b.engine.dispatch_event(enters("S1")).await.unwrap();

    assert_eq!(report.automations_executed, vec!["stay"]);
    assert!(report.cascaded.is_empty());
    assert!(report.cascade_error.is_none());
}

/// Delegates to a `MemoryStore` but fails every pipe load after the first.
struct FlakyPipeStore {
    inner: Arc<MemoryStore>,
    loads: AtomicUsize,
}

#[async_trait]
impl BoardStore for FlakyPipeStore {
    async fn get_pipe_with_automations(&self, pipe_id: &str) -> Result<Option<Pipe>, StoreError> {
        if self.loads.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(StoreError::Malformed { what: "pipe", message: "connection reset".into() });
        }
        self.inner.get_pipe_with_automations(pipe_id).await
    }

    async fn get_card(&self, card_id: &str) -> Result<Option<Card>, StoreError> {
        self.inner.get_card(card_id).await
    }

    async fn update_card_stage(&self, card_id: &str, stage_id: &str) -> Result<DateTime<Utc>, StoreError> {
        self.inner.update_card_stage(card_id, stage_id).await
    }

    async fn upsert_card_field(&self, card_id: &str, key: &str, value: &Value) -> Result<CardField, StoreError> {
        self.inner.upsert_card_field(card_id, key, value).await
    }

    async fn create_form_submission(&self, submission: &NewFormSubmission) -> Result<FormSubmission, StoreError> {
        self.inner.create_form_submission(submission).await
    }

    async fn log_message(&self, log: &MessageLog) -> Result<(), StoreError> {
        self.inner.log_message(log).await
    }

    async fn list_messages(&self, card_id: &str) -> Result<Vec<MessageLog>, StoreError> {
        self.inner.list_messages(card_id).await
    }

    async fn save_automation(&self, pipe_id: &str, automation: &Automation) -> Result<(), StoreError> {
        self.inner.save_automation(pipe_id, automation).await
    }

    async fn delete_automation(&self, pipe_id: &str, automation_id: &str) -> Result<(), StoreError> {
        self.inner.delete_automation(pipe_id, automation_id).await
    }

    async fn insert_pipe(&self, pipe: &Pipe) -> Result<(), StoreError> {
        self.inner.insert_pipe(pipe).await
    }
}

#[tokio::test]
async fn store_failure_mid_cascade_keeps_what_already_ran() {
    let b = board(
        vec![
            on_enter("X", "S1", vec![email("T1"), move_to("S2")]),
            on_enter("Y", "S2", vec![email("T1")]),
        ],
        card_in("S1"),
    )
    .await;
    let flaky = Arc::new(FlakyPipeStore { inner: b.store.clone(), loads: AtomicUsize::new(0) });
    let notifier = MockNotifier::accepting();
    let engine = Orchestrator::new(
        flaky,
        Arc::new(b.email.clone()),
        Arc::new(MockSmsTransport::accepting()),
        EngineConfig::default(),
    )
    .with_notifier(Arc::new(notifier.clone()));

    let report = engine.dispatch_event(enters("S1")).await.unwrap();

    assert!(report.success);
    assert_eq!(report.automations_executed, vec!["X"]);
    assert!(report.cascade_error.unwrap().contains("connection reset"));
    assert!(report.cascaded.is_empty());
    assert_eq!(b.email.call_count(), 1);
    assert_eq!(b.store.card("C").await.unwrap().stage_id, "S2");

    for _ in 0..10 {
        if !notifier.summaries().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(notifier.summaries().len(), 1);
}

// ---------------------------------------------------------------------------
// Structural failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_payload_is_reported_not_thrown() {
    let b = board(vec![on_enter("greet", "S2", vec![email("T1")])], card_in("S2")).await;

    let report = b
        .engine
        .dispatch(EventPayload {
            trigger_type: Some("card_enters_stage".into()),
            card_id: None,
            pipe_id: Some("P".into()),
            context: EventContext::default(),
        })
        .await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("cardId"));
    assert_eq!(b.email.call_count(), 0);
}

#[tokio::test]
async fn unknown_pipe_and_card_abort_the_dispatch() {
    let b = board(vec![], card_in("S1")).await;

    let missing_pipe = Event::new(TriggerKind::CardEntersStage, "nope", "C");
    assert!(matches!(
        b.engine.dispatch_event(missing_pipe).await,
        Err(EngineError::PipeNotFound(_))
    ));

    let missing_card = Event::new(TriggerKind::CardEntersStage, "P", "ghost");
    assert!(matches!(
        b.engine.dispatch_event(missing_card).await,
        Err(EngineError::CardNotFound(_))
    ));
}

#[tokio::test]
async fn card_from_another_pipe_is_rejected() {
    let b = board(vec![], card_in("S1")).await;
    b.store.put_card(Card::new("other", "Q", "S1", "Elsewhere")).await;

    let err = b
        .engine
        .dispatch_event(Event::new(TriggerKind::CardEntersStage, "P", "other"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidEvent(_)));
}

// ---------------------------------------------------------------------------
// Other trigger kinds
// ---------------------------------------------------------------------------

fn intake(budget: &str) -> NewFormSubmission {
    let mut responses = Map::new();
    responses.insert("budget".into(), Value::String(budget.into()));
    NewFormSubmission {
        card_id: "C".into(),
        form_id: "F1".into(),
        responses,
        submitter_email: Some("lead@example.com".into()),
    }
}

#[tokio::test]
async fn form_submission_dispatches_and_rejects_duplicates() {
    let big_deal = Automation::new(
        "big",
        "big",
        "P",
        Trigger::FormSubmission { form_id: Some("F1".into()) },
        vec![move_to("S3")],
    )
    .with_conditions(ConditionGroup {
        logic: Logic::And,
        rules: vec![ConditionRule::new("form:Intake.budget", "greater_than", 1000)],
    });
    let b = board(vec![big_deal], card_in("S1")).await;

    let outcome = b.engine.submit_form(intake("5000")).await.unwrap();

    assert_eq!(outcome.submission.form_name, "Intake");
    assert_eq!(outcome.report.automations_executed, vec!["big"]);
    assert_eq!(b.store.card("C").await.unwrap().stage_id, "S3");

    let again = b.engine.submit_form(intake("10")).await;
    assert!(matches!(again, Err(EngineError::DuplicateSubmission { .. })));
}

#[tokio::test]
async fn form_of_another_pipe_is_rejected() {
    let b = board(vec![], card_in("S1")).await;
    let mut other = Pipe::new("Q", "Hiring");
    other.forms = vec![Form { id: "F9".into(), name: "Referral".into(), stage_id: None }];
    b.store.put_pipe(other).await;

    let foreign = NewFormSubmission { form_id: "F9".into(), ..intake("1") };
    let err = b.engine.submit_form(foreign).await.unwrap_err();

    assert!(matches!(err, EngineError::InvalidEvent(_)), "{err}");
    assert!(b.store.card("C").await.unwrap().form_submissions.is_empty());
}

#[tokio::test]
async fn manual_automation_runs_only_on_request() {
    let manual = Automation::new("m", "Escalate", "P", Trigger::Manual, vec![move_to("S2")]);
    let automatic = on_enter("auto", "S1", vec![]);
    let b = board(vec![manual, automatic], card_in("S1")).await;

    let dispatched = b
        .engine
        .dispatch_event(Event::new(TriggerKind::Manual, "P", "C"))
        .await
        .unwrap();
    assert!(dispatched.automations_executed.is_empty());

    let report = b.engine.run_manual("P", "C", "m").await.unwrap();
    assert_eq!(report.automations_executed, vec!["Escalate"]);
    assert_eq!(report.cascaded.len(), 1);

    assert!(matches!(
        b.engine.run_manual("P", "C", "auto").await,
        Err(EngineError::InvalidEvent(_))
    ));
    assert!(matches!(
        b.engine.run_manual("P", "C", "missing").await,
        Err(EngineError::AutomationNotFound(_))
    ));
}

#[tokio::test]
async fn field_value_trigger_fires_on_matching_value() {
    let hot = Automation::new(
        "hot",
        "hot",
        "P",
        Trigger::CardFieldValue(ConditionRule::new("score", "greater_than", 80)),
        vec![move_to("S3")],
    );
    let b = board(vec![hot], card_in("S1").with_field("score", 92)).await;

    let report = b
        .engine
        .dispatch_event(Event::new(TriggerKind::CardFieldValue, "P", "C"))
        .await
        .unwrap();

    assert_eq!(report.automations_executed, vec!["hot"]);
    assert_eq!(b.store.card("C").await.unwrap().stage_id, "S3");
}

#[tokio::test]
async fn stage_owned_automation_only_fires_in_its_stage() {
    let mut owned = Automation::new(
        "owned",
        "owned",
        "P",
        Trigger::FormSubmission { form_id: None },
        vec![Action::UpdateField { field_key: "seen".into(), value: json!("yes") }],
    );
    owned.owner = OwnerRef::Stage("S2".into());
    let b = board(vec![owned], card_in("S1")).await;

    let report = b.engine.submit_form(intake("1")).await.unwrap().report;

    assert_eq!(report.automations_found, 1);
    assert_eq!(report.automations_matched, 0);
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_notifier_never_fails_the_dispatch() {
    let notifier = MockNotifier::failing("platform down");
    let b = board(vec![on_enter("greet", "S2", vec![email("T1")])], card_in("S2")).await;
    let engine = Orchestrator::new(
        b.store.clone(),
        Arc::new(b.email.clone()),
        Arc::new(MockSmsTransport::accepting()),
        EngineConfig::default(),
    )
    .with_notifier(Arc::new(notifier.clone()));

    let report = engine.dispatch_event(enters("S2")).await.unwrap();
    assert!(report.success);

    for _ in 0..10 {
        if !notifier.summaries().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let summaries = notifier.summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["automationsExecuted"], json!(["greet"]));
    assert_eq!(summaries[0]["triggerType"], json!("card_enters_stage"));
}
