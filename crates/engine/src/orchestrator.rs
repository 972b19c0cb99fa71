//! Automation orchestrator.
//!
//! One dispatch per external event:
//! 1. Validate the event and load the pipe and card fresh from the store.
//! 2. Match the pipe's automations against the event.
//! 3. For each match, in `(position, name)` order, evaluate its conditions
//!    against the card as it is at that moment and run its actions.
//! 4. Every stage a `move_card` entered is dispatched as `card_enters_stage`
//!    for that stage, in move order, up to `max_cascade_depth` hops. A store
//!    failure during a hop ends the chain; the report keeps what already ran.
//!
//! Dispatches for the same card are serialised through [`CardLocks`].

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{error, info, instrument, warn};

use queue::CardLocks;
use transport::{EmailTransport, EventNotifier, SmsTransport};

use crate::actions::ActionExecutor;
use crate::conditions::{evaluate, CardFieldLookup};
use crate::config::EngineConfig;
use crate::error::{EngineError, StoreError};
use crate::event::{AutomationRun, CascadeStep, DispatchReport, Event, EventPayload};
use crate::models::{Automation, Card, FormSubmission, NewFormSubmission, Pipe, Trigger, TriggerKind};
use crate::store::BoardStore;
use crate::triggers::{match_automations, MatchContext};

/// Result of accepting a form submission.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub submission: FormSubmission,
    pub report: DispatchReport,
}

/// One level of a dispatch: the original event or a cascade hop.
struct Step {
    kind: TriggerKind,
    stage_id: String,
    form_id: Option<String>,
    depth: u32,
    /// Run exactly this automation instead of matching (manual runs).
    only: Option<String>,
}

pub struct Orchestrator {
    store: Arc<dyn BoardStore>,
    executor: ActionExecutor,
    notifier: Option<Arc<dyn EventNotifier>>,
    locks: CardLocks,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn BoardStore>,
        email: Arc<dyn EmailTransport>,
        sms: Arc<dyn SmsTransport>,
        config: EngineConfig,
    ) -> Self {
        Self {
            executor: ActionExecutor::new(store.clone(), email, sms, config.clone()),
            store,
            notifier: None,
            locks: CardLocks::new(),
            config,
        }
    }

    /// Forward a summary of every dispatch that executed something.
    pub fn with_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    /// Dispatch a raw event. Structural failures come back as a report with
    /// `success: false`.
    pub async fn dispatch(&self, payload: EventPayload) -> DispatchReport {
        let result = match Event::try_from(payload) {
            Ok(event) => self.dispatch_event(event).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| DispatchReport::failed(&e))
    }

    /// Dispatch a validated event, cascades included.
    ///
    /// # Errors
    /// Only structural failures: unknown pipe or card, a card outside the
    /// pipe, or a store failure while loading them. Action failures are in
    /// the report.
    #[instrument(skip(self, event), fields(trigger = %event.kind, card_id = %event.card_id, pipe_id = %event.pipe_id))]
    pub async fn dispatch_event(&self, event: Event) -> Result<DispatchReport, EngineError> {
        let _turn = self.locks.acquire(&event.card_id).await;
        self.run(&event, None).await
    }

    /// Record a form submission for a card and dispatch `form_submission`.
    ///
    /// # Errors
    /// [`EngineError::DuplicateSubmission`] if the card already has a
    /// submission for this form; structural errors as for
    /// [`Orchestrator::dispatch_event`].
    #[instrument(skip(self, submission), fields(card_id = %submission.card_id, form_id = %submission.form_id))]
    pub async fn submit_form(&self, submission: NewFormSubmission) -> Result<SubmissionOutcome, EngineError> {
        let _turn = self.locks.acquire(&submission.card_id).await;

        let card = self
            .store
            .get_card(&submission.card_id)
            .await?
            .ok_or_else(|| EngineError::CardNotFound(submission.card_id.clone()))?;

        let stored = match self.store.create_form_submission(&submission).await {
            Ok(s) => s,
            Err(StoreError::Conflict(_)) => {
                return Err(EngineError::DuplicateSubmission {
                    card_id: submission.card_id,
                    form_id: submission.form_id,
                })
            }
            Err(StoreError::NotFound(what)) => {
                return Err(EngineError::InvalidEvent(format!("{what} not found")))
            }
            Err(e) => return Err(e.into()),
        };
        info!(submission_id = %stored.id, "form submission recorded");

        let event = Event::new(TriggerKind::FormSubmission, &card.pipe_id, &card.id)
            .with_stage(&card.stage_id)
            .with_form(&stored.form_id);
        let report = self.run(&event, None).await?;

        Ok(SubmissionOutcome { submission: stored, report })
    }

    /// Run one `manual` automation on a card. Its conditions still apply and
    /// any move it makes cascades as usual.
    ///
    /// # Errors
    /// [`EngineError::AutomationNotFound`] if the pipe has no such
    /// automation; [`EngineError::InvalidEvent`] if it is disabled or not a
    /// manual automation.
    #[instrument(skip(self))]
    pub async fn run_manual(
        &self,
        pipe_id: &str,
        card_id: &str,
        automation_id: &str,
    ) -> Result<DispatchReport, EngineError> {
        let _turn = self.locks.acquire(card_id).await;
        let event = Event::new(TriggerKind::Manual, pipe_id, card_id);
        self.run(&event, Some(automation_id)).await
    }

    // -----------------------------------------------------------------------
    // The dispatch loop. Callers hold the card's turn.
    // -----------------------------------------------------------------------

    async fn run(&self, event: &Event, only: Option<&str>) -> Result<DispatchReport, EngineError> {
        let (pipe, mut card) = self.load(event).await.inspect_err(|e| {
            error!("dispatch aborted: {e}");
        })?;

        if let Some(id) = only {
            let automation = pipe
                .automation(id)
                .ok_or_else(|| EngineError::AutomationNotFound(id.to_string()))?;
            if !automation.enabled {
                return Err(EngineError::InvalidEvent(format!("automation {id} is disabled")));
            }
            if automation.trigger != Trigger::Manual {
                return Err(EngineError::InvalidEvent(format!("automation {id} is not a manual automation")));
            }
        }

        let mut report = DispatchReport::default();
        let mut steps = VecDeque::from([Step {
            kind: event.kind,
            stage_id: event.context.stage_id.clone().unwrap_or_else(|| card.stage_id.clone()),
            form_id: event.context.form_id.clone(),
            depth: 0,
            only: only.map(str::to_string),
        }]);
        let mut pipe = pipe;

        while let Some(step) = steps.pop_front() {
            // Definitions may change between hops; reload them.
            if step.depth > 0 {
                match self.fresh_pipe(&event.pipe_id).await {
                    Ok(fresh) => pipe = fresh,
                    Err(e) => {
                        error!(depth = step.depth, stage_id = %step.stage_id, "cascade aborted: {e}");
                        report.cascade_error = Some(e.to_string());
                        break;
                    }
                }
            }

            let entered = self.run_step(&step, &pipe, &mut card, &mut report).await;
            let next_depth = step.depth + 1;

            for stage_id in entered {
                if next_depth > self.config.max_cascade_depth {
                    let err = EngineError::CascadeLimitExceeded {
                        limit: self.config.max_cascade_depth,
                        stage_id,
                    };
                    warn!("{err}");
                    report.cascade_error.get_or_insert_with(|| err.to_string());
                    break;
                }

                info!(depth = next_depth, stage_id = %stage_id, "cascading card_enters_stage");
                steps.push_back(Step {
                    kind: TriggerKind::CardEntersStage,
                    stage_id,
                    form_id: None,
                    depth: next_depth,
                    only: None,
                });
            }
        }

        info!(
            found = report.automations_found,
            matched = report.automations_matched,
            executed = report.automations_executed.len(),
            failed = report.automations_failed.len(),
            cascades = report.cascaded.len(),
            "dispatch complete"
        );

        self.notify(event, &report);
        Ok(report)
    }

    /// Match, evaluate and execute one level. Returns the stages the card
    /// entered, in order.
    async fn run_step(&self, step: &Step, pipe: &Pipe, card: &mut Card, report: &mut DispatchReport) -> Vec<String> {
        let mut ordered: Vec<&Automation> = match &step.only {
            Some(id) => pipe.automation(id).into_iter().collect(),
            None => {
                let lookup = CardFieldLookup::new(card);
                let ctx = MatchContext {
                    kind: step.kind,
                    stage_id: Some(&step.stage_id),
                    form_id: step.form_id.as_deref(),
                    lookup: &lookup,
                };
                let matches = match_automations(&ctx, &pipe.automations);
                report.automations_found += matches.found;
                matches.matched
            }
        };
        if step.only.is_some() {
            report.automations_found += ordered.len();
        }
        report.automations_matched += ordered.len();
        ordered.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));

        let mut entered = Vec::new();
        let mut executed = Vec::new();

        for automation in ordered {
            if !evaluate(automation.conditions.as_ref(), &CardFieldLookup::new(card)) {
                info!(automation = %automation.name, "conditions not met, skipping");
                report.automations_skipped.push(automation.name.clone());
                continue;
            }

            info!(automation = %automation.name, depth = step.depth, "executing automation");
            let outcome = self
                .executor
                .execute(automation, pipe, card, step.form_id.as_deref())
                .await;
            entered.extend(outcome.entered);

            executed.push(automation.name.clone());
            report.record_run(AutomationRun {
                automation_id: automation.id.clone(),
                name: automation.name.clone(),
                depth: step.depth,
                actions: outcome.results,
            });
        }

        if step.depth > 0 {
            report.cascaded.push(CascadeStep {
                depth: step.depth,
                stage_id: step.stage_id.clone(),
                automations_executed: executed,
            });
        }

        entered
    }

    async fn load(&self, event: &Event) -> Result<(Pipe, Card), EngineError> {
        let pipe = self.fresh_pipe(&event.pipe_id).await?;
        let card = self
            .store
            .get_card(&event.card_id)
            .await?
            .ok_or_else(|| EngineError::CardNotFound(event.card_id.clone()))?;

        if card.pipe_id != pipe.id {
            return Err(EngineError::InvalidEvent(format!(
                "card {} does not belong to pipe {}",
                card.id, pipe.id
            )));
        }
        Ok((pipe, card))
    }

    async fn fresh_pipe(&self, pipe_id: &str) -> Result<Pipe, EngineError> {
        self.store
            .get_pipe_with_automations(pipe_id)
            .await?
            .ok_or_else(|| EngineError::PipeNotFound(pipe_id.to_string()))
    }

    /// Fire-and-forget summary to the configured notifier.
    fn notify(&self, event: &Event, report: &DispatchReport) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        if report.automations_executed.is_empty() {
            return;
        }

        let summary = summary(event, report);
        let limit = self.config.transport_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(limit, notifier.notify(&summary)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("event notification failed: {e}"),
                Err(_) => warn!("event notification timed out"),
            }
        });
    }
}

fn summary(event: &Event, report: &DispatchReport) -> Value {
    let mut body = Map::new();
    body.insert("triggerType".into(), json!(event.kind));
    body.insert("cardId".into(), json!(event.card_id));
    body.insert("pipeId".into(), json!(event.pipe_id));
    body.insert("automationsExecuted".into(), json!(report.automations_executed));
    body.insert("automationsFailed".into(), json!(report.automations_failed));
    body.insert("cascaded".into(), json!(report.cascaded));
    Value::Object(body)
}
