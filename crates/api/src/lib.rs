//! `api` crate: HTTP surface of the board automation engine.
//!
//! Exposes:
//!   GET    /health
//!   POST   /api/v1/events
//!   POST   /api/v1/webhooks/form-submission
//!   GET    /api/v1/pipes/{pipe_id}/automations
//!   PUT    /api/v1/pipes/{pipe_id}/automations/{automation_id}
//!   DELETE /api/v1/pipes/{pipe_id}/automations/{automation_id}
//!   POST   /api/v1/pipes/{pipe_id}/automations/{automation_id}/run
//!   POST   /api/v1/pipes/{pipe_id}/duplicate
//!   GET    /api/v1/cards/{card_id}/messages

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use engine::{BoardStore, Orchestrator};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(engine: Orchestrator) -> Self {
        Self { engine: Arc::new(engine) }
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        self.engine.store()
    }
}

pub fn router(state: AppState) -> Router {
    use handlers::{automations, cards, events, pipes, webhooks};

    let api = Router::new()
        .route("/events", post(events::dispatch))
        .route("/webhooks/form-submission", post(webhooks::form_submission))
        .route("/pipes/{pipe_id}/automations", get(automations::list))
        .route(
            "/pipes/{pipe_id}/automations/{automation_id}",
            put(automations::save).delete(automations::delete),
        )
        .route("/pipes/{pipe_id}/automations/{automation_id}/run", post(automations::run))
        .route("/pipes/{pipe_id}/duplicate", post(pipes::duplicate))
        .route("/cards/{card_id}/messages", get(cards::messages));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use engine::models::{Action, Automation, Card, Form, Stage, Trigger};
    use engine::{EngineConfig, MemoryStore, Pipe};
    use tower::ServiceExt;
    use transport::mock::{MockEmailTransport, MockSmsTransport};

    async fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut pipe = Pipe::new("P", "Sales");
        pipe.stages = vec![Stage::new("S1", "New", 0), Stage::new("S2", "Done", 1)];
        pipe.forms = vec![Form { id: "F1".into(), name: "Intake".into(), stage_id: None }];
        pipe.automations = vec![Automation::new(
            "a1",
            "Finish",
            "P",
            Trigger::FormSubmission { form_id: Some("F1".into()) },
            vec![Action::MoveCard { target_stage_id: "S2".into() }],
        )];
        store.put_pipe(pipe).await;
        store.put_card(Card::new("C", "P", "S1", "Deal")).await;

        let engine = Orchestrator::new(
            store.clone(),
            Arc::new(MockEmailTransport::accepting()),
            Arc::new(MockSmsTransport::accepting()),
            EngineConfig::default(),
        );
        (router(AppState::new(engine)), store)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn event_without_card_is_bad_request() {
        let (app, _) = app().await;
        let response = app
            .oneshot(post_json("/api/v1/events", json!({ "triggerType": "manual", "pipeId": "P" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("cardId"));
    }

    #[tokio::test]
    async fn event_dispatch_returns_report() {
        let (app, _) = app().await;
        let response = app
            .oneshot(post_json(
                "/api/v1/events",
                json!({ "triggerType": "card_enters_stage", "cardId": "C", "pipeId": "P", "context": { "stageId": "S1" } }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["automationsFound"], json!(0));
    }

    #[tokio::test]
    async fn form_submission_runs_automations_then_conflicts() {
        let (app, store) = app().await;
        let submit = || post_json(
            "/api/v1/webhooks/form-submission",
            json!({ "cardId": "C", "formId": "F1", "responses": { "budget": "10" } }),
        );

        let response = app.clone().oneshot(submit()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["automationsExecuted"], json!(["Finish"]));
        assert_eq!(store.card("C").await.unwrap().stage_id, "S2");

        let again = app.oneshot(submit()).await.unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn invalid_automation_is_unprocessable() {
        let (app, store) = app().await;
        let automation = json!({
            "id": "ignored",
            "name": "Broken",
            "owner": { "type": "pipe", "id": "P" },
            "trigger": { "type": "card_enters_stage", "config": { "stage_id": "S1" } },
            "actions": [ { "type": "move_card", "config": { "target_stage_id": "S9" } } ]
        });
        let request = Request::builder()
            .uri("/api/v1/pipes/P/automations/a2")
            .method("PUT")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&automation).unwrap()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(store.pipe("P").await.unwrap().automations.len(), 1);
    }

    #[tokio::test]
    async fn deleting_unknown_automation_is_not_found() {
        let (app, _) = app().await;
        let request = Request::builder()
            .uri("/api/v1/pipes/P/automations/nope")
            .method("DELETE")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_pipe_defaults_the_name() {
        let (app, store) = app().await;
        let response = app
            .oneshot(post_json("/api/v1/pipes/P/duplicate", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["name"], json!("Sales (copy)"));
        let id = body["id"].as_str().unwrap();
        assert!(store.pipe(id).await.is_some());
    }
}
