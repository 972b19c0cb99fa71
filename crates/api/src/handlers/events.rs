use axum::{extract::State, http::StatusCode, Json};

use engine::{DispatchReport, EngineError, Event, EventPayload};

use crate::error::ApiError;
use crate::AppState;

/// `POST /api/v1/events`: dispatch one board event and return the report.
pub async fn dispatch(
    State(state): State<AppState>,
    Json(payload): Json<EventPayload>,
) -> (StatusCode, Json<DispatchReport>) {
    let result = match Event::try_from(payload) {
        Ok(event) => state.engine.dispatch_event(event).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => (StatusCode::OK, Json(report)),
        Err(e) => failed(e),
    }
}

fn failed(err: EngineError) -> (StatusCode, Json<DispatchReport>) {
    let report = DispatchReport::failed(&err);
    (ApiError::from(err).status(), Json(report))
}
