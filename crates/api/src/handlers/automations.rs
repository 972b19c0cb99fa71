use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use engine::{validate_automation, Automation, DispatchReport, EngineError};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualRunDto {
    pub card_id: String,
}

/// `GET /api/v1/pipes/{pipe_id}/automations`
pub async fn list(
    Path(pipe_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Automation>>, ApiError> {
    let pipe = state
        .store()
        .get_pipe_with_automations(&pipe_id)
        .await?
        .ok_or(EngineError::PipeNotFound(pipe_id))?;

    let mut automations = pipe.automations;
    automations.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
    Ok(Json(automations))
}

/// `PUT /api/v1/pipes/{pipe_id}/automations/{automation_id}`
///
/// Creates or replaces the automation after validating it against the pipe.
pub async fn save(
    Path((pipe_id, automation_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(mut automation): Json<Automation>,
) -> Result<Json<Automation>, ApiError> {
    automation.id = automation_id;

    let pipe = state
        .store()
        .get_pipe_with_automations(&pipe_id)
        .await?
        .ok_or_else(|| EngineError::PipeNotFound(pipe_id.clone()))?;

    validate_automation(&automation, &pipe)?;
    state.store().save_automation(&pipe_id, &automation).await?;

    tracing::info!(pipe_id = %pipe_id, automation_id = %automation.id, "automation saved");
    Ok(Json(automation))
}

/// `DELETE /api/v1/pipes/{pipe_id}/automations/{automation_id}`
pub async fn delete(
    Path((pipe_id, automation_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store().delete_automation(&pipe_id, &automation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/pipes/{pipe_id}/automations/{automation_id}/run`
pub async fn run(
    Path((pipe_id, automation_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(dto): Json<ManualRunDto>,
) -> Result<Json<DispatchReport>, ApiError> {
    let report = state
        .engine
        .run_manual(&pipe_id, &dto.card_id, &automation_id)
        .await?;
    Ok(Json(report))
}
