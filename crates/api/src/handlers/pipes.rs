use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use engine::duplicate::copy_pipe;
use engine::Pipe;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DuplicatePipeDto {
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /api/v1/pipes/{pipe_id}/duplicate`
pub async fn duplicate(
    Path(pipe_id): Path<String>,
    State(state): State<AppState>,
    Json(dto): Json<DuplicatePipeDto>,
) -> Result<(StatusCode, Json<Pipe>), ApiError> {
    let name = match dto.name.filter(|n| !n.trim().is_empty()) {
        Some(name) => name,
        None => {
            let source = state
                .store()
                .get_pipe_with_automations(&pipe_id)
                .await?
                .ok_or_else(|| engine::EngineError::PipeNotFound(pipe_id.clone()))?;
            format!("{} (copy)", source.name)
        }
    };

    let copy = copy_pipe(state.store().as_ref(), &pipe_id, &name).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}
