use axum::{
    extract::{Path, State},
    Json,
};

use engine::models::MessageLog;

use crate::error::ApiError;
use crate::AppState;

/// `GET /api/v1/cards/{card_id}/messages`: emails and SMS sent for a card.
pub async fn messages(
    Path(card_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<MessageLog>>, ApiError> {
    let messages = state.store().list_messages(&card_id).await?;
    Ok(Json(messages))
}
