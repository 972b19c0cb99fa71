//! HTTP mapping for engine errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use engine::{EngineError, StoreError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(e) => match e {
                EngineError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
                EngineError::PipeNotFound(_)
                | EngineError::CardNotFound(_)
                | EngineError::AutomationNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::DuplicateSubmission { .. } => StatusCode::CONFLICT,
                EngineError::InvalidAutomation { .. }
                | EngineError::DuplicateAutomationId(_)
                | EngineError::DuplicateStagePosition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::CascadeLimitExceeded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                EngineError::Store(s) => store_status(s),
            },
            ApiError::Store(s) => store_status(s),
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Malformed { .. } | StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}
