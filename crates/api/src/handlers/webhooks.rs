//! Form-submission intake. Payloads arrive already normalised by whatever
//! form provider sits in front of this service.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use engine::models::{FormSubmission, NewFormSubmission};
use engine::DispatchReport;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmissionDto {
    pub card_id: String,
    pub form_id: String,
    #[serde(default)]
    pub responses: Map<String, Value>,
    #[serde(default)]
    pub submitter_email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub submission: FormSubmission,
    #[serde(flatten)]
    pub report: DispatchReport,
}

/// `POST /api/v1/webhooks/form-submission`
pub async fn form_submission(
    State(state): State<AppState>,
    Json(dto): Json<FormSubmissionDto>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    if dto.card_id.trim().is_empty() || dto.form_id.trim().is_empty() {
        return Err(ApiError::BadRequest("cardId and formId are required".into()));
    }

    let outcome = state
        .engine
        .submit_form(NewFormSubmission {
            card_id: dto.card_id,
            form_id: dto.form_id,
            responses: dto.responses,
            submitter_email: dto.submitter_email.filter(|e| !e.trim().is_empty()),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            submission: outcome.submission,
            report: outcome.report,
        }),
    ))
}
