//! Form submission queries.
//!
//! Uniqueness per (card, form) is enforced by the table constraint; the
//! insert is a conditional write, never a read-then-write. A form can only be
//! submitted for cards of its own pipe.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::{models::FormSubmissionRow, DbError};

/// Submissions of a card, newest first, joined with their form names.
pub async fn list_submissions<'e>(
    db: impl PgExecutor<'e>,
    card_id: &str,
) -> Result<Vec<FormSubmissionRow>, DbError> {
    let rows = sqlx::query_as::<_, FormSubmissionRow>(
        r#"
        SELECT s.id, s.card_id, s.form_id, f.name AS form_name,
               s.responses, s.submitter_email, s.submitted_at
        FROM form_submissions s
        JOIN forms f ON f.id = s.form_id
        WHERE s.card_id = $1
        ORDER BY s.submitted_at DESC
        "#,
    )
    .bind(card_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Record a submission.
///
/// The form must belong to the card's pipe. Returns `DbError::NotFound` if
/// it does not (or either row is missing) and `DbError::Conflict` if the card
/// already has a submission for this form.
pub async fn create_submission<'e, E>(
    db: E,
    id: &str,
    card_id: &str,
    form_id: &str,
    responses: &serde_json::Value,
    submitter_email: Option<&str>,
    submitted_at: DateTime<Utc>,
) -> Result<FormSubmissionRow, DbError>
where
    E: PgExecutor<'e> + Copy,
{
    let inserted = sqlx::query_as::<_, FormSubmissionRow>(
        r#"
        WITH target AS (
            SELECT f.id, f.name
            FROM forms f
            JOIN cards c ON c.pipe_id = f.pipe_id
            WHERE c.id = $2 AND f.id = $3
        ),
        inserted AS (
            INSERT INTO form_submissions
                (id, card_id, form_id, responses, submitter_email, submitted_at)
            SELECT $1, $2, t.id, $4, $5, $6 FROM target t
            ON CONFLICT (card_id, form_id) DO NOTHING
            RETURNING id, card_id, form_id, responses, submitter_email, submitted_at
        )
        SELECT i.id, i.card_id, i.form_id, t.name AS form_name,
               i.responses, i.submitter_email, i.submitted_at
        FROM inserted i
        JOIN target t ON t.id = i.form_id
        "#,
    )
    .bind(id)
    .bind(card_id)
    .bind(form_id)
    .bind(responses)
    .bind(submitter_email)
    .bind(submitted_at)
    .fetch_optional(db)
    .await
    .map_err(DbError::from_write)?;

    if let Some(row) = inserted {
        return Ok(row);
    }

    // Nothing inserted: either the form is outside the card's pipe or the
    // unique constraint kept the earlier submission.
    let in_pipe: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM forms f
            JOIN cards c ON c.pipe_id = f.pipe_id
            WHERE c.id = $1 AND f.id = $2
        )
        "#,
    )
    .bind(card_id)
    .bind(form_id)
    .fetch_one(db)
    .await?;

    if in_pipe {
        Err(DbError::Conflict(format!("form {form_id} already submitted for card {card_id}")))
    } else {
        Err(DbError::NotFound)
    }
}
