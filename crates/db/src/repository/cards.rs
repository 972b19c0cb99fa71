//! Card and card-field queries.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::{
    models::{CardFieldRow, CardRow},
    DbError,
};

pub async fn get_card<'e>(db: impl PgExecutor<'e>, id: &str) -> Result<CardRow, DbError> {
    sqlx::query_as::<_, CardRow>(
        r#"
        SELECT id, pipe_id, stage_id, title, description, created_at, updated_at
        FROM cards
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(DbError::NotFound)
}

pub async fn list_card_fields<'e>(
    db: impl PgExecutor<'e>,
    card_id: &str,
) -> Result<Vec<CardFieldRow>, DbError> {
    let rows = sqlx::query_as::<_, CardFieldRow>(
        r#"
        SELECT card_id, key, field_type, value, position
        FROM card_fields
        WHERE card_id = $1
        ORDER BY position ASC, key ASC
        "#,
    )
    .bind(card_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Point the card at `stage_id` and bump `updated_at`.
///
/// Returns the new `updated_at`, or `DbError::NotFound` if the card is gone.
pub async fn update_card_stage<'e>(
    db: impl PgExecutor<'e>,
    card_id: &str,
    stage_id: &str,
) -> Result<DateTime<Utc>, DbError> {
    let now = Utc::now();
    let result = sqlx::query("UPDATE cards SET stage_id = $1, updated_at = $2 WHERE id = $3")
        .bind(stage_id)
        .bind(now)
        .bind(card_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(now)
}

/// Insert or overwrite a field. New keys are appended after the card's
/// existing fields.
pub async fn upsert_card_field<'e>(
    db: impl PgExecutor<'e>,
    card_id: &str,
    key: &str,
    field_type: &str,
    value: &serde_json::Value,
) -> Result<CardFieldRow, DbError> {
    let row = sqlx::query_as::<_, CardFieldRow>(
        r#"
        INSERT INTO card_fields (card_id, key, field_type, value, position)
        VALUES (
            $1, $2, $3, $4,
            (SELECT COALESCE(MAX(position) + 1, 0) FROM card_fields WHERE card_id = $1)
        )
        ON CONFLICT (card_id, key) DO UPDATE SET value = EXCLUDED.value, field_type = EXCLUDED.field_type
        RETURNING card_id, key, field_type, value, position
        "#,
    )
    .bind(card_id)
    .bind(key)
    .bind(field_type)
    .bind(value)
    .fetch_one(db)
    .await
    .map_err(DbError::from_write)?;
    Ok(row)
}
