//! Sent email/SMS log.

use sqlx::PgExecutor;

use crate::{models::MessageLogRow, DbError};

pub async fn insert_message_log<'e>(
    db: impl PgExecutor<'e>,
    row: &MessageLogRow,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO message_logs
            (id, card_id, channel, direction, recipient, subject, body, provider_id, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&row.id)
    .bind(&row.card_id)
    .bind(&row.channel)
    .bind(&row.direction)
    .bind(&row.recipient)
    .bind(&row.subject)
    .bind(&row.body)
    .bind(&row.provider_id)
    .bind(&row.status)
    .bind(row.created_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Messages sent for a card, oldest first.
pub async fn list_message_logs<'e>(
    db: impl PgExecutor<'e>,
    card_id: &str,
) -> Result<Vec<MessageLogRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageLogRow>(
        r#"
        SELECT id, card_id, channel, direction, recipient, subject, body, provider_id, status, created_at
        FROM message_logs
        WHERE card_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(card_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
