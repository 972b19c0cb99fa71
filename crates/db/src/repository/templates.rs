//! Email and SMS template queries.

use sqlx::PgExecutor;

use crate::{
    models::{EmailTemplateRow, SmsTemplateRow},
    DbError,
};

pub async fn list_email_templates<'e>(
    db: impl PgExecutor<'e>,
    pipe_id: &str,
) -> Result<Vec<EmailTemplateRow>, DbError> {
    let rows = sqlx::query_as::<_, EmailTemplateRow>(
        r#"
        SELECT id, pipe_id, name, subject, body, from_email, from_name, to_email, cc, bcc
        FROM email_templates
        WHERE pipe_id = $1
        ORDER BY name ASC
        "#,
    )
    .bind(pipe_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_sms_templates<'e>(
    db: impl PgExecutor<'e>,
    pipe_id: &str,
) -> Result<Vec<SmsTemplateRow>, DbError> {
    let rows = sqlx::query_as::<_, SmsTemplateRow>(
        "SELECT id, pipe_id, name, body, to_phone FROM sms_templates WHERE pipe_id = $1 ORDER BY name ASC",
    )
    .bind(pipe_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn insert_email_template<'e>(
    db: impl PgExecutor<'e>,
    row: &EmailTemplateRow,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO email_templates
            (id, pipe_id, name, subject, body, from_email, from_name, to_email, cc, bcc)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&row.id)
    .bind(&row.pipe_id)
    .bind(&row.name)
    .bind(&row.subject)
    .bind(&row.body)
    .bind(&row.from_email)
    .bind(&row.from_name)
    .bind(&row.to_email)
    .bind(&row.cc)
    .bind(&row.bcc)
    .execute(db)
    .await
    .map_err(DbError::from_write)?;
    Ok(())
}

pub async fn insert_sms_template<'e>(
    db: impl PgExecutor<'e>,
    row: &SmsTemplateRow,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO sms_templates (id, pipe_id, name, body, to_phone) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&row.id)
    .bind(&row.pipe_id)
    .bind(&row.name)
    .bind(&row.body)
    .bind(&row.to_phone)
    .execute(db)
    .await
    .map_err(DbError::from_write)?;
    Ok(())
}
