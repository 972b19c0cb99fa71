//! Automation CRUD operations.

use sqlx::PgExecutor;

use crate::{models::AutomationRow, DbError};

/// All automations of a pipe, both pipe- and stage-attached, in execution
/// order.
pub async fn list_automations<'e>(
    db: impl PgExecutor<'e>,
    pipe_id: &str,
) -> Result<Vec<AutomationRow>, DbError> {
    let rows = sqlx::query_as::<_, AutomationRow>(
        r#"
        SELECT id, pipe_id, owner_stage_id, name, enabled, trigger, conditions, actions, position
        FROM automations
        WHERE pipe_id = $1
        ORDER BY position ASC, name ASC
        "#,
    )
    .bind(pipe_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Insert an automation or replace the stored definition with the same id.
pub async fn upsert_automation<'e>(
    db: impl PgExecutor<'e>,
    row: &AutomationRow,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO automations
            (id, pipe_id, owner_stage_id, name, enabled, trigger, conditions, actions, position)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE SET
            owner_stage_id = EXCLUDED.owner_stage_id,
            name = EXCLUDED.name,
            enabled = EXCLUDED.enabled,
            trigger = EXCLUDED.trigger,
            conditions = EXCLUDED.conditions,
            actions = EXCLUDED.actions,
            position = EXCLUDED.position
        "#,
    )
    .bind(&row.id)
    .bind(&row.pipe_id)
    .bind(&row.owner_stage_id)
    .bind(&row.name)
    .bind(row.enabled)
    .bind(&row.trigger)
    .bind(&row.conditions)
    .bind(&row.actions)
    .bind(row.position)
    .execute(db)
    .await
    .map_err(DbError::from_write)?;
    Ok(())
}

/// Permanently delete an automation.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_automation<'e>(
    db: impl PgExecutor<'e>,
    pipe_id: &str,
    id: &str,
) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM automations WHERE id = $1 AND pipe_id = $2")
        .bind(id)
        .bind(pipe_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
