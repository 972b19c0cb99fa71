//! Pipe, stage, form and global-variable queries.

use sqlx::PgExecutor;

use crate::{
    models::{FormRow, GlobalVariableRow, PipeRow, StageRow},
    DbError,
};

/// Fetch a single pipe by its primary key.
pub async fn get_pipe<'e>(db: impl PgExecutor<'e>, id: &str) -> Result<PipeRow, DbError> {
    sqlx::query_as::<_, PipeRow>("SELECT id, name, created_at FROM pipes WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(DbError::NotFound)
}

/// Stages of a pipe in display order.
pub async fn list_stages<'e>(
    db: impl PgExecutor<'e>,
    pipe_id: &str,
) -> Result<Vec<StageRow>, DbError> {
    let rows = sqlx::query_as::<_, StageRow>(
        r#"
        SELECT id, pipe_id, name, position, background_color
        FROM stages
        WHERE pipe_id = $1
        ORDER BY position ASC, name ASC
        "#,
    )
    .bind(pipe_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_forms<'e>(
    db: impl PgExecutor<'e>,
    pipe_id: &str,
) -> Result<Vec<FormRow>, DbError> {
    let rows = sqlx::query_as::<_, FormRow>(
        "SELECT id, pipe_id, stage_id, name FROM forms WHERE pipe_id = $1 ORDER BY name ASC",
    )
    .bind(pipe_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_global_variables<'e>(
    db: impl PgExecutor<'e>,
    pipe_id: &str,
) -> Result<Vec<GlobalVariableRow>, DbError> {
    let rows = sqlx::query_as::<_, GlobalVariableRow>(
        "SELECT pipe_id, name, value FROM global_variables WHERE pipe_id = $1 ORDER BY name ASC",
    )
    .bind(pipe_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn insert_pipe<'e>(db: impl PgExecutor<'e>, row: &PipeRow) -> Result<(), DbError> {
    sqlx::query("INSERT INTO pipes (id, name, created_at) VALUES ($1, $2, $3)")
        .bind(&row.id)
        .bind(&row.name)
        .bind(row.created_at)
        .execute(db)
        .await
        .map_err(DbError::from_write)?;
    Ok(())
}

pub async fn insert_stage<'e>(db: impl PgExecutor<'e>, row: &StageRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO stages (id, pipe_id, name, position, background_color)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&row.id)
    .bind(&row.pipe_id)
    .bind(&row.name)
    .bind(row.position)
    .bind(&row.background_color)
    .execute(db)
    .await
    .map_err(DbError::from_write)?;
    Ok(())
}

pub async fn insert_form<'e>(db: impl PgExecutor<'e>, row: &FormRow) -> Result<(), DbError> {
    sqlx::query("INSERT INTO forms (id, pipe_id, stage_id, name) VALUES ($1, $2, $3, $4)")
        .bind(&row.id)
        .bind(&row.pipe_id)
        .bind(&row.stage_id)
        .bind(&row.name)
        .execute(db)
        .await
        .map_err(DbError::from_write)?;
    Ok(())
}

pub async fn upsert_global_variable<'e>(
    db: impl PgExecutor<'e>,
    row: &GlobalVariableRow,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO global_variables (pipe_id, name, value)
        VALUES ($1, $2, $3)
        ON CONFLICT (pipe_id, name) DO UPDATE SET value = EXCLUDED.value
        "#,
    )
    .bind(&row.pipe_id)
    .bind(&row.name)
    .bind(&row.value)
    .execute(db)
    .await?;
    Ok(())
}
