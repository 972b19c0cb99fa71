//! Postgres connection pool and embedded board migrations.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Shared Postgres pool used by every repository function.
pub type DbPool = PgPool;

/// Connect to `database_url` with at most `max_connections` connections.
///
/// Acquiring a connection is bounded so a saturated pool surfaces as an error
/// on the request instead of a hung dispatch.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!(max_connections, "connecting to board database");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the SQL migrations under `<workspace>/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("applying board migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
