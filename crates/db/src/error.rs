//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflicting row: {0}")]
    Conflict(String),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Map constraint violations on a write: unique → [`DbError::Conflict`],
    /// foreign key → [`DbError::NotFound`]. Everything else passes through.
    pub fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DbError::Conflict(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return DbError::NotFound;
            }
        }
        DbError::Sqlx(err)
    }
}
