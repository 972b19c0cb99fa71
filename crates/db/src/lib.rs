//! `db` crate: Postgres storage for pipes, cards, automations and message logs.
//!
//! Row structs mirror the tables in `migrations/`; repository functions run
//! one SQL statement each against any `PgExecutor` (pool or transaction).
//! Decoding JSONB columns into domain types is the engine's job.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::{create_pool, run_migrations, DbPool};
