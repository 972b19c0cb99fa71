//! Repository functions, one function per database operation.
//!
//! Every function takes a `&DbPool` (or an open transaction) and returns a
//! `Result<T, DbError>`. SQL only; decoding into domain types happens in the engine.

pub mod pipes;
pub mod cards;
pub mod automations;
pub mod templates;
pub mod submissions;
pub mod messages;
