//! SQLite connection, registry and transaction boundaries.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Hold the record/repository registry and create registered tables.
//! - Provide atomic execution scopes over a live connection.
//!
//! # Invariants
//! - Connection-dependent operations fail with `NotConfigured` before
//!   `Database::configure` succeeds.
//! - Engine errors are wrapped, never rewritten.

use thiserror::Error;

mod database;
mod open;
pub mod transaction;

pub use database::{Database, ModelBinding};
pub use open::{open_db, open_db_in_memory, IN_MEMORY_PATH};
pub use transaction::TransactionScope;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database is not configured; call `configure` first")]
    NotConfigured,
    #[error("no binding registered under key `{0}`")]
    UnknownKey(String),
    #[error("key `{key}` is bound to `{registered}`, not `{requested}`")]
    BindingMismatch {
        key: String,
        registered: &'static str,
        requested: &'static str,
    },
    #[error("invalid schema for table `{table}`: {reason}")]
    InvalidSchema { table: &'static str, reason: String },
    #[error("invalid savepoint name `{0}`")]
    InvalidSavepointName(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}
