//! Data-access layer over embedded SQLite.
//!
//! A [`Database`] owns one connection and a registry of record/repository
//! bindings; a [`Repository`] provides transactional CRUD with soft-delete
//! visibility for any [`Record`] type.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod transform;

pub use config::DatabaseConfig;
pub use db::{Database, DbError, DbResult, ModelBinding, TransactionScope};
pub use logging::{default_log_level, init_console_logging, init_logging, logging_status};
pub use model::{FieldDef, FieldKind, FieldMap, FieldValue, Record, RecordMeta, Timestamp};
pub use repo::{Changes, ColumnInfo, RepoError, RepoResult, Repository, RepositoryDef};
pub use transform::{TransformError, TransformResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
