//! Repository layer.
//!
//! # Responsibility
//! - Provide the generic CRUD engine shared by every record type.
//! - Expose read-only schema introspection helpers.
//!
//! # Invariants
//! - Introspection never fails loudly; everything else propagates errors.

pub mod introspect;
mod repository;

pub use introspect::{get_column_info, get_columns, get_primary_key, ColumnInfo};
pub use repository::{Changes, RepoError, RepoResult, Repository, RepositoryDef};
