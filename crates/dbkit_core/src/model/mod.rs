//! Record model shared by registry, repository and transformer.
//!
//! # Responsibility
//! - Define the `Record` contract every persisted entity implements.
//! - Provide dynamic field values and timestamp helpers.
//!
//! # Invariants
//! - Every record is identified by an integer `id` assigned on create.
//! - Soft deletion is a `deleted_at` timestamp, never a separate flag.

pub mod record;
pub mod timestamp;
pub mod value;

pub use record::{
    is_identifier, FieldDef, FieldKind, Record, RecordDescriptor, RecordMeta, CREATED_AT_COLUMN,
    DELETED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN,
};
pub use timestamp::Timestamp;
pub use value::{FieldMap, FieldValue};
