//! Record contract shared by every persisted entity.
//!
//! # Responsibility
//! - Describe a record type's table, declared columns and soft-delete support.
//! - Generate the DDL and SELECT list used by registry and repository.
//!
//! # Invariants
//! - Every table carries `id`, `created_at` and `updated_at`.
//! - `deleted_at` exists only when `Record::SOFT_DELETABLE` is true.
//! - Declared fields never reuse a reserved column name.

use super::timestamp::{parse_timestamp, Timestamp};
use super::value::{FieldMap, FieldValue};
use crate::transform::TransformResult;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const DELETED_AT_COLUMN: &str = "deleted_at";

const RESERVED_COLUMNS: &[&str] = &[
    ID_COLUMN,
    CREATED_AT_COLUMN,
    UPDATED_AT_COLUMN,
    DELETED_AT_COLUMN,
];

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Returns whether `value` is a plain SQL identifier.
pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Storage class of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    /// Stored as `0`/`1`.
    Boolean,
    /// Stored as ISO-8601 text.
    Timestamp,
    Blob,
}

impl FieldKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Timestamp => "TEXT",
            Self::Blob => "BLOB",
        }
    }

    /// Lowercase label used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Blob => "blob",
        }
    }

    /// Whether a non-null `value` can be stored in a column of this kind and
    /// read back. Mirrors the coercions of the `FieldMap` getters.
    pub fn accepts(self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::Integer, FieldValue::Integer(_)) => true,
            (Self::Real, FieldValue::Real(_) | FieldValue::Integer(_)) => true,
            (Self::Text, FieldValue::Text(_)) => true,
            (Self::Boolean, FieldValue::Boolean(_) | FieldValue::Integer(0 | 1)) => true,
            (Self::Timestamp, FieldValue::Timestamp(_)) => true,
            (Self::Timestamp, FieldValue::Text(text)) => parse_timestamp(text).is_some(),
            (Self::Blob, FieldValue::Blob(_)) => true,
            _ => false,
        }
    }
}

/// Declaration of one domain column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub unique: bool,
    /// Referenced table; the column points at its `id`.
    pub references: Option<&'static str>,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            unique: false,
            references: None,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, FieldKind::Real)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    pub const fn blob(name: &'static str) -> Self {
        Self::new(name, FieldKind::Blob)
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub const fn references(self, table: &'static str) -> Self {
        Self {
            references: Some(table),
            ..self
        }
    }

    fn column_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.kind.sql_type());
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(table) = self.references {
            sql.push_str(&format!(" REFERENCES \"{table}\" (\"{ID_COLUMN}\")"));
        }
        sql
    }
}

/// Lifecycle columns common to all records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordMeta {
    /// Assigned by the database on create.
    pub id: Option<i64>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    /// Always `None` for records without soft-delete support.
    pub deleted_at: Option<Timestamp>,
}

impl RecordMeta {
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A persisted domain entity.
///
/// Implementations declare their domain columns once in `FIELDS`; `values`
/// must return exactly one value per entry, in the same order.
pub trait Record: Sized {
    /// Table name, snake_case by convention.
    const TABLE: &'static str;
    /// Declared domain columns, excluding the lifecycle columns.
    const FIELDS: &'static [FieldDef];
    /// Whether the table carries a `deleted_at` column.
    const SOFT_DELETABLE: bool = true;

    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Current domain values in `FIELDS` order.
    fn values(&self) -> Vec<FieldValue>;

    /// Builds an unsaved record from domain values; lifecycle columns are
    /// filled in by the caller.
    fn from_fields(fields: &FieldMap) -> TransformResult<Self>;

    fn id(&self) -> Option<i64> {
        self.meta().id
    }

    fn is_deleted(&self) -> bool {
        self.meta().is_deleted()
    }
}

/// Runtime description of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDescriptor {
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub soft_deletable: bool,
    pub type_name: &'static str,
}

impl RecordDescriptor {
    pub fn of<R: Record>() -> Self {
        Self {
            table: R::TABLE,
            fields: R::FIELDS,
            soft_deletable: R::SOFT_DELETABLE,
            type_name: std::any::type_name::<R>(),
        }
    }

    /// All columns in declaration order: lifecycle columns, domain fields,
    /// then `deleted_at` when supported.
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut columns = vec![ID_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN];
        columns.extend(self.fields.iter().map(|field| field.name));
        if self.soft_deletable {
            columns.push(DELETED_AT_COLUMN);
        }
        columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_kind(name).is_some()
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn column_kind(&self, name: &str) -> Option<FieldKind> {
        match name {
            ID_COLUMN => Some(FieldKind::Integer),
            CREATED_AT_COLUMN | UPDATED_AT_COLUMN => Some(FieldKind::Timestamp),
            DELETED_AT_COLUMN if self.soft_deletable => Some(FieldKind::Timestamp),
            _ => self.field(name).map(|field| field.kind),
        }
    }

    /// Whether the column accepts NULL; `false` for unknown columns.
    pub fn column_nullable(&self, name: &str) -> bool {
        match name {
            ID_COLUMN | CREATED_AT_COLUMN | UPDATED_AT_COLUMN => false,
            DELETED_AT_COLUMN => self.soft_deletable,
            _ => self.field(name).is_some_and(|field| field.nullable),
        }
    }

    /// Checks identifiers, reserved names and duplicates.
    pub fn validate(&self) -> Result<(), String> {
        if !is_identifier(self.table) {
            return Err(format!("table name `{}` is not an identifier", self.table));
        }

        let mut seen = BTreeSet::new();
        for field in self.fields {
            if !is_identifier(field.name) {
                return Err(format!("field name `{}` is not an identifier", field.name));
            }
            if RESERVED_COLUMNS.contains(&field.name) {
                return Err(format!("field name `{}` is reserved", field.name));
            }
            if !seen.insert(field.name) {
                return Err(format!("field `{}` is declared twice", field.name));
            }
            if let Some(table) = field.references {
                if !is_identifier(table) {
                    return Err(format!(
                        "field `{}` references invalid table `{table}`",
                        field.name
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn create_table_sql(&self) -> String {
        let mut columns = vec![
            format!("\"{ID_COLUMN}\" INTEGER PRIMARY KEY AUTOINCREMENT"),
            format!("\"{CREATED_AT_COLUMN}\" TEXT NOT NULL"),
            format!("\"{UPDATED_AT_COLUMN}\" TEXT NOT NULL"),
        ];
        columns.extend(self.fields.iter().map(FieldDef::column_sql));
        if self.soft_deletable {
            columns.push(format!("\"{DELETED_AT_COLUMN}\" TEXT"));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n);",
            self.table,
            columns.join(",\n    ")
        )
    }

    pub fn select_sql(&self) -> String {
        let columns = self
            .column_names()
            .iter()
            .map(|column| format!("\"{column}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {columns} FROM \"{}\"", self.table)
    }
}
