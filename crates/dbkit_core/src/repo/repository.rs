//! Generic record repository over SQLite.
//!
//! # Responsibility
//! - Provide create/read/update/delete/restore/count/exists for any `Record`.
//! - Enforce soft-delete visibility on every read path.
//! - Run each mutating and reading operation inside a `TransactionScope`.
//!
//! # Invariants
//! - With soft delete enabled, reads hide rows whose `deleted_at` is set
//!   unless the caller passes `include_deleted = true`.
//! - `created_at <= updated_at` after create; every later write that touches
//!   a row moves `updated_at` forward.
//! - Engine constraint errors propagate unchanged.

use super::introspect::{self, ColumnInfo};
use crate::db::{DbError, TransactionScope};
use crate::model::timestamp;
use crate::model::{
    FieldMap, FieldValue, Record, RecordDescriptor, CREATED_AT_COLUMN, DELETED_AT_COLUMN,
    ID_COLUMN, UPDATED_AT_COLUMN,
};
use crate::transform::{map_to_record, record_to_map, TransformError};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, Row};
use std::marker::PhantomData;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("`{table}` does not declare field `{field}`")]
    UnknownField { table: &'static str, field: String },
    /// `id`, `created_at` and `updated_at` are maintained by the repository.
    #[error("field `{field}` of `{table}` cannot be set directly")]
    ProtectedField { table: &'static str, field: String },
    #[error("soft delete is not enabled for `{0}`")]
    SoftDeleteDisabled(&'static str),
    #[error("required table missing: {0}")]
    MissingRequiredTable(&'static str),
    #[error("required column missing: {table}.{column}")]
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    #[error("invalid persisted data in `{table}`: {message}")]
    InvalidData { table: &'static str, message: String },
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl RepoError {
    /// Whether this is an engine constraint failure (unique, not-null,
    /// foreign key, check).
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == ErrorCode::ConstraintViolation
        )
    }
}

/// Change set accepted by [`Repository::update`].
#[derive(Debug, Clone)]
pub enum Changes<'a, R> {
    /// One column.
    Field(String, FieldValue),
    /// Several columns at once.
    Map(FieldMap),
    /// Every column of a record instance except `id` and `created_at`;
    /// `updated_at` is forced to now.
    Record(&'a R),
}

impl<'a, R, V: Into<FieldValue>> From<(&str, V)> for Changes<'a, R> {
    fn from((name, value): (&str, V)) -> Self {
        Self::Field(name.to_string(), value.into())
    }
}

impl<'a, R> From<FieldMap> for Changes<'a, R> {
    fn from(value: FieldMap) -> Self {
        Self::Map(value)
    }
}

impl<'a, R> From<&'a R> for Changes<'a, R> {
    fn from(value: &'a R) -> Self {
        Self::Record(value)
    }
}

/// A named repository type the registry can bind and instantiate.
///
/// Domain repositories wrap a [`Repository`] and add their own queries.
pub trait RepositoryDef<'conn>: Sized {
    type Record: Record;
    /// Fixed soft-delete setting; `None` uses the registry default.
    const SOFT_DELETE: Option<bool> = None;

    fn from_base(base: Repository<'conn, Self::Record>) -> Self;

    fn base(&self) -> &Repository<'conn, Self::Record>;

    fn open(conn: &'conn Connection, soft_delete: bool) -> RepoResult<Self> {
        Repository::try_new(conn, soft_delete).map(Self::from_base)
    }
}

impl<'conn, R: Record> RepositoryDef<'conn> for Repository<'conn, R> {
    type Record = R;

    fn from_base(base: Repository<'conn, R>) -> Self {
        base
    }

    fn base(&self) -> &Repository<'conn, R> {
        self
    }
}

/// CRUD engine bound to one record type and one live connection.
pub struct Repository<'conn, R: Record> {
    conn: &'conn Connection,
    soft_delete: bool,
    descriptor: RecordDescriptor,
    _record: PhantomData<fn() -> R>,
}

impl<'conn, R: Record> Repository<'conn, R> {
    /// Binds a repository to a connection whose schema holds `R::TABLE`.
    ///
    /// # Errors
    /// - `MissingRequiredTable` when the table has not been created.
    /// - `MissingRequiredColumn` when a declared column is absent, or soft
    ///   delete is requested and the table has no `deleted_at`.
    pub fn try_new(conn: &'conn Connection, soft_delete: bool) -> RepoResult<Self> {
        let descriptor = RecordDescriptor::of::<R>();
        if soft_delete && !descriptor.soft_deletable {
            return Err(RepoError::MissingRequiredColumn {
                table: R::TABLE,
                column: DELETED_AT_COLUMN,
            });
        }
        ensure_connection_ready(conn, &descriptor)?;

        Ok(Self {
            conn,
            soft_delete,
            descriptor,
            _record: PhantomData,
        })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn soft_delete_enabled(&self) -> bool {
        self.soft_delete
    }

    pub fn descriptor(&self) -> &RecordDescriptor {
        &self.descriptor
    }

    pub fn scope(&self) -> TransactionScope<'conn> {
        TransactionScope::new(self.conn)
    }

    /// Inserts one record and returns it with `id` and timestamps populated.
    pub fn create(&self, record: R) -> RepoResult<R> {
        self.scope().run(|tx| self.insert(tx, record))
    }

    /// Inserts all records or none of them.
    pub fn create_many(&self, records: Vec<R>) -> RepoResult<Vec<R>> {
        let count = records.len();
        let created = self.scope().run(|tx| {
            records
                .into_iter()
                .map(|record| self.insert(tx, record))
                .collect::<RepoResult<Vec<_>>>()
        })?;
        debug!(
            "event=record_create_many module=repo status=ok table={} count={count}",
            R::TABLE
        );
        Ok(created)
    }

    pub fn get_by_id(&self, id: i64, include_deleted: bool) -> RepoResult<Option<R>> {
        let id = FieldValue::Integer(id);
        let mut found = self
            .scope()
            .read(|tx| self.select(tx, Some((ID_COLUMN, &id)), include_deleted))?;
        Ok(found.pop())
    }

    /// Returns records ordered by `id`.
    pub fn get_all(&self, include_deleted: bool) -> RepoResult<Vec<R>> {
        self.scope().read(|tx| self.select(tx, None, include_deleted))
    }

    /// Returns records whose `field` equals `value`; a null value matches
    /// `IS NULL`.
    ///
    /// # Errors
    /// - `UnknownField` when `field` is not a column of the record type.
    pub fn get_by_field(
        &self,
        field: &str,
        value: impl Into<FieldValue>,
        include_deleted: bool,
    ) -> RepoResult<Vec<R>> {
        self.ensure_column(field)?;
        let value = value.into();
        self.scope()
            .read(|tx| self.select(tx, Some((field, &value)), include_deleted))
    }

    /// Applies `changes` to row `id` and returns the affected row count.
    ///
    /// Every non-empty change sets `updated_at` to now. Soft-deleted rows are
    /// updatable. An empty map is a no-op returning `0`.
    ///
    /// # Errors
    /// - `UnknownField` when a named column is not declared.
    /// - `ProtectedField` when a field or map change names `id`,
    ///   `created_at` or `updated_at`.
    /// - `Transform(InvalidValue)` when a value does not fit the column kind,
    ///   or is null for a non-nullable column.
    pub fn update<'a>(&self, id: i64, changes: impl Into<Changes<'a, R>>) -> RepoResult<usize>
    where
        R: 'a,
    {
        let assignments = self.assignments(changes.into())?;
        if assignments.is_empty() {
            return Ok(0);
        }
        let changed = self
            .scope()
            .run(|tx| self.update_rows(tx, &assignments, Some(id)))?;
        debug!(
            "event=record_update module=repo status=ok table={} id={id} changed={changed}",
            R::TABLE
        );
        Ok(changed)
    }

    /// Soft-deletes when enabled, otherwise removes the row.
    pub fn delete(&self, id: i64) -> RepoResult<usize> {
        if !self.soft_delete {
            return self.delete_hard(id);
        }
        let now = timestamp::now();
        let assignments = FieldMap::new()
            .with(DELETED_AT_COLUMN, now)
            .with(UPDATED_AT_COLUMN, now);
        let changed = self
            .scope()
            .run(|tx| self.update_rows(tx, &assignments, Some(id)))?;
        debug!(
            "event=record_delete module=repo status=ok mode=soft table={} id={id} changed={changed}",
            R::TABLE
        );
        Ok(changed)
    }

    /// Removes the row regardless of the soft-delete setting.
    pub fn delete_hard(&self, id: i64) -> RepoResult<usize> {
        let changed = self.scope().run(|tx| self.delete_rows(tx, Some(id)))?;
        debug!(
            "event=record_delete module=repo status=ok mode=hard table={} id={id} changed={changed}",
            R::TABLE
        );
        Ok(changed)
    }

    /// Clears `deleted_at` on row `id`.
    ///
    /// # Errors
    /// - `SoftDeleteDisabled` when this repository does not soft-delete; no
    ///   state is touched in that case.
    pub fn restore(&self, id: i64) -> RepoResult<usize> {
        if !self.soft_delete {
            return Err(RepoError::SoftDeleteDisabled(R::TABLE));
        }
        let assignments = FieldMap::new()
            .with(DELETED_AT_COLUMN, FieldValue::Null)
            .with(UPDATED_AT_COLUMN, timestamp::now());
        let changed = self
            .scope()
            .run(|tx| self.update_rows(tx, &assignments, Some(id)))?;
        debug!(
            "event=record_restore module=repo status=ok table={} id={id} changed={changed}",
            R::TABLE
        );
        Ok(changed)
    }

    /// Deletes every row; soft only when `soft` is true and soft delete is
    /// enabled.
    pub fn delete_all(&self, soft: bool) -> RepoResult<usize> {
        let soft = soft && self.soft_delete;
        let changed = self.scope().run(|tx| {
            if soft {
                let now = timestamp::now();
                let assignments = FieldMap::new()
                    .with(DELETED_AT_COLUMN, now)
                    .with(UPDATED_AT_COLUMN, now);
                self.update_rows(tx, &assignments, None)
            } else {
                self.delete_rows(tx, None)
            }
        })?;
        debug!(
            "event=record_delete_all module=repo status=ok soft={soft} table={} changed={changed}",
            R::TABLE
        );
        Ok(changed)
    }

    pub fn count(&self, include_deleted: bool) -> RepoResult<u64> {
        let mut sql = format!("SELECT COUNT(*) FROM \"{}\"", R::TABLE);
        if self.hides_deleted(include_deleted) {
            sql.push_str(&format!(" WHERE \"{DELETED_AT_COLUMN}\" IS NULL"));
        }
        self.scope().read(|tx| count_rows(tx, &sql))
    }

    /// Counts soft-deleted rows only; `0` for tables without `deleted_at`.
    pub fn count_deleted(&self) -> RepoResult<u64> {
        if !self.descriptor.soft_deletable {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM \"{}\" WHERE \"{DELETED_AT_COLUMN}\" IS NOT NULL",
            R::TABLE
        );
        self.scope().read(|tx| count_rows(tx, &sql))
    }

    /// Whether a visible row with this id exists.
    pub fn exists(&self, id: i64) -> RepoResult<bool> {
        Ok(self.get_by_id(id, false)?.is_some())
    }

    pub fn get_columns(&self, table: &str) -> Vec<String> {
        introspect::get_columns(self.conn, table)
    }

    pub fn get_column_info(&self, table: &str) -> Vec<ColumnInfo> {
        introspect::get_column_info(self.conn, table)
    }

    pub fn get_primary_key(&self, table: &str) -> Option<String> {
        introspect::get_primary_key(self.conn, table)
    }

    fn hides_deleted(&self, include_deleted: bool) -> bool {
        self.soft_delete && !include_deleted
    }

    fn ensure_column(&self, name: &str) -> RepoResult<()> {
        if self.descriptor.has_column(name) {
            return Ok(());
        }
        Err(RepoError::UnknownField {
            table: R::TABLE,
            field: name.to_string(),
        })
    }

    fn assignments(&self, changes: Changes<'_, R>) -> RepoResult<FieldMap> {
        let mut map = match changes {
            Changes::Field(name, value) => FieldMap::new().with(name, value),
            Changes::Map(map) => map,
            Changes::Record(record) => {
                let mut map = record_to_map(record);
                map.remove(ID_COLUMN);
                map.remove(CREATED_AT_COLUMN);
                map.insert(UPDATED_AT_COLUMN, timestamp::now());
                return Ok(map);
            }
        };

        for (key, value) in map.iter() {
            self.check_assignment(key, value)?;
        }
        if !map.is_empty() {
            map.insert(UPDATED_AT_COLUMN, timestamp::now());
        }
        Ok(map)
    }

    fn check_assignment(&self, column: &str, value: &FieldValue) -> RepoResult<()> {
        if matches!(column, ID_COLUMN | CREATED_AT_COLUMN | UPDATED_AT_COLUMN) {
            return Err(RepoError::ProtectedField {
                table: R::TABLE,
                field: column.to_string(),
            });
        }
        let kind = self
            .descriptor
            .column_kind(column)
            .ok_or_else(|| RepoError::UnknownField {
                table: R::TABLE,
                field: column.to_string(),
            })?;

        let valid = if value.is_null() {
            self.descriptor.column_nullable(column)
        } else {
            kind.accepts(value)
        };
        if valid {
            return Ok(());
        }
        Err(TransformError::InvalidValue {
            field: column.to_string(),
            expected: kind.name(),
            found: value.kind_name().to_string(),
        }
        .into())
    }

    fn insert(&self, conn: &Connection, mut record: R) -> RepoResult<R> {
        let now = timestamp::now();
        let meta = record.meta_mut();
        meta.created_at = Some(now);
        meta.updated_at = Some(now);

        let mut map = record_to_map(&record);
        if map.get(ID_COLUMN).is_some_and(FieldValue::is_null) {
            map.remove(ID_COLUMN);
        }

        let columns = map
            .keys()
            .map(|column| format!("\"{column}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=map.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders});",
            R::TABLE
        );
        conn.execute(&sql, params_from_iter(map.iter().map(|(_, value)| value)))?;

        let id = match record.meta().id {
            Some(id) => id,
            None => conn.last_insert_rowid(),
        };
        record.meta_mut().id = Some(id);
        debug!(
            "event=record_create module=repo status=ok table={} id={id}",
            R::TABLE
        );
        Ok(record)
    }

    fn select(
        &self,
        conn: &Connection,
        filter: Option<(&str, &FieldValue)>,
        include_deleted: bool,
    ) -> RepoResult<Vec<R>> {
        let mut sql = format!("{} WHERE 1 = 1", self.descriptor.select_sql());
        let mut bind_values: Vec<&FieldValue> = Vec::new();

        if self.hides_deleted(include_deleted) {
            sql.push_str(&format!(" AND \"{DELETED_AT_COLUMN}\" IS NULL"));
        }
        match filter {
            Some((column, value)) if value.is_null() => {
                sql.push_str(&format!(" AND \"{column}\" IS NULL"));
            }
            Some((column, value)) => {
                sql.push_str(&format!(" AND \"{column}\" = ?"));
                bind_values.push(value);
            }
            None => {}
        }
        sql.push_str(&format!(" ORDER BY \"{ID_COLUMN}\" ASC;"));

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(self.parse_row(row)?);
        }
        Ok(records)
    }

    fn parse_row(&self, row: &Row<'_>) -> RepoResult<R> {
        let mut map = FieldMap::new();
        for (index, column) in self.descriptor.column_names().into_iter().enumerate() {
            let value: Value = row.get(index)?;
            map.insert(column, FieldValue::from(value));
        }
        map_to_record(&map).map_err(|err| RepoError::InvalidData {
            table: R::TABLE,
            message: err.to_string(),
        })
    }

    fn update_rows(
        &self,
        conn: &Connection,
        assignments: &FieldMap,
        id: Option<i64>,
    ) -> RepoResult<usize> {
        let set_clause = assignments
            .keys()
            .enumerate()
            .map(|(index, column)| format!("\"{column}\" = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE \"{}\" SET {set_clause}", R::TABLE);
        let mut bind_values: Vec<FieldValue> = assignments
            .iter()
            .map(|(_, value)| value.clone())
            .collect();
        if let Some(id) = id {
            sql.push_str(&format!(
                " WHERE \"{ID_COLUMN}\" = ?{}",
                bind_values.len() + 1
            ));
            bind_values.push(FieldValue::Integer(id));
        }
        sql.push(';');

        Ok(conn.execute(&sql, params_from_iter(bind_values))?)
    }

    fn delete_rows(&self, conn: &Connection, id: Option<i64>) -> RepoResult<usize> {
        let changed = match id {
            Some(id) => conn.execute(
                &format!("DELETE FROM \"{}\" WHERE \"{ID_COLUMN}\" = ?1;", R::TABLE),
                [id],
            )?,
            None => conn.execute(&format!("DELETE FROM \"{}\";", R::TABLE), [])?,
        };
        Ok(changed)
    }
}

impl<R: Record> std::fmt::Debug for Repository<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &R::TABLE)
            .field("soft_delete", &self.soft_delete)
            .finish()
    }
}

fn count_rows(conn: &Connection, sql: &str) -> RepoResult<u64> {
    let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn ensure_connection_ready(conn: &Connection, descriptor: &RecordDescriptor) -> RepoResult<()> {
    if !introspect::table_exists(conn, descriptor.table)? {
        return Err(RepoError::MissingRequiredTable(descriptor.table));
    }

    let existing = introspect::try_column_names(conn, descriptor.table)?;
    for column in descriptor.column_names() {
        if !existing.iter().any(|name| name == column) {
            return Err(RepoError::MissingRequiredColumn {
                table: descriptor.table,
                column,
            });
        }
    }
    Ok(())
}
