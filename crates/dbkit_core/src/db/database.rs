//! Database context: one connection plus the record/repository registry.
//!
//! # Responsibility
//! - Own the configured connection and its lifecycle (`configure`,
//!   `connect`, `disconnect`).
//! - Map string keys to (record type, repository type) bindings.
//! - Create the tables of every registered record type.
//!
//! # Invariants
//! - Re-registering a key replaces its binding in place (last write wins).
//! - `disconnect` releases the connection but keeps every binding.
//! - A binding that has been bound to a connection stays bound.

use super::open::{open_db, open_db_in_memory};
use super::{DbError, DbResult, TransactionScope};
use crate::config::DatabaseConfig;
use crate::model::{FieldValue, Record, RecordDescriptor};
use crate::repo::{RepoResult, RepositoryDef};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{Connection, Params};
use std::fmt;
use std::path::PathBuf;

/// A registered (record type, repository type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBinding {
    pub key: String,
    pub record: RecordDescriptor,
    /// Type name of the repository, used to check `Database::repository`.
    pub repository: &'static str,
    /// Soft-delete setting fixed by the repository type, if any.
    pub soft_delete: Option<bool>,
    bound: bool,
}

impl ModelBinding {
    /// Whether the record type has been attached to a live connection.
    pub fn is_bound(&self) -> bool {
        self.bound
    }
}

/// Explicit replacement for a process-wide database handle.
///
/// Construct one at start-up, register bindings, then hand out repositories
/// that borrow its connection.
#[derive(Default)]
pub struct Database {
    conn: Option<Connection>,
    config: Option<DatabaseConfig>,
    bindings: Vec<ModelBinding>,
}

impl Database {
    /// An unconfigured context; connection-dependent calls fail with
    /// `NotConfigured` until [`Database::configure`] succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and configures a context from a loaded config.
    pub fn open(config: &DatabaseConfig) -> DbResult<Self> {
        let mut db = Self::new();
        db.apply_config(config.clone())?;
        Ok(db)
    }

    /// Opens `path` and sets the registry soft-delete default.
    ///
    /// Configuring again closes the previous connection first.
    pub fn configure(
        &mut self,
        path: impl Into<PathBuf>,
        soft_delete_default: bool,
    ) -> DbResult<()> {
        self.apply_config(DatabaseConfig::new(path).with_soft_delete_default(soft_delete_default))
    }

    pub fn configure_in_memory(&mut self, soft_delete_default: bool) -> DbResult<()> {
        self.apply_config(DatabaseConfig::in_memory().with_soft_delete_default(soft_delete_default))
    }

    /// Re-opens the configured database after [`Database::disconnect`].
    ///
    /// A no-op while connected. An in-memory database comes back empty.
    pub fn connect(&mut self) -> DbResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let config = self.config.as_ref().ok_or(DbError::NotConfigured)?;
        self.conn = Some(open_configured(config)?);
        self.mark_all_bound();
        Ok(())
    }

    /// Closes the connection; bindings and configuration are kept.
    pub fn disconnect(&mut self) -> DbResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        match conn.close() {
            Ok(()) => {
                info!("event=db_close module=db status=ok");
                Ok(())
            }
            Err((conn, err)) => {
                warn!("event=db_close module=db status=error error={err}");
                self.conn = Some(conn);
                Err(err.into())
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// The live connection.
    ///
    /// # Errors
    /// - `NotConfigured` before `configure` or after `disconnect`.
    pub fn connection(&self) -> DbResult<&Connection> {
        self.conn.as_ref().ok_or(DbError::NotConfigured)
    }

    pub fn config(&self) -> Option<&DatabaseConfig> {
        self.config.as_ref()
    }

    pub fn soft_delete_default(&self) -> bool {
        self.config
            .as_ref()
            .is_some_and(|config| config.soft_delete_default)
    }

    /// Registers repository type `T` and its record type under `key`.
    ///
    /// With a live connection the binding is bound immediately; otherwise it
    /// is bound by the next `connect`/`configure`. Tables are only created by
    /// [`Database::create_tables`].
    ///
    /// # Errors
    /// - `InvalidSchema` when the record type declares unusable names.
    pub fn register<'conn, T>(&mut self, key: impl Into<String>) -> DbResult<()>
    where
        T: RepositoryDef<'conn>,
    {
        let key = key.into();
        let record = RecordDescriptor::of::<T::Record>();
        record
            .validate()
            .map_err(|reason| DbError::InvalidSchema {
                table: record.table,
                reason,
            })?;

        let binding = ModelBinding {
            key,
            record,
            repository: std::any::type_name::<T>(),
            soft_delete: T::SOFT_DELETE,
            bound: self.conn.is_some(),
        };
        info!(
            "event=model_register module=db status=ok key={} table={} bound={}",
            binding.key, record.table, binding.bound
        );

        match self
            .bindings
            .iter_mut()
            .find(|existing| existing.key == binding.key)
        {
            Some(existing) => {
                debug!(
                    "event=model_register module=db status=replaced key={} previous={}",
                    existing.key, existing.record.table
                );
                *existing = binding;
            }
            None => self.bindings.push(binding),
        }
        Ok(())
    }

    /// Creates every registered table that does not exist yet, atomically.
    pub fn create_tables(&mut self) -> DbResult<()> {
        let conn = self.connection()?;
        let bindings = &self.bindings;
        TransactionScope::new(conn).run(|tx| -> DbResult<()> {
            for binding in bindings {
                tx.execute_batch(&binding.record.create_table_sql())?;
            }
            Ok(())
        })?;

        info!(
            "event=tables_create module=db status=ok count={}",
            self.bindings.len()
        );
        self.mark_all_bound();
        Ok(())
    }

    pub fn get_model(&self, key: &str) -> Option<&RecordDescriptor> {
        self.binding(key).map(|binding| &binding.record)
    }

    /// Type name of the repository registered under `key`.
    pub fn get_repository(&self, key: &str) -> Option<&'static str> {
        self.binding(key).map(|binding| binding.repository)
    }

    pub fn binding(&self, key: &str) -> Option<&ModelBinding> {
        self.bindings.iter().find(|binding| binding.key == key)
    }

    /// All bindings in first-registration order.
    pub fn bindings(&self) -> &[ModelBinding] {
        &self.bindings
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &RecordDescriptor)> {
        self.bindings
            .iter()
            .map(|binding| (binding.key.as_str(), &binding.record))
    }

    pub fn repositories(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.bindings
            .iter()
            .map(|binding| (binding.key.as_str(), binding.repository))
    }

    pub fn is_bound(&self, key: &str) -> bool {
        self.binding(key).is_some_and(ModelBinding::is_bound)
    }

    /// Instantiates the repository registered under `key` against the live
    /// connection.
    ///
    /// Soft delete comes from `T::SOFT_DELETE`, falling back to the registry
    /// default for soft-deletable records.
    ///
    /// # Errors
    /// - `UnknownKey` when nothing is registered under `key`.
    /// - `BindingMismatch` when `key` is bound to a different repository type.
    /// - `NotConfigured` without a live connection.
    /// - `MissingRequiredTable` when `create_tables` has not run.
    pub fn repository<'conn, T>(&'conn self, key: &str) -> RepoResult<T>
    where
        T: RepositoryDef<'conn>,
    {
        let binding = self
            .binding(key)
            .ok_or_else(|| DbError::UnknownKey(key.to_string()))?;
        let requested = std::any::type_name::<T>();
        if binding.repository != requested {
            return Err(DbError::BindingMismatch {
                key: key.to_string(),
                registered: binding.repository,
                requested,
            }
            .into());
        }

        let conn = self.connection()?;
        let soft_delete = T::SOFT_DELETE.unwrap_or_else(|| {
            self.soft_delete_default() && <T::Record as Record>::SOFT_DELETABLE
        });
        T::open(conn, soft_delete)
    }

    /// Runs `body` in a transaction on the live connection.
    pub fn transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        let conn = self.connection().map_err(E::from)?;
        TransactionScope::new(conn).run(body)
    }

    /// Executes raw SQL and returns every result row.
    ///
    /// Statements that produce no rows return an empty list.
    pub fn execute_sql<P: Params>(&self, sql: &str, params: P) -> DbResult<Vec<Vec<FieldValue>>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(FieldValue::from(row.get::<_, Value>(index)?));
            }
            results.push(values);
        }
        Ok(results)
    }

    /// Executes raw SQL and returns the first row, if any.
    pub fn execute_sql_single<P: Params>(
        &self,
        sql: &str,
        params: P,
    ) -> DbResult<Option<Vec<FieldValue>>> {
        Ok(self.execute_sql(sql, params)?.into_iter().next())
    }

    fn apply_config(&mut self, config: DatabaseConfig) -> DbResult<()> {
        config.validate()?;
        if self.conn.is_some() {
            self.disconnect()?;
        }

        let conn = open_configured(&config)?;
        info!(
            "event=db_configure module=db status=ok path={} soft_delete_default={}",
            config.path.display(),
            config.soft_delete_default
        );
        self.conn = Some(conn);
        self.config = Some(config);
        self.mark_all_bound();
        Ok(())
    }

    fn mark_all_bound(&mut self) {
        for binding in &mut self.bindings {
            binding.bound = true;
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .config
            .as_ref()
            .map(|config| config.path.display().to_string())
            .unwrap_or_else(|| "not configured".to_string());
        write!(
            f,
            "Database(db={path}, models={}, repositories={}, soft_delete={})",
            self.bindings.len(),
            self.bindings.len(),
            self.soft_delete_default()
        )
    }
}

fn open_configured(config: &DatabaseConfig) -> DbResult<Connection> {
    if config.is_in_memory() {
        open_db_in_memory(config.busy_timeout())
    } else {
        open_db(&config.path, config.busy_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::db::DbError;
    use crate::model::FieldValue;

    #[test]
    fn unconfigured_context_reports_not_configured() {
        let db = Database::new();
        assert!(!db.is_connected());
        assert!(matches!(db.connection(), Err(DbError::NotConfigured)));
        assert!(matches!(
            db.execute_sql("SELECT 1;", []),
            Err(DbError::NotConfigured)
        ));
        assert_eq!(
            db.to_string(),
            "Database(db=not configured, models=0, repositories=0, soft_delete=false)"
        );
    }

    #[test]
    fn connect_without_config_fails() {
        let mut db = Database::new();
        assert!(matches!(db.connect(), Err(DbError::NotConfigured)));
    }

    #[test]
    fn execute_sql_returns_rows_and_first_row() {
        let mut db = Database::new();
        db.configure_in_memory(true).unwrap();

        let rows = db
            .execute_sql("SELECT ?1 + 1, 'x' UNION ALL SELECT 10, NULL;", [41])
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![FieldValue::Integer(42), FieldValue::Text("x".to_string())],
                vec![FieldValue::Integer(10), FieldValue::Null],
            ]
        );

        let first = db.execute_sql_single("SELECT 1 WHERE 0;", []).unwrap();
        assert_eq!(first, None);
        assert!(db.to_string().contains("soft_delete=true"));
    }

    #[test]
    fn transaction_requires_connection() {
        let db = Database::new();
        let result: Result<(), DbError> = db.transaction(|_| Ok(()));
        assert!(matches!(result, Err(DbError::NotConfigured)));
    }
}
