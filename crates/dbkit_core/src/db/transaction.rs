//! Atomic execution scopes over a shared connection.
//!
//! # Responsibility
//! - Run a closure so its writes either all commit or all roll back.
//! - Nest: a scope opened inside another becomes a savepoint.
//!
//! # Invariants
//! - A failing body is rolled back before its error is returned unchanged.
//! - A panicking body is rolled back while unwinding.
//! - Rollback failures are logged and never replace the body's error.

use super::DbError;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, Transaction, TransactionBehavior};

const NESTED_SAVEPOINT: &str = "dbkit_nested";

static SAVEPOINT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("valid savepoint name regex")
});

/// Transaction boundary bound to one connection.
///
/// Owned by the calling operation; a connection is never shared across
/// threads, so neither is a scope.
#[derive(Debug, Clone, Copy)]
pub struct TransactionScope<'conn> {
    conn: &'conn Connection,
}

impl<'conn> TransactionScope<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Whether the connection is currently inside a transaction.
    pub fn is_active(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Runs `body` with write intent (`BEGIN IMMEDIATE`).
    ///
    /// Inside an outer scope this is a nested savepoint instead of a second
    /// top-level transaction.
    pub fn run<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        self.begin(TransactionBehavior::Immediate, body)
    }

    /// Runs `body` with read intent (`BEGIN DEFERRED`).
    pub fn read<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        self.begin(TransactionBehavior::Deferred, body)
    }

    /// Runs `body` inside a named savepoint.
    ///
    /// On failure only the writes made since the savepoint are undone; an
    /// enclosing scope keeps its earlier writes and decides on its own.
    ///
    /// # Errors
    /// - `InvalidSavepointName` when `name` is not a plain identifier.
    pub fn savepoint<T, E, F>(&self, name: &str, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        if !SAVEPOINT_NAME_RE.is_match(name) {
            return Err(DbError::InvalidSavepointName(name.to_string()).into());
        }

        self.conn
            .execute_batch(&format!("SAVEPOINT {name};"))
            .map_err(|err| E::from(DbError::from(err)))?;
        let mut guard = SavepointGuard {
            conn: self.conn,
            name,
            finished: false,
        };

        match body(self.conn) {
            Ok(value) => {
                // A failed RELEASE leaves the savepoint open; the guard undoes it.
                self.conn
                    .execute_batch(&format!("RELEASE SAVEPOINT {name};"))
                    .map_err(|err| E::from(DbError::from(err)))?;
                guard.finished = true;
                Ok(value)
            }
            Err(err) => {
                guard.rollback();
                Err(err)
            }
        }
    }

    fn begin<T, E, F>(&self, behavior: TransactionBehavior, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        if self.is_active() {
            return self.savepoint(NESTED_SAVEPOINT, body);
        }

        let tx = Transaction::new_unchecked(self.conn, behavior)
            .map_err(|err| E::from(DbError::from(err)))?;
        match body(&*tx) {
            Ok(value) => {
                tx.commit().map_err(|err| E::from(DbError::from(err)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(
                        "event=tx_rollback module=db status=error scope=transaction error={rollback_err}"
                    );
                } else {
                    debug!("event=tx_rollback module=db status=ok scope=transaction");
                }
                Err(err)
            }
        }
    }
}

struct SavepointGuard<'a> {
    conn: &'a Connection,
    name: &'a str,
    finished: bool,
}

impl SavepointGuard<'_> {
    fn rollback(&mut self) {
        self.finished = true;
        let sql = format!(
            "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};",
            name = self.name
        );
        match self.conn.execute_batch(&sql) {
            Ok(()) => debug!(
                "event=tx_rollback module=db status=ok scope=savepoint name={}",
                self.name
            ),
            Err(err) => warn!(
                "event=tx_rollback module=db status=error scope=savepoint name={} error={err}",
                self.name
            ),
        }
    }
}

impl Drop for SavepointGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}
