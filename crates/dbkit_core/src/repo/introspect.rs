//! Read-only schema introspection.
//!
//! The public helpers never fail: any error is logged at `warn` and reported
//! as an empty result. Crate-internal `try_*`/`table_exists` helpers
//! propagate errors for callers that must not guess.

use super::repository::RepoResult;
use log::warn;
use rusqlite::Connection;

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    /// Default value expression as written in the DDL.
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Column names of `table`, or empty when it cannot be inspected.
pub fn get_columns(conn: &Connection, table: &str) -> Vec<String> {
    get_column_info(conn, table)
        .into_iter()
        .map(|column| column.name)
        .collect()
}

/// Column metadata of `table`, or empty when it cannot be inspected.
pub fn get_column_info(conn: &Connection, table: &str) -> Vec<ColumnInfo> {
    match try_column_info(conn, table) {
        Ok(columns) => columns,
        Err(err) => {
            warn!(
                "event=schema_introspect module=repo status=error table={table} error={err}"
            );
            Vec::new()
        }
    }
}

/// First primary-key column of `table`, if any.
pub fn get_primary_key(conn: &Connection, table: &str) -> Option<String> {
    get_column_info(conn, table)
        .into_iter()
        .find(|column| column.primary_key)
        .map(|column| column.name)
}

pub(crate) fn try_column_info(conn: &Connection, table: &str) -> RepoResult<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk
         FROM pragma_table_info(?1)
         ORDER BY cid;",
    )?;
    let mut rows = stmt.query([table])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(ColumnInfo {
            cid: row.get(0)?,
            name: row.get(1)?,
            data_type: row.get(2)?,
            not_null: row.get::<_, i64>(3)? != 0,
            default_value: row.get(4)?,
            primary_key: row.get::<_, i64>(5)? != 0,
        });
    }
    Ok(columns)
}

pub(crate) fn try_column_names(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    Ok(try_column_info(conn, table)?
        .into_iter()
        .map(|column| column.name)
        .collect())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{get_column_info, get_columns, get_primary_key};
    use rusqlite::Connection;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE gadget (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL DEFAULT 'unnamed',
                weight REAL
            );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn reports_columns_in_order() {
        assert_eq!(get_columns(&conn(), "gadget"), vec!["id", "label", "weight"]);
    }

    #[test]
    fn reports_column_details() {
        let info = get_column_info(&conn(), "gadget");
        assert_eq!(info.len(), 3);
        assert!(info[0].primary_key);
        assert_eq!(info[1].data_type, "TEXT");
        assert!(info[1].not_null);
        assert_eq!(info[1].default_value.as_deref(), Some("'unnamed'"));
        assert!(!info[2].not_null);
    }

    #[test]
    fn missing_table_yields_empty_results() {
        let conn = conn();
        assert!(get_columns(&conn, "nope").is_empty());
        assert_eq!(get_primary_key(&conn, "nope"), None);
        assert_eq!(get_primary_key(&conn, "gadget").as_deref(), Some("id"));
    }

    #[test]
    fn broken_view_is_swallowed_into_empty_results() {
        let conn = conn();
        conn.execute_batch(
            "CREATE TABLE scratch (x INTEGER);
             CREATE VIEW scratch_view AS SELECT x FROM scratch;
             DROP TABLE scratch;",
        )
        .unwrap();

        assert!(get_column_info(&conn, "scratch_view").is_empty());
        assert_eq!(get_primary_key(&conn, "scratch_view"), None);
    }
}
