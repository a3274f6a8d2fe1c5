//! Raw SQL escape hatch used by the agent's SQL tool.
//!
//! Statements run against the same connection as everything else, so the
//! archive-immutability triggers still apply. After DDL the table directory
//! is refreshed so the agent can discover its own tables later.

use rusqlite::Connection;

use super::{map_sql_err, schema::INTERNAL_TABLES, Store, StoreError};

/// One result row: column names and values in statement order.
#[derive(Clone, Debug)]
pub struct SqlRow {
    pub columns: Vec<String>,
    pub values: Vec<serde_json::Value>,
}

impl SqlRow {
    /// Renders the row as a JSON object. JSON objects do not preserve column
    /// order; use the parallel vectors when order matters.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in self.columns.iter().zip(self.values.iter()) {
            map.insert(name.clone(), value.clone());
        }
        serde_json::Value::Object(map)
    }
}

/// Outcome of one raw statement.
#[derive(Clone, Debug)]
pub enum SqlOutcome {
    Rows(Vec<SqlRow>),
    Affected(usize),
}

fn value_ref_to_json(value: rusqlite::types::ValueRef<'_>) -> serde_json::Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
            serde_json::Value::String(hex)
        }
    }
}

fn is_ddl(sql: &str) -> bool {
    let head = sql.trim_start().to_ascii_lowercase();
    head.starts_with("create") || head.starts_with("drop") || head.starts_with("alter")
}

/// Refreshes the registry of user tables, preserving descriptions of tables
/// that still exist.
pub(crate) fn sync_table_directory_conn(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
        .map_err(map_sql_err)?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(map_sql_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sql_err)?;
    let current: Vec<&String> = names
        .iter()
        .filter(|n| !INTERNAL_TABLES.contains(&n.as_str()))
        .collect();

    for name in &current {
        conn.execute(
            "INSERT OR IGNORE INTO table_directory (name, description) VALUES (?1, NULL)",
            rusqlite::params![name],
        )
        .map_err(map_sql_err)?;
    }
    // Drop directory entries for tables that no longer exist.
    let mut stmt = conn
        .prepare("SELECT name FROM table_directory")
        .map_err(map_sql_err)?;
    let listed: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(map_sql_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sql_err)?;
    for name in listed {
        if !current.iter().any(|c| c.as_str() == name) {
            conn.execute(
                "DELETE FROM table_directory WHERE name = ?1",
                rusqlite::params![name],
            )
            .map_err(map_sql_err)?;
        }
    }
    Ok(())
}

impl Store {
    /// Executes one raw SQL statement. Row-returning statements yield
    /// [`SqlOutcome::Rows`]; everything else yields the affected count.
    pub async fn execute_raw(&self, sql: &str) -> Result<SqlOutcome, StoreError> {
        let sql = sql.trim().to_string();
        self.with_conn(move |conn| {
            let outcome = {
                let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
                if stmt.column_count() > 0 {
                    let columns: Vec<String> =
                        stmt.column_names().iter().map(|c| c.to_string()).collect();
                    let count = columns.len();
                    let mut rows = stmt.query([]).map_err(map_sql_err)?;
                    let mut out = Vec::new();
                    while let Some(row) = rows.next().map_err(map_sql_err)? {
                        let mut values = Vec::with_capacity(count);
                        for idx in 0..count {
                            let value = row.get_ref(idx).map_err(map_sql_err)?;
                            values.push(value_ref_to_json(value));
                        }
                        out.push(SqlRow {
                            columns: columns.clone(),
                            values,
                        });
                    }
                    SqlOutcome::Rows(out)
                } else {
                    drop(stmt);
                    let affected = conn.execute(&sql, []).map_err(map_sql_err)?;
                    SqlOutcome::Affected(affected)
                }
            };
            if is_ddl(&sql) {
                sync_table_directory_conn(conn)?;
            }
            Ok(outcome)
        })
    }

    /// Sets the description shown for a user table in the directory.
    pub async fn describe_table(&self, name: &str, description: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        let description = description.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE table_directory SET description = ?2 WHERE name = ?1",
                rusqlite::params![name, description],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    /// Known user tables with their descriptions.
    pub async fn table_directory(&self) -> Result<Vec<(String, Option<String>)>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT name, description FROM table_directory ORDER BY name")
                .map_err(map_sql_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;

    /// **Scenario**: SELECT returns rows with columns in statement order.
    #[tokio::test(flavor = "multi_thread")]
    async fn select_returns_ordered_rows() {
        let store = Store::open_in_memory().unwrap();
        store.save_session(&Session::new("s1", "t")).await.unwrap();

        let outcome = store
            .execute_raw("SELECT title, id FROM session")
            .await
            .unwrap();
        match outcome {
            SqlOutcome::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].columns, vec!["title", "id"]);
                assert_eq!(rows[0].values[0], serde_json::json!("t"));
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    /// **Scenario**: CREATE TABLE via raw SQL lands in the table directory;
    /// DROP removes it while other descriptions persist.
    #[tokio::test(flavor = "multi_thread")]
    async fn ddl_syncs_table_directory() {
        let store = Store::open_in_memory().unwrap();
        store
            .execute_raw("CREATE TABLE scratch (k TEXT, v TEXT)")
            .await
            .unwrap();
        store.describe_table("scratch", "agent scratch space").await.unwrap();

        let directory = store.table_directory().await.unwrap();
        assert!(directory.iter().any(|(n, d)| {
            n == "scratch" && d.as_deref() == Some("agent scratch space")
        }));

        store.execute_raw("DROP TABLE scratch").await.unwrap();
        let directory = store.table_directory().await.unwrap();
        assert!(!directory.iter().any(|(n, _)| n == "scratch"));
    }

    /// **Scenario**: Raw SQL cannot delete archived data; the trigger abort
    /// surfaces as an Immutable error.
    #[tokio::test(flavor = "multi_thread")]
    async fn raw_sql_respects_triggers() {
        let store = Store::open_in_memory().unwrap();
        store.save_session(&Session::new("s1", "t")).await.unwrap();
        store.archive_session("s1").await.unwrap();

        let err = store
            .execute_raw("DELETE FROM session WHERE id = 's1'")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Immutable(_)));
    }

    /// **Scenario**: Non-query statements report the affected row count.
    #[tokio::test(flavor = "multi_thread")]
    async fn update_reports_affected() {
        let store = Store::open_in_memory().unwrap();
        store.save_session(&Session::new("s1", "old")).await.unwrap();
        let outcome = store
            .execute_raw("UPDATE session SET title = 'new' WHERE id = 's1'")
            .await
            .unwrap();
        assert!(matches!(outcome, SqlOutcome::Affected(1)));
    }
}
