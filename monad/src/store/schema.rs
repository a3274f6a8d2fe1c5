//! Forward-only schema migrations `v1…v27`.
//!
//! Applied migrations are recorded in `schema_migrations`; re-running the set
//! is a no-op. Column additions are idempotent: a "duplicate column name"
//! failure on an `ALTER TABLE ADD COLUMN` statement is treated as already
//! applied. The post-v27 schema has no `note` table; legacy note rows only
//! exist on databases that stopped before v27.

use rusqlite::Connection;

use super::{map_sql_err, StoreError};

struct Migration {
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "v1",
        statements: &[
            "CREATE TABLE IF NOT EXISTS session (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                working_dir TEXT
            );",
            "CREATE TABLE IF NOT EXISTS message (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES session(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        ],
    },
    Migration {
        name: "v2",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_message_session_order
                ON message(session_id, created_at, id);",
        ],
    },
    Migration {
        name: "v3",
        statements: &[
            "CREATE TABLE IF NOT EXISTS memory (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        ],
    },
    Migration {
        name: "v4",
        statements: &["ALTER TABLE memory ADD COLUMN embedding TEXT NOT NULL DEFAULT '[]';"],
    },
    Migration {
        name: "v5",
        statements: &["ALTER TABLE session ADD COLUMN is_archived INTEGER NOT NULL DEFAULT 0;"],
    },
    Migration {
        name: "v6",
        statements: &[
            "CREATE TRIGGER IF NOT EXISTS session_immutable_update
                BEFORE UPDATE ON session
                WHEN OLD.is_archived = 1
             BEGIN
                SELECT RAISE(ABORT, 'archived session is immutable');
             END;",
            "CREATE TRIGGER IF NOT EXISTS session_immutable_delete
                BEFORE DELETE ON session
                WHEN OLD.is_archived = 1
             BEGIN
                SELECT RAISE(ABORT, 'archived session is immutable');
             END;",
        ],
    },
    Migration {
        name: "v7",
        statements: &[
            "CREATE TRIGGER IF NOT EXISTS message_immutable_update
                BEFORE UPDATE ON message
                WHEN (SELECT is_archived FROM session WHERE id = OLD.session_id) = 1
             BEGIN
                SELECT RAISE(ABORT, 'messages of an archived session are immutable');
             END;",
            "CREATE TRIGGER IF NOT EXISTS message_immutable_delete
                BEFORE DELETE ON message
                WHEN (SELECT is_archived FROM session WHERE id = OLD.session_id) = 1
             BEGIN
                SELECT RAISE(ABORT, 'messages of an archived session are immutable');
             END;",
        ],
    },
    Migration {
        name: "v8",
        statements: &[
            "CREATE TABLE IF NOT EXISTS note (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT ''
            );",
        ],
    },
    Migration {
        name: "v9",
        statements: &[
            "CREATE TABLE IF NOT EXISTS table_directory (
                name TEXT PRIMARY KEY,
                description TEXT
            );",
        ],
    },
    Migration {
        name: "v10",
        statements: &[
            "CREATE TABLE IF NOT EXISTS workspace (
                id TEXT PRIMARY KEY,
                uri TEXT NOT NULL,
                host_type TEXT NOT NULL,
                owner_client_id TEXT,
                root_path TEXT,
                trust TEXT NOT NULL DEFAULT 'restricted',
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL
            );",
        ],
    },
    Migration {
        name: "v11",
        statements: &[
            "CREATE TABLE IF NOT EXISTS workspace_tool (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL REFERENCES workspace(id),
                tool_id TEXT NOT NULL,
                is_known INTEGER NOT NULL,
                schema TEXT,
                description TEXT
            );",
            "CREATE INDEX IF NOT EXISTS idx_workspace_tool_workspace
                ON workspace_tool(workspace_id);",
        ],
    },
    Migration {
        name: "v12",
        statements: &[
            "CREATE TABLE IF NOT EXISTS client_identity (
                id TEXT PRIMARY KEY,
                hostname TEXT NOT NULL,
                display_name TEXT NOT NULL,
                platform TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL
            );",
        ],
    },
    Migration {
        name: "v13",
        statements: &[
            "ALTER TABLE session ADD COLUMN primary_workspace_id TEXT;",
            "ALTER TABLE session ADD COLUMN attached_workspace_ids TEXT NOT NULL DEFAULT '[]';",
        ],
    },
    Migration {
        name: "v14",
        statements: &[
            "ALTER TABLE message ADD COLUMN tool_calls TEXT NOT NULL DEFAULT '[]';",
            "ALTER TABLE message ADD COLUMN tool_call_id TEXT;",
        ],
    },
    Migration {
        name: "v15",
        statements: &["ALTER TABLE message ADD COLUMN think TEXT;"],
    },
    Migration {
        name: "v16",
        statements: &[
            "ALTER TABLE message ADD COLUMN recalled_memory_ids TEXT NOT NULL DEFAULT '[]';",
        ],
    },
    Migration {
        name: "v17",
        statements: &[
            "ALTER TABLE message ADD COLUMN parent_id TEXT;",
            "ALTER TABLE message ADD COLUMN summary_type TEXT;",
        ],
    },
    Migration {
        name: "v18",
        statements: &[
            "CREATE TABLE IF NOT EXISTS job (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        ],
    },
    Migration {
        name: "v19",
        statements: &["ALTER TABLE job ADD COLUMN parent_id TEXT;"],
    },
    Migration {
        name: "v20",
        statements: &["ALTER TABLE job ADD COLUMN agent_id TEXT NOT NULL DEFAULT '';"],
    },
    Migration {
        name: "v21",
        statements: &["ALTER TABLE job ADD COLUMN logs TEXT NOT NULL DEFAULT '[]';"],
    },
    Migration {
        name: "v22",
        statements: &[
            "ALTER TABLE job ADD COLUMN retry_count INTEGER NOT NULL DEFAULT 0;",
            "ALTER TABLE job ADD COLUMN last_retry_at TEXT;",
        ],
    },
    Migration {
        name: "v23",
        statements: &[
            "ALTER TABLE job ADD COLUMN next_run_at TEXT;",
            "CREATE INDEX IF NOT EXISTS idx_job_status_next_run
                ON job(status, next_run_at, priority);",
        ],
    },
    Migration {
        name: "v24",
        statements: &[
            "CREATE TABLE IF NOT EXISTS agent (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                system_prompt TEXT NOT NULL,
                persona TEXT,
                guardrails TEXT
            );",
        ],
    },
    Migration {
        name: "v25",
        statements: &[
            "CREATE TABLE IF NOT EXISTS compactification_node (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                child_ids TEXT NOT NULL DEFAULT '[]',
                display_hint TEXT NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}'
            );",
        ],
    },
    Migration {
        name: "v26",
        statements: &[
            "CREATE TABLE IF NOT EXISTS workspace_lock (
                workspace_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                locked_at TEXT NOT NULL
            );",
        ],
    },
    Migration {
        name: "v27",
        statements: &[
            "DROP TABLE IF EXISTS note;",
            "ALTER TABLE session ADD COLUMN persona TEXT;",
        ],
    },
];

/// Tables the store manages for itself; excluded from the table directory.
pub(crate) const INTERNAL_TABLES: &[&str] = &["schema_migrations", "table_directory"];

fn is_duplicate_column(e: &rusqlite::Error) -> bool {
    e.to_string().contains("duplicate column name")
}

/// Applies all pending migrations in order. Idempotent.
pub(crate) fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(map_sql_err)?;

    for migration in MIGRATIONS {
        let applied: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM schema_migrations WHERE name = ?1",
                rusqlite::params![migration.name],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(map_sql_err)?;
        if applied {
            continue;
        }
        for stmt in migration.statements {
            match conn.execute_batch(stmt) {
                Ok(()) => {}
                Err(e) if is_duplicate_column(&e) => {
                    tracing::debug!(migration = migration.name, "column already present");
                }
                Err(e) => return Err(map_sql_err(e)),
            }
        }
        conn.execute(
            "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.name, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(map_sql_err)?;
        tracing::debug!(migration = migration.name, "applied");
    }

    super::raw_sql::sync_table_directory_conn(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Re-running the migration set is a no-op.
    #[test]
    fn migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());
    }

    /// **Scenario**: The post-v27 schema has no note table.
    #[test]
    fn post_v27_has_no_note_table() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='note'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    /// **Scenario**: An ALTER ADD COLUMN replayed against an existing column
    /// is tolerated (partial application recovery).
    #[test]
    fn duplicate_column_tolerated() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        // Simulate a half-applied migration by clearing its record.
        conn.execute("DELETE FROM schema_migrations WHERE name='v5'", [])
            .unwrap();
        apply_migrations(&conn).unwrap();
    }
}
