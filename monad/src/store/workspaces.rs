//! Workspace, workspace-tool, advisory-lock, and client-identity rows.

use rusqlite::params;

use crate::model::{
    ClientIdentity, HostType, TrustLevel, WorkspaceRecord, WorkspaceStatus, WorkspaceToolRecord,
};

use super::{map_sql_err, ts_from_sql, Store, StoreError};

const WORKSPACE_COLUMNS: &str =
    "id, uri, host_type, owner_client_id, root_path, trust, status, created_at";

fn parse_enum<T: std::str::FromStr<Err = String>>(idx: usize, s: String) -> rusqlite::Result<T> {
    s.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn row_to_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceRecord> {
    let host: String = row.get(2)?;
    let trust: String = row.get(5)?;
    let status: String = row.get(6)?;
    let created: String = row.get(7)?;
    Ok(WorkspaceRecord {
        id: row.get(0)?,
        uri: row.get(1)?,
        host_type: parse_enum::<HostType>(2, host)?,
        owner_client_id: row.get(3)?,
        root_path: row.get(4)?,
        trust: parse_enum::<TrustLevel>(5, trust)?,
        status: parse_enum::<WorkspaceStatus>(6, status)?,
        created_at: ts_from_sql(7, created)?,
    })
}

fn row_to_tool(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceToolRecord> {
    let schema: Option<String> = row.get(4)?;
    Ok(WorkspaceToolRecord {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        tool_id: row.get(2)?,
        is_known: row.get::<_, i64>(3)? != 0,
        schema: schema.and_then(|s| serde_json::from_str(&s).ok()),
        description: row.get(5)?,
    })
}

fn row_to_client(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClientIdentity> {
    let registered: String = row.get(4)?;
    let seen: String = row.get(5)?;
    Ok(ClientIdentity {
        id: row.get(0)?,
        hostname: row.get(1)?,
        display_name: row.get(2)?,
        platform: row.get(3)?,
        registered_at: ts_from_sql(4, registered)?,
        last_seen_at: ts_from_sql(5, seen)?,
    })
}

impl Store {
    pub async fn save_workspace(&self, record: &WorkspaceRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO workspace (id, uri, host_type, owner_client_id, root_path, \
                     trust, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(id) DO UPDATE SET \
                     uri = excluded.uri, \
                     host_type = excluded.host_type, \
                     owner_client_id = excluded.owner_client_id, \
                     root_path = excluded.root_path, \
                     trust = excluded.trust, \
                     status = excluded.status",
                params![
                    record.id,
                    record.uri,
                    record.host_type.as_str(),
                    record.owner_client_id,
                    record.root_path,
                    record.trust.as_str(),
                    record.status.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    pub async fn get_workspace(&self, id: &str) -> Result<WorkspaceRecord, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM workspace WHERE id = ?1", WORKSPACE_COLUMNS);
            conn.query_row(&sql, params![id], row_to_workspace)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        StoreError::NotFound(format!("workspace {}", id))
                    }
                    other => map_sql_err(other),
                })
        })
    }

    pub async fn list_workspaces(&self) -> Result<Vec<WorkspaceRecord>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM workspace ORDER BY created_at, id",
                WORKSPACE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt.query_map([], row_to_workspace).map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    /// Workspaces owned by a client.
    pub async fn list_workspaces_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<WorkspaceRecord>, StoreError> {
        let client_id = client_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM workspace WHERE owner_client_id = ?1 ORDER BY created_at, id",
                WORKSPACE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt
                .query_map(params![client_id], row_to_workspace)
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    pub async fn delete_workspace(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM workspace_tool WHERE workspace_id = ?1",
                params![id],
            )
            .map_err(map_sql_err)?;
            conn.execute("DELETE FROM workspace_lock WHERE workspace_id = ?1", params![id])
                .map_err(map_sql_err)?;
            let affected = conn
                .execute("DELETE FROM workspace WHERE id = ?1", params![id])
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("workspace {}", id)));
            }
            Ok(())
        })
    }

    pub async fn save_workspace_tool(
        &self,
        tool: &WorkspaceToolRecord,
    ) -> Result<(), StoreError> {
        let schema = tool
            .schema
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let tool = tool.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO workspace_tool (id, workspace_id, tool_id, is_known, schema, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET \
                     tool_id = excluded.tool_id, \
                     is_known = excluded.is_known, \
                     schema = excluded.schema, \
                     description = excluded.description",
                params![
                    tool.id,
                    tool.workspace_id,
                    tool.tool_id,
                    tool.is_known as i64,
                    schema,
                    tool.description,
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    pub async fn list_workspace_tools(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<WorkspaceToolRecord>, StoreError> {
        let workspace_id = workspace_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, workspace_id, tool_id, is_known, schema, description \
                     FROM workspace_tool WHERE workspace_id = ?1 ORDER BY tool_id",
                )
                .map_err(map_sql_err)?;
            let rows = stmt
                .query_map(params![workspace_id], row_to_tool)
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    pub async fn delete_workspace_tool(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let affected = conn
                .execute("DELETE FROM workspace_tool WHERE id = ?1", params![id])
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("workspace tool {}", id)));
            }
            Ok(())
        })
    }

    /// Acquires the advisory lock on a workspace. Returns false when another
    /// holder has it. Re-acquiring by the same holder refreshes the stamp.
    pub async fn acquire_workspace_lock(
        &self,
        workspace_id: &str,
        holder: &str,
    ) -> Result<bool, StoreError> {
        let workspace_id = workspace_id.to_string();
        let holder = holder.to_string();
        self.with_conn(move |conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT holder FROM workspace_lock WHERE workspace_id = ?1",
                    params![workspace_id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(map_sql_err(other)),
                })?;
            match existing {
                Some(h) if h != holder => Ok(false),
                _ => {
                    conn.execute(
                        "INSERT INTO workspace_lock (workspace_id, holder, locked_at) \
                         VALUES (?1, ?2, ?3) \
                         ON CONFLICT(workspace_id) DO UPDATE SET \
                             holder = excluded.holder, locked_at = excluded.locked_at",
                        params![workspace_id, holder, chrono::Utc::now().to_rfc3339()],
                    )
                    .map_err(map_sql_err)?;
                    Ok(true)
                }
            }
        })
    }

    /// Releases the advisory lock when held by `holder`.
    pub async fn release_workspace_lock(
        &self,
        workspace_id: &str,
        holder: &str,
    ) -> Result<(), StoreError> {
        let workspace_id = workspace_id.to_string();
        let holder = holder.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM workspace_lock WHERE workspace_id = ?1 AND holder = ?2",
                params![workspace_id, holder],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    pub async fn save_client(&self, client: &ClientIdentity) -> Result<(), StoreError> {
        let client = client.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO client_identity (id, hostname, display_name, platform, \
                     registered_at, last_seen_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET \
                     hostname = excluded.hostname, \
                     display_name = excluded.display_name, \
                     platform = excluded.platform, \
                     last_seen_at = excluded.last_seen_at",
                params![
                    client.id,
                    client.hostname,
                    client.display_name,
                    client.platform,
                    client.registered_at.to_rfc3339(),
                    client.last_seen_at.to_rfc3339(),
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    pub async fn get_client(&self, id: &str) -> Result<ClientIdentity, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, hostname, display_name, platform, registered_at, last_seen_at \
                 FROM client_identity WHERE id = ?1",
                params![id],
                row_to_client,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("client {}", id))
                }
                other => map_sql_err(other),
            })
        })
    }

    pub async fn list_clients(&self) -> Result<Vec<ClientIdentity>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, hostname, display_name, platform, registered_at, last_seen_at \
                     FROM client_identity ORDER BY registered_at, id",
                )
                .map_err(map_sql_err)?;
            let rows = stmt.query_map([], row_to_client).map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    pub async fn delete_client(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let affected = conn
                .execute("DELETE FROM client_identity WHERE id = ?1", params![id])
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("client {}", id)));
            }
            Ok(())
        })
    }

    pub async fn touch_client(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE client_identity SET last_seen_at = ?2 WHERE id = ?1",
                params![id, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// **Scenario**: Workspace rows round-trip with their enums.
    #[tokio::test(flavor = "multi_thread")]
    async fn workspace_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut ws = WorkspaceRecord::new("monad-host:/data", HostType::Server);
        ws.root_path = Some("/data".into());
        ws.trust = TrustLevel::Full;
        store.save_workspace(&ws).await.unwrap();

        let loaded = store.get_workspace(&ws.id).await.unwrap();
        assert_eq!(loaded.uri, "monad-host:/data");
        assert_eq!(loaded.host_type, HostType::Server);
        assert_eq!(loaded.trust, TrustLevel::Full);
        assert_eq!(loaded.status, WorkspaceStatus::Active);
    }

    /// **Scenario**: Custom workspace tools keep their inline schema; known
    /// tools carry none.
    #[tokio::test(flavor = "multi_thread")]
    async fn workspace_tools_schema() {
        let store = Store::open_in_memory().unwrap();
        let ws = WorkspaceRecord::new("laptop:/home", HostType::Client);
        store.save_workspace(&ws).await.unwrap();

        let custom = WorkspaceToolRecord {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: ws.id.clone(),
            tool_id: "format_code".into(),
            is_known: false,
            schema: Some(serde_json::json!({"type": "object"})),
            description: Some("Formats code".into()),
        };
        let known = WorkspaceToolRecord {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: ws.id.clone(),
            tool_id: "read_file".into(),
            is_known: true,
            schema: None,
            description: None,
        };
        store.save_workspace_tool(&custom).await.unwrap();
        store.save_workspace_tool(&known).await.unwrap();

        let tools = store.list_workspace_tools(&ws.id).await.unwrap();
        assert_eq!(tools.len(), 2);
        let custom_back = tools.iter().find(|t| t.tool_id == "format_code").unwrap();
        assert!(!custom_back.is_known);
        assert!(custom_back.schema.is_some());
    }

    /// **Scenario**: Advisory locks are explicit: a second holder is refused
    /// until release.
    #[tokio::test(flavor = "multi_thread")]
    async fn advisory_lock_contention() {
        let store = Store::open_in_memory().unwrap();
        let ws = WorkspaceRecord::new("monad-host:/x", HostType::Server);
        store.save_workspace(&ws).await.unwrap();

        assert!(store.acquire_workspace_lock(&ws.id, "sess-a").await.unwrap());
        assert!(!store.acquire_workspace_lock(&ws.id, "sess-b").await.unwrap());
        // Same holder refreshes.
        assert!(store.acquire_workspace_lock(&ws.id, "sess-a").await.unwrap());
        store.release_workspace_lock(&ws.id, "sess-a").await.unwrap();
        assert!(store.acquire_workspace_lock(&ws.id, "sess-b").await.unwrap());
    }

    /// **Scenario**: Registering a client twice updates rather than duplicates.
    #[tokio::test(flavor = "multi_thread")]
    async fn client_upsert() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let client = ClientIdentity {
            id: "c1".into(),
            hostname: "laptop".into(),
            display_name: "Laptop".into(),
            platform: "macos".into(),
            registered_at: now,
            last_seen_at: now,
        };
        store.save_client(&client).await.unwrap();
        let mut renamed = client.clone();
        renamed.display_name = "Work Laptop".into();
        store.save_client(&renamed).await.unwrap();

        let all = store.list_clients().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].display_name, "Work Laptop");
    }
}
