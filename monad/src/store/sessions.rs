//! Session CRUD.

use rusqlite::params;

use crate::model::Session;

use super::{from_json_text, map_sql_err, to_json_text, ts_from_sql, Store, StoreError};

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let created: String = row.get(2)?;
    let updated: String = row.get(3)?;
    let tags: String = row.get(4)?;
    let attached: String = row.get(8)?;
    Ok(Session {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: ts_from_sql(2, created)?,
        updated_at: ts_from_sql(3, updated)?,
        tags: from_json_text(&tags),
        working_dir: row.get(5)?,
        is_archived: row.get::<_, i64>(6)? != 0,
        primary_workspace_id: row.get(7)?,
        attached_workspace_ids: from_json_text(&attached),
        persona: row.get(9)?,
    })
}

const SESSION_COLUMNS: &str = "id, title, created_at, updated_at, tags, working_dir, \
     is_archived, primary_workspace_id, attached_workspace_ids, persona";

impl Store {
    /// Inserts or replaces a session row.
    pub async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let tags = to_json_text(&session.tags)?;
        let attached = to_json_text(&session.attached_workspace_ids)?;
        let session = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO session (id, title, created_at, updated_at, tags, working_dir, \
                     is_archived, primary_workspace_id, attached_workspace_ids, persona) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT(id) DO UPDATE SET \
                     title = excluded.title, \
                     updated_at = excluded.updated_at, \
                     tags = excluded.tags, \
                     working_dir = excluded.working_dir, \
                     is_archived = excluded.is_archived, \
                     primary_workspace_id = excluded.primary_workspace_id, \
                     attached_workspace_ids = excluded.attached_workspace_ids, \
                     persona = excluded.persona",
                params![
                    session.id,
                    session.title,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                    tags,
                    session.working_dir,
                    session.is_archived as i64,
                    session.primary_workspace_id,
                    attached,
                    session.persona,
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    pub async fn get_session(&self, id: &str) -> Result<Session, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM session WHERE id = ?1", SESSION_COLUMNS);
            conn.query_row(&sql, params![id], row_to_session)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        StoreError::NotFound(format!("session {}", id))
                    }
                    other => map_sql_err(other),
                })
        })
    }

    /// Lists sessions most recently updated first.
    pub async fn list_sessions(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM session ORDER BY updated_at DESC, id LIMIT ?1 OFFSET ?2",
                SESSION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt
                .query_map(params![limit as i64, offset as i64], row_to_session)
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    /// Deletes a session and its messages. Fails on archived sessions via the
    /// immutability triggers.
    pub async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM message WHERE session_id = ?1", params![id])
                .map_err(map_sql_err)?;
            let affected = conn
                .execute("DELETE FROM session WHERE id = ?1", params![id])
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("session {}", id)));
            }
            Ok(())
        })
    }

    /// Marks a session archived. Further updates and deletes are rejected by
    /// the schema triggers from then on.
    pub async fn archive_session(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let affected = conn
                .execute(
                    "UPDATE session SET is_archived = 1, updated_at = ?2 WHERE id = ?1",
                    params![id, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("session {}", id)));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Save, fetch, and list round-trip a session row.
    #[tokio::test(flavor = "multi_thread")]
    async fn save_get_list() {
        let store = Store::open_in_memory().unwrap();
        let mut session = Session::new("s1", "first");
        session.tags = vec!["alpha".into(), "beta".into()];
        store.save_session(&session).await.unwrap();

        let loaded = store.get_session("s1").await.unwrap();
        assert_eq!(loaded.title, "first");
        assert_eq!(loaded.tags, vec!["alpha", "beta"]);

        let all = store.list_sessions(0, 10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    /// **Scenario**: Fetching a missing session yields NotFound.
    #[tokio::test(flavor = "multi_thread")]
    async fn get_missing_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.get_session("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    /// **Scenario**: An archived session rejects updates and deletes at the
    /// store layer (trigger-enforced).
    #[tokio::test(flavor = "multi_thread")]
    async fn archived_session_is_immutable() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("s1", "to archive");
        store.save_session(&session).await.unwrap();
        store.archive_session("s1").await.unwrap();

        let mut renamed = store.get_session("s1").await.unwrap();
        renamed.title = "renamed".into();
        let err = store.save_session(&renamed).await.unwrap_err();
        assert!(matches!(err, StoreError::Immutable(_)));

        let err = store.delete_session("s1").await.unwrap_err();
        assert!(matches!(err, StoreError::Immutable(_)));
    }
}
