//! Compaction summary nodes: the persisted tree of compressed messages.

use std::collections::HashMap;

use rusqlite::params;

use crate::model::{CompactionKind, CompactionNode};

use super::{map_sql_err, Store, StoreError};

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<CompactionNode> {
    let kind: String = row.get(2)?;
    let child_ids: String = row.get(3)?;
    let metadata: String = row.get(5)?;
    Ok(CompactionNode {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: kind.parse::<CompactionKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        child_ids: serde_json::from_str(&child_ids).unwrap_or_default(),
        display_hint: row.get(4)?,
        metadata: serde_json::from_str::<HashMap<String, String>>(&metadata).unwrap_or_default(),
    })
}

impl Store {
    pub async fn save_compaction_node(&self, node: &CompactionNode) -> Result<(), StoreError> {
        let child_ids = serde_json::to_string(&node.child_ids)?;
        let metadata = serde_json::to_string(&node.metadata)?;
        let node = node.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO compactification_node (id, session_id, kind, child_ids, \
                     display_hint, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET \
                     kind = excluded.kind, \
                     child_ids = excluded.child_ids, \
                     display_hint = excluded.display_hint, \
                     metadata = excluded.metadata",
                params![
                    node.id,
                    node.session_id,
                    node.kind.as_str(),
                    child_ids,
                    node.display_hint,
                    metadata,
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    pub async fn list_compaction_nodes(
        &self,
        session_id: &str,
    ) -> Result<Vec<CompactionNode>, StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, kind, child_ids, display_hint, metadata \
                     FROM compactification_node WHERE session_id = ?1 ORDER BY id",
                )
                .map_err(map_sql_err)?;
            let rows = stmt
                .query_map(params![session_id], row_to_node)
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }
}
