//! Message CRUD. Messages read back in insertion order (created_at, id).

use rusqlite::params;

use crate::model::{ChatMessage, MessageRole, SummaryType};

use super::{from_json_text, map_sql_err, to_json_text, ts_from_sql, Store, StoreError};

const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at, parent_id, \
     tool_calls, tool_call_id, think, recalled_memory_ids, summary_type";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(2)?;
    let created: String = row.get(4)?;
    let tool_calls: String = row.get(6)?;
    let recalled: String = row.get(9)?;
    let summary: Option<String> = row.get(10)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: role.parse::<MessageRole>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        content: row.get(3)?,
        created_at: ts_from_sql(4, created)?,
        parent_id: row.get(5)?,
        tool_calls: from_json_text(&tool_calls),
        tool_call_id: row.get(7)?,
        think: row.get(8)?,
        recalled_memory_ids: from_json_text(&recalled),
        summary_type: summary.and_then(|s| s.parse::<SummaryType>().ok()),
    })
}

impl Store {
    pub async fn save_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let tool_calls = to_json_text(&message.tool_calls)?;
        let recalled = to_json_text(&message.recalled_memory_ids)?;
        let message = message.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO message (id, session_id, role, content, created_at, parent_id, \
                     tool_calls, tool_call_id, think, recalled_memory_ids, summary_type) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    message.id,
                    message.session_id,
                    message.role.as_str(),
                    message.content,
                    message.created_at.to_rfc3339(),
                    message.parent_id,
                    tool_calls,
                    message.tool_call_id,
                    message.think,
                    recalled,
                    message.summary_type.map(|s| s.as_str()),
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    /// All messages of a session in insertion order.
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM message WHERE session_id = ?1 ORDER BY created_at, id",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt
                .query_map(params![session_id], row_to_message)
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    /// Page of messages in insertion order.
    pub async fn list_messages_page(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM message WHERE session_id = ?1 \
                 ORDER BY created_at, id LIMIT ?2 OFFSET ?3",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt
                .query_map(
                    params![session_id, limit as i64, offset as i64],
                    row_to_message,
                )
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    pub async fn delete_message(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let affected = conn
                .execute("DELETE FROM message WHERE id = ?1", params![id])
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("message {}", id)));
            }
            Ok(())
        })
    }
}
