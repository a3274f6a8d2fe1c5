//! Session row: one conversation with its workspace bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conversation session.
///
/// Once `is_archived` is set the row and all its messages become immutable;
/// this is enforced by database triggers, not by callers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    /// Ordered user-facing tags.
    pub tags: Vec<String>,
    /// Working directory on the server, when the session has one.
    pub working_dir: Option<String>,
    /// Primary workspace, when bound.
    pub primary_workspace_id: Option<String>,
    /// Additional attached workspaces, in attach order.
    pub attached_workspace_ids: Vec<String>,
    /// Persona marker; the persona text itself lives in the session's
    /// `Notes/Persona.md`.
    pub persona: Option<String>,
}

impl Session {
    /// Creates a fresh unarchived session with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            is_archived: false,
            tags: Vec::new(),
            working_dir: None,
            primary_workspace_id: None,
            attached_workspace_ids: Vec::new(),
            persona: None,
        }
    }

    /// All workspace ids bound to this session: primary first, then attached.
    pub fn workspace_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        if let Some(ref primary) = self.primary_workspace_id {
            ids.push(primary.clone());
        }
        for id in &self.attached_workspace_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}
