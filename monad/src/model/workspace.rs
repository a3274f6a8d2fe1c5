//! Workspace, workspace-tool, client-identity, and compaction-node rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a workspace's files live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostType {
    /// Server-hosted, shared across sessions.
    Server,
    /// Server-hosted, private to one session's working directory.
    ServerSession,
    /// Hosted by a remote client; file operations are routed to it.
    Client,
}

impl HostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostType::Server => "server",
            HostType::ServerSession => "serverSession",
            HostType::Client => "client",
        }
    }
}

impl std::str::FromStr for HostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(HostType::Server),
            "serverSession" => Ok(HostType::ServerSession),
            "client" => Ok(HostType::Client),
            other => Err(format!("unknown host type: {}", other)),
        }
    }
}

/// Trust granted to a workspace's tools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Full,
    Restricted,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Full => "full",
            TrustLevel::Restricted => "restricted",
        }
    }
}

impl std::str::FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(TrustLevel::Full),
            "restricted" => Ok(TrustLevel::Restricted),
            other => Err(format!("unknown trust level: {}", other)),
        }
    }
}

/// Whether the workspace's backing root is reachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Active,
    Missing,
}

impl WorkspaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceStatus::Active => "active",
            WorkspaceStatus::Missing => "missing",
        }
    }
}

impl std::str::FromStr for WorkspaceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(WorkspaceStatus::Active),
            "missing" => Ok(WorkspaceStatus::Missing),
            other => Err(format!("unknown workspace status: {}", other)),
        }
    }
}

/// One persisted workspace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: String,
    /// `host:path` form; see [`crate::workspace::WorkspaceUri`].
    pub uri: String,
    pub host_type: HostType,
    /// For client-hosted workspaces: the owning client.
    pub owner_client_id: Option<String>,
    /// For server-hosted workspaces: the jail root on disk.
    pub root_path: Option<String>,
    pub trust: TrustLevel,
    pub status: WorkspaceStatus,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceRecord {
    pub fn new(uri: impl Into<String>, host_type: HostType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            uri: uri.into(),
            host_type,
            owner_client_id: None,
            root_path: None,
            trust: TrustLevel::Restricted,
            status: WorkspaceStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// One tool declared by a workspace: either a reference to a known system
/// tool by id, or a custom declaration carrying an inline JSON schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceToolRecord {
    pub id: String,
    pub workspace_id: String,
    pub tool_id: String,
    pub is_known: bool,
    /// Inline schema for custom tools; `None` for known tools.
    pub schema: Option<serde_json::Value>,
    pub description: Option<String>,
}

/// One registered remote client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub id: String,
    pub hostname: String,
    pub display_name: String,
    pub platform: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Kind of a compaction summary node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompactionKind {
    ToolExecution,
    ToolLoop,
    Broad,
}

impl CompactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactionKind::ToolExecution => "toolExecution",
            CompactionKind::ToolLoop => "toolLoop",
            CompactionKind::Broad => "broad",
        }
    }
}

impl std::str::FromStr for CompactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toolExecution" => Ok(CompactionKind::ToolExecution),
            "toolLoop" => Ok(CompactionKind::ToolLoop),
            "broad" => Ok(CompactionKind::Broad),
            other => Err(format!("unknown compaction kind: {}", other)),
        }
    }
}

/// Summary node in the tree of compressed messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompactionNode {
    pub id: String,
    pub session_id: String,
    pub kind: CompactionKind,
    /// Ids of the messages or nodes this summary covers.
    pub child_ids: Vec<String>,
    pub display_hint: String,
    pub metadata: HashMap<String, String>,
}

impl CompactionNode {
    pub fn new(session_id: impl Into<String>, kind: CompactionKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            kind,
            child_ids: Vec::new(),
            display_hint: String::new(),
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Host types round-trip through their string form.
    #[test]
    fn host_type_round_trip() {
        for ht in [HostType::Server, HostType::ServerSession, HostType::Client] {
            assert_eq!(ht.as_str().parse::<HostType>().unwrap(), ht);
        }
    }

    /// **Scenario**: Compaction kinds round-trip through their string form.
    #[test]
    fn compaction_kind_round_trip() {
        for k in [
            CompactionKind::ToolExecution,
            CompactionKind::ToolLoop,
            CompactionKind::Broad,
        ] {
            assert_eq!(k.as_str().parse::<CompactionKind>().unwrap(), k);
        }
    }
}
