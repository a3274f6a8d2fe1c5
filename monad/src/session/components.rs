//! Per-session component graph and the debug snapshot.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::context::ContextManager;
use crate::tools::ToolDispatcher;

use super::tool_manager::SessionToolManager;

/// One tool call with its outcome, recorded for the debug snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolCallTrace {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Record of the last turn: structured context, tool traffic, model, turns.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DebugSnapshot {
    /// Structured context fed into the turn (recalled memories, notes, tags).
    pub context: serde_json::Value,
    pub tool_traces: Vec<ToolCallTrace>,
    pub model: String,
    pub turn_count: u32,
}

/// In-memory components owned by the session manager for one session.
pub struct SessionComponents {
    pub context: Arc<ContextManager>,
    pub tools: Arc<SessionToolManager>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub snapshot: Option<DebugSnapshot>,
    pub last_access: Instant,
    /// Job that hydrated this session, when driven by the runner.
    pub parent_job_id: Option<String>,
}

impl SessionComponents {
    pub fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}
