//! Persisted entity types shared across the core.
//!
//! These structs mirror the embedded database rows one to one; the store is
//! the only mutator of on-disk state, and every other component receives
//! copies. Timestamps are UTC and persisted as RFC 3339 text.

mod agent;
mod job;
mod memory;
mod message;
mod session;
mod workspace;

pub use agent::AgentProfile;
pub use job::{Job, JobStatus};
pub use memory::{normalize_tags, Memory};
pub use message::{ChatMessage, MessageRole, SummaryType, ToolCallRecord};
pub use session::Session;
pub use workspace::{
    ClientIdentity, CompactionKind, CompactionNode, HostType, TrustLevel, WorkspaceRecord,
    WorkspaceStatus, WorkspaceToolRecord,
};
