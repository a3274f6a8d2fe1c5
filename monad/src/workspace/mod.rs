//! Workspace subsystem: URI-addressed file roots with jail enforcement.
//!
//! A workspace is either server-hosted (files under a canonical jail root on
//! this machine) or client-hosted (file operations routed to the owning
//! client over the connection manager). Instances are constructed by the
//! [`WorkspaceStore`] factory from persisted records and shared by reference.

mod local;
mod remote;
mod store;
mod uri;

pub use local::LocalWorkspace;
pub use remote::RemoteWorkspace;
pub use store::WorkspaceStore;
pub use uri::{HostKind, WorkspaceUri};

use async_trait::async_trait;

use crate::model::WorkspaceRecord;

/// Maximum size accepted by `write_file`.
pub const MAX_WRITE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Jail violation: the resolved path escapes the workspace root.
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Factory mismatch between record host type and requested variant.
    #[error("invalid workspace type: {0}")]
    InvalidWorkspaceType(String),
    #[error("invalid workspace uri: {0}")]
    InvalidUri(String),
    #[error("io: {0}")]
    Io(String),
    /// Failure reaching the owning client of a remote workspace.
    #[error("remote: {0}")]
    Remote(String),
    #[error("write exceeds {MAX_WRITE_BYTES} bytes")]
    TooLarge,
}

/// One live workspace. File paths are workspace-relative.
#[async_trait]
pub trait Workspace: Send + Sync {
    fn id(&self) -> &str;

    fn record(&self) -> &WorkspaceRecord;

    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError>;

    /// Creates intermediate directories and writes atomically.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError>;

    /// Recursive listing of workspace-relative file paths.
    async fn list_files(&self) -> Result<Vec<String>, WorkspaceError>;

    async fn delete_file(&self, path: &str) -> Result<(), WorkspaceError>;
}
