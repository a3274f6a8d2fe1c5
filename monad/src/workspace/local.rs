//! Server-hosted workspace: files under a canonical jail root.
//!
//! Every operation resolves the target against the canonical root and
//! rejects escapes with `AccessDenied`. Filesystem I/O runs on the blocking
//! pool, off the async workers.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::model::WorkspaceRecord;

use super::{Workspace, WorkspaceError, MAX_WRITE_BYTES};

/// Normalizes `.` and `..` without touching the filesystem. Does not resolve
/// symlinks; existing targets are canonicalized afterwards.
fn normalize_path(path: &Path) -> PathBuf {
    let mut buf = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => buf = PathBuf::from(p.as_os_str()),
            Component::RootDir => buf.push(comp),
            Component::CurDir => {}
            Component::ParentDir => {
                buf.pop();
            }
            Component::Normal(s) => buf.push(s),
        }
    }
    buf
}

/// Local workspace bound to a canonical filesystem root.
pub struct LocalWorkspace {
    record: WorkspaceRecord,
    root: PathBuf,
}

impl LocalWorkspace {
    /// Binds the workspace to its root. Fails when the record carries no
    /// root path or the directory does not exist.
    pub fn new(record: WorkspaceRecord) -> Result<Self, WorkspaceError> {
        let root_path = record
            .root_path
            .as_deref()
            .ok_or_else(|| {
                WorkspaceError::InvalidWorkspaceType(format!(
                    "workspace {} has no root path",
                    record.id
                ))
            })?;
        let root = Path::new(root_path)
            .canonicalize()
            .map_err(|e| WorkspaceError::NotFound(format!("root {}: {}", root_path, e)))?;
        Ok(Self { record, root })
    }

    /// Canonical jail root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a workspace-relative path inside the jail.
    fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let trimmed = path.trim().trim_start_matches('/');
        let candidate = normalize_path(&self.root.join(trimmed));
        if !candidate.starts_with(&self.root) {
            return Err(WorkspaceError::AccessDenied(format!(
                "{} escapes workspace root",
                path
            )));
        }
        if candidate.exists() {
            let canonical = candidate
                .canonicalize()
                .map_err(|e| WorkspaceError::Io(e.to_string()))?;
            if !canonical.starts_with(&self.root) {
                return Err(WorkspaceError::AccessDenied(format!(
                    "{} escapes workspace root",
                    path
                )));
            }
            return Ok(canonical);
        }
        Ok(candidate)
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    fn id(&self) -> &str {
        &self.record.id
    }

    fn record(&self) -> &WorkspaceRecord {
        &self.record
    }

    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError> {
        let target = self.resolve(path)?;
        tokio::task::spawn_blocking(move || {
            if !target.is_file() {
                return Err(WorkspaceError::NotFound(target.display().to_string()));
            }
            std::fs::read_to_string(&target).map_err(|e| WorkspaceError::Io(e.to_string()))
        })
        .await
        .map_err(|e| WorkspaceError::Io(e.to_string()))?
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        if content.len() > MAX_WRITE_BYTES {
            return Err(WorkspaceError::TooLarge);
        }
        let target = self.resolve(path)?;
        let content = content.to_string();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::Io(e.to_string()))?;
            }
            // Atomic write: temp file in the same directory, then rename.
            let tmp = target.with_extension(format!(
                "tmp-{}",
                uuid::Uuid::new_v4().simple()
            ));
            std::fs::write(&tmp, content).map_err(|e| WorkspaceError::Io(e.to_string()))?;
            std::fs::rename(&tmp, &target).map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                WorkspaceError::Io(e.to_string())
            })
        })
        .await
        .map_err(|e| WorkspaceError::Io(e.to_string()))?
    }

    async fn list_files(&self) -> Result<Vec<String>, WorkspaceError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in walkdir::WalkDir::new(&root).follow_links(false) {
                let entry = entry.map_err(|e| WorkspaceError::Io(e.to_string()))?;
                if entry.file_type().is_file() {
                    if let Ok(rel) = entry.path().strip_prefix(&root) {
                        files.push(rel.to_string_lossy().into_owned());
                    }
                }
            }
            files.sort();
            Ok(files)
        })
        .await
        .map_err(|e| WorkspaceError::Io(e.to_string()))?
    }

    async fn delete_file(&self, path: &str) -> Result<(), WorkspaceError> {
        let target = self.resolve(path)?;
        tokio::task::spawn_blocking(move || {
            if !target.is_file() {
                return Err(WorkspaceError::NotFound(target.display().to_string()));
            }
            std::fs::remove_file(&target).map_err(|e| WorkspaceError::Io(e.to_string()))
        })
        .await
        .map_err(|e| WorkspaceError::Io(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostType;

    fn workspace_in(dir: &Path) -> LocalWorkspace {
        let mut record = WorkspaceRecord::new(
            format!("monad-test:{}", dir.display()),
            HostType::Server,
        );
        record.root_path = Some(dir.display().to_string());
        LocalWorkspace::new(record).unwrap()
    }

    /// **Scenario**: Write creates parents, read returns the content, list
    /// sees the relative path.
    #[tokio::test(flavor = "multi_thread")]
    async fn write_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_in(dir.path());

        ws.write_file("nested/dir/file.txt", "hello").await.unwrap();
        assert_eq!(ws.read_file("nested/dir/file.txt").await.unwrap(), "hello");

        let files = ws.list_files().await.unwrap();
        assert_eq!(files, vec!["nested/dir/file.txt"]);
    }

    /// **Scenario**: Paths escaping the root fail with AccessDenied no matter
    /// how they are spelled.
    #[tokio::test(flavor = "multi_thread")]
    async fn jail_blocks_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_in(dir.path());

        for path in ["../outside.txt", "a/../../outside.txt", "a/b/../../../etc/passwd"] {
            let err = ws.read_file(path).await.unwrap_err();
            assert!(
                matches!(err, WorkspaceError::AccessDenied(_)),
                "{} should be denied, got {:?}",
                path,
                err
            );
        }
    }

    /// **Scenario**: Deleting a missing file reports NotFound.
    #[tokio::test(flavor = "multi_thread")]
    async fn delete_missing_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_in(dir.path());
        let err = ws.delete_file("ghost.txt").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    /// **Scenario**: Oversized writes are rejected before touching the disk.
    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_write_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_in(dir.path());
        let big = "x".repeat(MAX_WRITE_BYTES + 1);
        let err = ws.write_file("big.txt", &big).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::TooLarge));
    }

    /// **Scenario**: A workspace whose root vanished fails to bind.
    #[test]
    fn missing_root_fails() {
        let mut record = WorkspaceRecord::new("monad-test:/gone", HostType::Server);
        record.root_path = Some("/definitely/not/here/xyz".into());
        assert!(matches!(
            LocalWorkspace::new(record),
            Err(WorkspaceError::NotFound(_))
        ));
    }
}
