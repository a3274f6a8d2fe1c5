//! Workspace URI: `host:path`, split on the first colon.
//!
//! A host starting with `monad-` marks a server-hosted workspace, `git`
//! marks a repository, anything else is client-hosted.

use super::WorkspaceError;

/// Prefix marking server-hosted workspaces.
pub const SERVER_HOST_PREFIX: &str = "monad-";
/// Host marking repository workspaces.
pub const REPO_HOST: &str = "git";

/// Classification of a URI host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKind {
    Server,
    Repo,
    Client,
}

/// Parsed workspace URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceUri {
    pub host: String,
    pub path: String,
}

impl WorkspaceUri {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }

    /// Parses `host:path`. A missing colon is a parse error.
    pub fn parse(input: &str) -> Result<Self, WorkspaceError> {
        match input.split_once(':') {
            Some((host, path)) if !host.is_empty() => Ok(Self {
                host: host.to_string(),
                path: path.to_string(),
            }),
            _ => Err(WorkspaceError::InvalidUri(format!(
                "expected host:path, got {:?}",
                input
            ))),
        }
    }

    pub fn format(&self) -> String {
        format!("{}:{}", self.host, self.path)
    }

    pub fn host_kind(&self) -> HostKind {
        if self.host.starts_with(SERVER_HOST_PREFIX) {
            HostKind::Server
        } else if self.host == REPO_HOST {
            HostKind::Repo
        } else {
            HostKind::Client
        }
    }
}

impl std::fmt::Display for WorkspaceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: parse(format(u)) == u for constructed URIs.
    #[test]
    fn round_trip() {
        for (host, path) in [
            ("monad-server", "/data/sessions/1"),
            ("git", "github.com/acme/repo"),
            ("laptop", "/Users/dev/project"),
            ("laptop", "C:/with:colons"),
        ] {
            let uri = WorkspaceUri::new(host, path);
            assert_eq!(WorkspaceUri::parse(&uri.format()).unwrap(), uri);
        }
    }

    /// **Scenario**: Host classification by prefix.
    #[test]
    fn host_kinds() {
        assert_eq!(
            WorkspaceUri::parse("monad-x:/a").unwrap().host_kind(),
            HostKind::Server
        );
        assert_eq!(
            WorkspaceUri::parse("git:repo").unwrap().host_kind(),
            HostKind::Repo
        );
        assert_eq!(
            WorkspaceUri::parse("phone:/sdcard").unwrap().host_kind(),
            HostKind::Client
        );
    }

    /// **Scenario**: A URI without a colon fails to parse.
    #[test]
    fn missing_colon_rejected() {
        assert!(matches!(
            WorkspaceUri::parse("no-colon-here"),
            Err(WorkspaceError::InvalidUri(_))
        ));
        assert!(matches!(
            WorkspaceUri::parse(":path-only"),
            Err(WorkspaceError::InvalidUri(_))
        ));
    }
}
