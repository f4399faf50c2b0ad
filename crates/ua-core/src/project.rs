//! Workspace identity and deterministic project keys.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::ProjectKey;

/// Directory names that indicate a per-workspace checkout rather than the
/// project directory itself.
const WORKSPACE_NAMES: &[&str] = &["default", "main", "dev", "feature", "master"];

/// Number of hex characters kept from the key digest.
const KEY_LEN: usize = 16;

/// The identity of an open workspace: its path plus the version-control
/// remote, when one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceIdentity {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

impl WorkspaceIdentity {
    pub fn new(path: impl Into<String>, remote_url: Option<String>) -> Self {
        Self {
            path: path.into(),
            remote_url,
        }
    }

    /// Derives the stable project key for this workspace.
    ///
    /// The key is a truncated SHA-256 over the normalized path and remote
    /// URL, so the same workspace yields the same key in every process.
    #[must_use]
    pub fn project_key(&self) -> ProjectKey {
        let mut hasher = Sha256::new();
        hasher.update(normalize_path(&self.path));
        hasher.update(b"\n");
        hasher.update(normalize_remote(self.remote_url.as_deref()));

        let digest = format!("{:x}", hasher.finalize());
        ProjectKey::new(&digest[..KEY_LEN]).expect("sha256 hex digest is never empty")
    }

    /// Human-friendly project name.
    ///
    /// Prefers the repo name from the remote URL, falling back to the
    /// workspace directory basename (skipping per-workspace checkout names
    /// like `default`).
    #[must_use]
    pub fn display_name(&self) -> String {
        self.remote_url
            .as_deref()
            .and_then(parse_remote_name)
            .unwrap_or_else(|| extract_project_name(&self.path))
    }
}

/// A known project workspace, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_key: ProjectKey,
    pub display_name: String,
    pub workspace_path: String,
    pub last_active_at: i64,
}

impl Project {
    /// Builds a project record from a workspace identity.
    #[must_use]
    pub fn from_workspace(workspace: &WorkspaceIdentity, now_ms: i64) -> Self {
        Self {
            project_key: workspace.project_key(),
            display_name: workspace.display_name(),
            workspace_path: workspace.path.clone(),
            last_active_at: now_ms,
        }
    }
}

/// Extract repo name from a git remote URL.
pub fn parse_remote_name(url: &str) -> Option<String> {
    let name = url
        .rsplit('/')
        .next()
        .or_else(|| url.rsplit(':').next())?
        .trim_end_matches(".git");

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn normalize_remote(remote: Option<&str>) -> String {
    remote.map_or_else(String::new, |r| r.trim().to_lowercase())
}

/// Extract project name from a workspace path.
fn extract_project_name(path: &str) -> String {
    let path_obj = Path::new(path);
    let basename = path_obj
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    if WORKSPACE_NAMES.contains(&basename) {
        path_obj
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or(basename)
            .to_string()
    } else {
        basename.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_key_is_deterministic() {
        let a = WorkspaceIdentity::new(
            "/home/sami/usage-attribution",
            Some("https://github.com/user/usage-attribution.git".to_string()),
        );
        let b = WorkspaceIdentity::new(
            "/home/sami/usage-attribution",
            Some("https://github.com/user/usage-attribution.git".to_string()),
        );

        assert_eq!(a.project_key(), b.project_key());
        assert_eq!(a.project_key().as_str().len(), KEY_LEN);
    }

    #[test]
    fn project_key_ignores_trailing_slash_and_remote_case() {
        let a = WorkspaceIdentity::new(
            "/home/sami/proj/",
            Some("https://GitHub.com/User/Proj.git".to_string()),
        );
        let b = WorkspaceIdentity::new(
            "/home/sami/proj",
            Some("https://github.com/user/proj.git".to_string()),
        );
        assert_eq!(a.project_key(), b.project_key());
    }

    #[test]
    fn project_key_differs_without_remote() {
        let with_remote = WorkspaceIdentity::new(
            "/home/sami/proj",
            Some("git@github.com:user/proj.git".to_string()),
        );
        let without = WorkspaceIdentity::new("/home/sami/proj", None);
        assert_ne!(with_remote.project_key(), without.project_key());
    }

    #[test]
    fn test_parse_git_remote_url() {
        assert_eq!(
            parse_remote_name("https://github.com/user/usage-attribution.git"),
            Some("usage-attribution".to_string())
        );
        assert_eq!(
            parse_remote_name("git@github.com:user/dotfiles.git"),
            Some("dotfiles".to_string())
        );
    }

    #[test]
    fn display_name_prefers_remote() {
        let ws = WorkspaceIdentity::new(
            "/home/sami/checkouts/default",
            Some("https://github.com/user/tracker.git".to_string()),
        );
        assert_eq!(ws.display_name(), "tracker");
    }

    #[test]
    fn display_name_skips_workspace_checkout_dirs() {
        let ws = WorkspaceIdentity::new("/home/sami/tracker/default", None);
        assert_eq!(ws.display_name(), "tracker");

        let ws = WorkspaceIdentity::new("/home/sami/.dotfiles", None);
        assert_eq!(ws.display_name(), ".dotfiles");
    }

    #[test]
    fn project_from_workspace_carries_timestamp() {
        let ws = WorkspaceIdentity::new("/home/sami/proj", None);
        let project = Project::from_workspace(&ws, 1_000);
        assert_eq!(project.last_active_at, 1_000);
        assert_eq!(project.workspace_path, "/home/sami/proj");
        assert_eq!(project.project_key, ws.project_key());
    }
}
