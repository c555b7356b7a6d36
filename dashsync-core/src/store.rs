//! Interfaces of the two stores the engine reconciles.
//!
//! Concrete network clients live in `dashsync-grafana` and `dashsync-git`;
//! `dashsync-sync::memory` provides in-process implementations.

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::{CommitId, DashboardDocument, DashboardHit, FolderRef, RepoHandle, WriteStatus};

/// Working-tree snapshot: folder name → file name → file content.
pub type TreeListing = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// The dashboard-serving backend.
pub trait LiveStore {
    /// All dashboards carrying `tag`.
    fn search_by_tag(&mut self, tag: &str) -> Result<Vec<DashboardHit>, StoreError>;

    /// The full document for `uid`, or `None` when the store has no such dashboard.
    fn get_by_uid(&mut self, uid: &str) -> Result<Option<DashboardDocument>, StoreError>;

    /// Create or overwrite a dashboard inside folder `folder_id`.
    ///
    /// `message` is stored as the revision note and never read back.
    fn create_or_update(
        &mut self,
        document: &DashboardDocument,
        folder_id: i64,
        message: &str,
    ) -> Result<WriteStatus, StoreError>;

    /// Look a folder up by name. The reserved folder resolves without a request.
    fn get_folder(&mut self, name: &str) -> Result<Option<FolderRef>, StoreError>;

    /// Create a folder. The reserved folder is returned as-is, never created.
    fn create_folder(&mut self, name: &str) -> Result<FolderRef, StoreError>;
}

/// The version-controlled file tree.
pub trait VersionStore {
    /// Check `branch` out, cloning on first use. Repeated calls within one job
    /// reset the working tree instead of cloning again.
    fn checkout_or_clone(&mut self, branch: &str) -> Result<RepoHandle, StoreError>;

    /// Tip revision of the checked-out branch; `NotFound` when it has no commits.
    fn latest_revision_id(&self, handle: &RepoHandle) -> Result<CommitId, StoreError>;

    /// Two-level view of the working tree.
    fn list_tree(&self, handle: &RepoHandle) -> Result<TreeListing, StoreError>;

    /// Write `bytes` at `path` (relative to the tree root) and stage it.
    ///
    /// Implementations reject paths failing [`check_tree_path`] before
    /// touching the working tree.
    fn stage_file(&mut self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Commit everything staged; `NoChanges` when the tree did not change.
    fn commit_staged(&mut self, handle: &RepoHandle, message: &str)
        -> Result<CommitId, StoreError>;

    /// Publish local commits of the handle's branch to the remote.
    fn push(&mut self, handle: &RepoHandle) -> Result<(), StoreError>;
}

/// Accept only `folder/file` where both parts are plain, visible names.
///
/// Rejects traversal (`..`), absolute paths, extra separators and hidden
/// entries, none of which [`VersionStore::list_tree`] would read back.
pub fn check_tree_path(path: &str) -> Result<(), StoreError> {
    let invalid = |reason| StoreError::InvalidPath {
        path: path.to_owned(),
        reason,
    };
    let (folder, file) = path
        .split_once('/')
        .ok_or_else(|| invalid("expected folder/file"))?;
    for part in [folder, file] {
        if part.is_empty() {
            return Err(invalid("empty component"));
        }
        if part.contains(['/', '\\', '\0']) {
            return Err(invalid("component contains a path separator"));
        }
        if part.starts_with('.') {
            return Err(invalid("component is hidden or relative"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_folder_and_file_are_accepted() {
        assert!(check_tree_path("ops/cpu.json").is_ok());
        assert!(check_tree_path("General/home dashboard.json").is_ok());
    }

    #[test]
    fn paths_leaving_the_two_level_tree_are_rejected() {
        for path in [
            "cpu.json",
            "/etc/cpu.json",
            "ops/../../cpu.json",
            "../ops.json",
            "ops/..",
            "teamB/teamA/old.json",
            "ops\\..\\cpu.json/x.json",
            ".git/config",
            "ops/",
        ] {
            let err = check_tree_path(path).unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidPath { .. }),
                "{path} should be rejected"
            );
        }
    }
}
