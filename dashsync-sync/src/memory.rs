//! In-memory collaborators.
//!
//! [`MemoryLiveStore`] behaves like the live store on writes: revisions are
//! bumped, ids assigned and `syncOrigin` dropped, because the live schema has
//! no such field. [`MemoryVersionStore`] behaves like a git remote plus one
//! clone: commits are content-addressed, an unchanged tree is `NoChanges`, and
//! commits become visible on the remote only after `push`.
//!
//! Both record what was done to them so tests can assert on side effects.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use dashsync_core::types::fields;
use dashsync_core::{
    check_tree_path, CommitId, DashboardDocument, DashboardHit, DocumentError, FolderRef,
    LiveStore, RepoHandle, StoreError, TreeListing, VersionStore, WriteStatus,
};

const LIVE: &str = "memory live store";
const VCS: &str = "memory version store";

// ---------------------------------------------------------------------------
// Live store
// ---------------------------------------------------------------------------

/// A write accepted by [`MemoryLiveStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub uid: String,
    pub folder_id: i64,
    pub message: String,
}

#[derive(Debug, Clone)]
struct StoredDashboard {
    document: DashboardDocument,
    folder_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryLiveStore {
    dashboards: BTreeMap<String, StoredDashboard>,
    folders: Vec<FolderRef>,
    next_id: i64,
    writes: Vec<RecordedWrite>,
    folders_created: Vec<String>,
    folder_lookups: usize,
}

impl MemoryLiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a dashboard in `folder` (created if needed). Missing `version` and
    /// `id` are filled in as the store would.
    pub fn insert(&mut self, folder: &str, model: Value) -> Result<(), DocumentError> {
        let folder_id = self.ensure_folder(folder);
        let mut document = DashboardDocument::from_model("", model)?;
        if document.field(fields::VERSION).is_none() {
            document.set_revision(1);
        }
        if document.field(fields::ID).is_none() {
            let id = self.allocate_id();
            document.set_internal_id(id);
        }
        let uid = document.uid().to_owned();
        self.dashboards
            .insert(uid, StoredDashboard { document, folder_id });
        Ok(())
    }

    /// The stored dashboard as `get_by_uid` would return it.
    pub fn dashboard(&self, uid: &str) -> Option<DashboardDocument> {
        self.dashboards.get(uid).map(|stored| self.hydrate(stored))
    }

    /// Overwrite a stored revision counter, simulating an out-of-band edit.
    pub fn set_revision(&mut self, uid: &str, revision: i64) {
        if let Some(stored) = self.dashboards.get_mut(uid) {
            stored.document.set_revision(revision);
        }
    }

    pub fn writes(&self) -> &[RecordedWrite] {
        &self.writes
    }

    pub fn folders_created(&self) -> &[String] {
        &self.folders_created
    }

    /// Number of `get_folder` calls that reached the store.
    pub fn folder_lookups(&self) -> usize {
        self.folder_lookups
    }

    fn ensure_folder(&mut self, name: &str) -> i64 {
        if FolderRef::is_reserved(name) {
            return 0;
        }
        if let Some(folder) = self.folders.iter().find(|f| f.name == name) {
            return folder.id;
        }
        let id = self.allocate_id();
        self.folders.push(FolderRef {
            name: name.to_owned(),
            id,
        });
        id
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn folder_name(&self, id: i64) -> String {
        self.folders
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| FolderRef::general().name)
    }

    fn hydrate(&self, stored: &StoredDashboard) -> DashboardDocument {
        let mut document = stored.document.clone();
        document.folder_path = self.folder_name(stored.folder_id);
        document
    }
}

impl LiveStore for MemoryLiveStore {
    fn search_by_tag(&mut self, tag: &str) -> Result<Vec<DashboardHit>, StoreError> {
        Ok(self
            .dashboards
            .values()
            .filter(|stored| stored.document.tags().contains(&tag))
            .map(|stored| DashboardHit {
                uid: stored.document.uid().to_owned(),
                title: stored.document.title().to_owned(),
                folder_id: stored.folder_id,
                folder_title: self.folder_name(stored.folder_id),
            })
            .collect())
    }

    fn get_by_uid(&mut self, uid: &str) -> Result<Option<DashboardDocument>, StoreError> {
        Ok(self.dashboard(uid))
    }

    fn create_or_update(
        &mut self,
        document: &DashboardDocument,
        folder_id: i64,
        message: &str,
    ) -> Result<WriteStatus, StoreError> {
        if folder_id != 0 && !self.folders.iter().any(|f| f.id == folder_id) {
            return Err(StoreError::remote(
                LIVE,
                format!("folder id {folder_id} does not exist"),
            ));
        }

        let mut stored = document.clone();
        stored.folder_path.clear();
        stored.remove_field(fields::SYNC_ORIGIN);

        let mut uid = stored.uid().to_owned();
        if uid.is_empty() {
            uid = format!("generated-{}", self.next_id + 1);
            stored.insert_field(fields::UID, Value::String(uid.clone()));
        }

        let (id, version) = match self.dashboards.get(&uid) {
            Some(existing) => (
                existing.document.internal_id(),
                existing.document.revision() + 1,
            ),
            None => (self.allocate_id(), 1),
        };
        stored.set_internal_id(id);
        stored.set_revision(version);

        self.dashboards.insert(
            uid.clone(),
            StoredDashboard {
                document: stored,
                folder_id,
            },
        );
        self.writes.push(RecordedWrite {
            uid: uid.clone(),
            folder_id,
            message: message.to_owned(),
        });
        Ok(WriteStatus {
            uid,
            version,
            status: "success".to_owned(),
        })
    }

    fn get_folder(&mut self, name: &str) -> Result<Option<FolderRef>, StoreError> {
        if FolderRef::is_reserved(name) {
            return Ok(Some(FolderRef::general()));
        }
        self.folder_lookups += 1;
        Ok(self.folders.iter().find(|f| f.name == name).cloned())
    }

    fn create_folder(&mut self, name: &str) -> Result<FolderRef, StoreError> {
        if FolderRef::is_reserved(name) {
            return Ok(FolderRef::general());
        }
        if self.folders.iter().any(|f| f.name == name) {
            return Err(StoreError::remote(
                LIVE,
                format!("folder '{name}' already exists"),
            ));
        }
        let id = self.ensure_folder(name);
        self.folders_created.push(name.to_owned());
        Ok(FolderRef {
            name: name.to_owned(),
            id,
        })
    }
}

// ---------------------------------------------------------------------------
// Version store
// ---------------------------------------------------------------------------

/// One commit: message plus the full tree (`path` → content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCommit {
    pub id: CommitId,
    pub message: String,
    pub tree: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone)]
struct LocalBranch {
    branch: String,
    history: Vec<MemoryCommit>,
    worktree: BTreeMap<String, Vec<u8>>,
}

/// Branches missing on the remote start from an empty tree.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    remote: BTreeMap<String, Vec<MemoryCommit>>,
    local: Option<LocalBranch>,
    cloned: bool,
    clones: usize,
    pushes: usize,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit with exactly `files` to the remote `branch`.
    pub fn seed_branch<I, P>(&mut self, branch: &str, files: I, message: &str) -> CommitId
    where
        I: IntoIterator<Item = (P, Vec<u8>)>,
        P: Into<String>,
    {
        let tree: BTreeMap<String, Vec<u8>> =
            files.into_iter().map(|(p, b)| (p.into(), b)).collect();
        let history = self.remote.entry(branch.to_owned()).or_default();
        let commit = make_commit(history.last(), message, tree);
        let id = commit.id.clone();
        history.push(commit);
        id
    }

    pub fn remote_commits(&self, branch: &str) -> &[MemoryCommit] {
        self.remote.get(branch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Content of `path` at the remote tip of `branch`.
    pub fn remote_file(&self, branch: &str, path: &str) -> Option<&[u8]> {
        self.remote_commits(branch)
            .last()
            .and_then(|commit| commit.tree.get(path))
            .map(Vec::as_slice)
    }

    pub fn clones(&self) -> usize {
        self.clones
    }

    pub fn pushes(&self) -> usize {
        self.pushes
    }

    fn checked_out(&self, handle: &RepoHandle) -> Result<&LocalBranch, StoreError> {
        match &self.local {
            Some(local) if local.branch == handle.branch => Ok(local),
            _ => Err(not_checked_out(&handle.branch)),
        }
    }
}

impl VersionStore for MemoryVersionStore {
    fn checkout_or_clone(&mut self, branch: &str) -> Result<RepoHandle, StoreError> {
        if !self.cloned {
            self.cloned = true;
            self.clones += 1;
        }
        let history = self.remote.get(branch).cloned().unwrap_or_default();
        let worktree = history
            .last()
            .map(|commit| commit.tree.clone())
            .unwrap_or_default();
        self.local = Some(LocalBranch {
            branch: branch.to_owned(),
            history,
            worktree,
        });
        Ok(RepoHandle {
            branch: branch.to_owned(),
        })
    }

    fn latest_revision_id(&self, handle: &RepoHandle) -> Result<CommitId, StoreError> {
        self.checked_out(handle)?
            .history
            .last()
            .map(|commit| commit.id.clone())
            .ok_or_else(|| StoreError::NotFound(format!("commits on branch '{}'", handle.branch)))
    }

    fn list_tree(&self, handle: &RepoHandle) -> Result<TreeListing, StoreError> {
        let local = self.checked_out(handle)?;
        let mut listing = TreeListing::new();
        for (path, bytes) in &local.worktree {
            let Some((folder, file)) = path.split_once('/') else {
                continue;
            };
            if folder.starts_with('.') || file.contains('/') {
                continue;
            }
            listing
                .entry(folder.to_owned())
                .or_default()
                .insert(file.to_owned(), bytes.clone());
        }
        Ok(listing)
    }

    fn stage_file(&mut self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        check_tree_path(path)?;
        let local = self
            .local
            .as_mut()
            .ok_or_else(|| StoreError::remote(VCS, "no branch checked out"))?;
        local.worktree.insert(path.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn commit_staged(
        &mut self,
        handle: &RepoHandle,
        message: &str,
    ) -> Result<CommitId, StoreError> {
        let local = match self.local.as_mut() {
            Some(local) if local.branch == handle.branch => local,
            _ => return Err(not_checked_out(&handle.branch)),
        };
        let unchanged = local
            .history
            .last()
            .is_some_and(|tip| tip.tree == local.worktree);
        if unchanged || (local.history.is_empty() && local.worktree.is_empty()) {
            return Err(StoreError::NoChanges);
        }
        let commit = make_commit(local.history.last(), message, local.worktree.clone());
        let id = commit.id.clone();
        local.history.push(commit);
        Ok(id)
    }

    fn push(&mut self, handle: &RepoHandle) -> Result<(), StoreError> {
        let local = self.checked_out(handle)?.clone();
        let remote = self.remote.entry(handle.branch.clone()).or_default();
        if !local.history.starts_with(remote) {
            return Err(StoreError::remote(
                VCS,
                format!("push to '{}' rejected: non-fast-forward", handle.branch),
            ));
        }
        *remote = local.history;
        self.pushes += 1;
        Ok(())
    }
}

fn not_checked_out(branch: &str) -> StoreError {
    StoreError::remote(VCS, format!("branch '{branch}' is not checked out"))
}

fn make_commit(
    parent: Option<&MemoryCommit>,
    message: &str,
    tree: BTreeMap<String, Vec<u8>>,
) -> MemoryCommit {
    let mut hasher = Sha256::new();
    if let Some(parent) = parent {
        hasher.update(parent.id.0.as_bytes());
    }
    hasher.update(message.as_bytes());
    for (path, bytes) in &tree {
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(bytes);
    }
    MemoryCommit {
        id: CommitId(hex::encode(hasher.finalize())),
        message: message.to_owned(),
        tree,
    }
}
