//! git2-backed version store.
//!
//! The remote is cloned once, on the first checkout. Later checkouts fetch
//! and hard-reset the working tree, dropping anything staged but not
//! committed. A branch missing on the remote starts unborn with an empty
//! tree: pulling it reports no commits, pushing it creates the branch.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Cred, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks, Repository, ResetType,
    Signature,
};
use tempfile::TempDir;

use dashsync_core::{
    check_tree_path, CommitId, GitAuth, RepoHandle, StoreError, SyncJob, TreeListing,
    VersionStore,
};

const SERVICE: &str = "git";
const REMOTE: &str = "origin";
const AUTHOR_NAME: &str = "dashboard-sync";
const AUTHOR_EMAIL: &str = "dashboard-sync@localhost";
/// libgit2 re-invokes the credentials callback after every rejection.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

struct LocalClone {
    repo: Repository,
    // Declared after `repo`: removing the directory must come last.
    dir: TempDir,
}

pub struct GitClient {
    url: String,
    auth: Option<GitAuth>,
    clone: Option<LocalClone>,
}

impl fmt::Debug for GitClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitClient")
            .field("url", &self.url)
            .field("cloned", &self.clone.is_some())
            .finish_non_exhaustive()
    }
}

impl GitClient {
    /// `auth` may be `None` for remotes that need no credentials (local paths).
    pub fn new(url: impl Into<String>, auth: Option<GitAuth>) -> Self {
        Self {
            url: url.into(),
            auth,
            clone: None,
        }
    }

    pub fn from_job(job: &SyncJob) -> Self {
        Self::new(job.git_repository_url.clone(), job.git_auth())
    }

    /// Root of the working tree, once cloned.
    pub fn workdir(&self) -> Option<&Path> {
        self.clone.as_ref().map(|c| c.dir.path())
    }

    fn clone_remote(&self) -> Result<LocalClone, StoreError> {
        let dir = TempDir::new()
            .map_err(|e| StoreError::remote(SERVICE, format!("create clone directory: {e}")))?;
        tracing::info!(url = %self.url, "cloning repository");
        let repo = RepoBuilder::new()
            .fetch_options(fetch_options(self.auth.as_ref()))
            .clone(&self.url, dir.path())
            .map_err(|e| git_error("clone", e))?;
        Ok(LocalClone { repo, dir })
    }

    fn checked_out(&self, handle: &RepoHandle) -> Result<&LocalClone, StoreError> {
        let clone = self
            .clone
            .as_ref()
            .ok_or_else(|| StoreError::remote(SERVICE, "repository is not cloned"))?;
        if head_ref_name(&clone.repo).as_deref() != Some(branch_ref(&handle.branch).as_str()) {
            return Err(StoreError::remote(
                SERVICE,
                format!("branch '{}' is not checked out", handle.branch),
            ));
        }
        Ok(clone)
    }
}

impl VersionStore for GitClient {
    fn checkout_or_clone(&mut self, branch: &str) -> Result<RepoHandle, StoreError> {
        if let Some(clone) = &self.clone {
            fetch(clone, &self.url, self.auth.as_ref())?;
        } else {
            let clone = self.clone_remote()?;
            self.clone = Some(clone);
        }
        let clone = self
            .clone
            .as_ref()
            .ok_or_else(|| StoreError::remote(SERVICE, "repository is not cloned"))?;
        reset_to_branch(clone, branch)?;

        tracing::info!(branch = %branch, "checked out branch");
        Ok(RepoHandle {
            branch: branch.to_owned(),
        })
    }

    fn latest_revision_id(&self, handle: &RepoHandle) -> Result<CommitId, StoreError> {
        let clone = self.checked_out(handle)?;
        match clone.repo.refname_to_id(&branch_ref(&handle.branch)) {
            Ok(oid) => Ok(CommitId(oid.to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Err(StoreError::NotFound(format!(
                "commits on branch '{}'",
                handle.branch
            ))),
            Err(e) => Err(git_error("resolve branch", e)),
        }
    }

    fn list_tree(&self, handle: &RepoHandle) -> Result<TreeListing, StoreError> {
        let clone = self.checked_out(handle)?;
        let mut listing = TreeListing::new();
        for folder in read_dir(clone.dir.path())? {
            let Some(folder_name) = visible_name(&folder) else {
                continue;
            };
            if !folder.is_dir() {
                continue;
            }
            let mut files = std::collections::BTreeMap::new();
            for file in read_dir(&folder)? {
                let Some(file_name) = visible_name(&file) else {
                    continue;
                };
                if !file.is_file() {
                    continue;
                }
                let bytes = fs::read(&file).map_err(|e| io_error(&file, e))?;
                files.insert(file_name, bytes);
            }
            if !files.is_empty() {
                listing.insert(folder_name, files);
            }
        }
        Ok(listing)
    }

    fn stage_file(&mut self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        check_tree_path(path)?;
        let clone = self
            .clone
            .as_ref()
            .ok_or_else(|| StoreError::remote(SERVICE, "repository is not cloned"))?;
        let target = clone.dir.path().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::write(&target, bytes).map_err(|e| io_error(&target, e))?;

        let mut index = clone.repo.index().map_err(|e| git_error("open index", e))?;
        index
            .add_path(Path::new(path))
            .map_err(|e| git_error("stage file", e))?;
        index.write().map_err(|e| git_error("write index", e))?;
        tracing::debug!(path = %path, "staged file");
        Ok(())
    }

    fn commit_staged(
        &mut self,
        handle: &RepoHandle,
        message: &str,
    ) -> Result<CommitId, StoreError> {
        let clone = self.checked_out(handle)?;
        let repo = &clone.repo;

        let mut index = repo.index().map_err(|e| git_error("open index", e))?;
        let tree_id = index.write_tree().map_err(|e| git_error("write tree", e))?;
        let parent = match repo.refname_to_id(&branch_ref(&handle.branch)) {
            Ok(oid) => Some(repo.find_commit(oid).map_err(|e| git_error("find parent", e))?),
            Err(e) if e.code() == ErrorCode::NotFound => None,
            Err(e) => return Err(git_error("resolve branch", e)),
        };

        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => index.is_empty(),
        };
        if unchanged {
            return Err(StoreError::NoChanges);
        }

        let tree = repo.find_tree(tree_id).map_err(|e| git_error("find tree", e))?;
        let signature = Signature::now(AUTHOR_NAME, AUTHOR_EMAIL)
            .map_err(|e| git_error("create signature", e))?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(|e| git_error("commit", e))?;
        tracing::info!(branch = %handle.branch, commit = %oid, "created commit");
        Ok(CommitId(oid.to_string()))
    }

    fn push(&mut self, handle: &RepoHandle) -> Result<(), StoreError> {
        let clone = self.checked_out(handle)?;
        let mut remote = clone
            .repo
            .find_remote(REMOTE)
            .map_err(|e| git_error("find remote", e))?;
        let refspec = format!("{0}:{0}", branch_ref(&handle.branch));

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = remote_callbacks(self.auth.as_ref());
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(message.to_owned());
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| git_error("push", e))?;
        }

        if let Some(message) = rejection.into_inner() {
            return Err(StoreError::remote(
                SERVICE,
                format!("push to '{}' rejected: {message}", handle.branch),
            ));
        }
        tracing::info!(branch = %handle.branch, url = %self.url, "pushed branch");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

/// Symbolic target of HEAD; also defined for unborn branches.
fn head_ref_name(repo: &Repository) -> Option<String> {
    repo.find_reference("HEAD")
        .ok()
        .and_then(|head| head.symbolic_target().map(str::to_owned))
}

fn fetch(clone: &LocalClone, url: &str, auth: Option<&GitAuth>) -> Result<(), StoreError> {
    let mut remote = clone
        .repo
        .find_remote(REMOTE)
        .map_err(|e| git_error("find remote", e))?;
    tracing::debug!(url = %url, "fetching repository");
    remote
        .fetch(
            &["+refs/heads/*:refs/remotes/origin/*"],
            Some(&mut fetch_options(auth)),
            None,
        )
        .map_err(|e| git_error("fetch", e))
}

/// Point HEAD at `branch` and make index and working tree match its tip.
fn reset_to_branch(clone: &LocalClone, branch: &str) -> Result<(), StoreError> {
    let repo = &clone.repo;
    let local = branch_ref(branch);
    let tracking = format!("refs/remotes/{REMOTE}/{branch}");

    let tip = match repo.refname_to_id(&tracking) {
        Ok(oid) => Some(oid),
        Err(e) if e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(git_error("resolve remote branch", e)),
    };

    // Everything not in the target tree becomes untracked and is removed.
    let mut index = repo.index().map_err(|e| git_error("open index", e))?;
    index.clear().map_err(|e| git_error("clear index", e))?;
    index.write().map_err(|e| git_error("write index", e))?;

    match tip {
        Some(oid) => {
            repo.reference(&local, oid, true, "dashsync: checkout")
                .map_err(|e| git_error("update branch", e))?;
            repo.set_head(&local).map_err(|e| git_error("set HEAD", e))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|e| git_error("find commit", e))?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force().remove_untracked(true);
            repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))
                .map_err(|e| git_error("reset", e))?;
        }
        None => {
            tracing::info!(branch = %branch, "branch missing on the remote; starting it empty");
            // Drop unpushed local commits so the branch is really unborn.
            match repo.find_reference(&local) {
                Ok(mut stale) => stale
                    .delete()
                    .map_err(|e| git_error("delete stale branch", e))?,
                Err(e) if e.code() == ErrorCode::NotFound => {}
                Err(e) => return Err(git_error("find branch", e)),
            }
            repo.set_head(&local).map_err(|e| git_error("set HEAD", e))?;
            for entry in read_dir(clone.dir.path())? {
                if entry.file_name().is_some_and(|name| name == ".git") {
                    continue;
                }
                let removed = if entry.is_dir() {
                    fs::remove_dir_all(&entry)
                } else {
                    fs::remove_file(&entry)
                };
                removed.map_err(|e| io_error(&entry, e))?;
            }
        }
    }
    Ok(())
}

fn remote_callbacks(auth: Option<&GitAuth>) -> RemoteCallbacks<'_> {
    let attempts = Cell::new(0u32);
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts.set(attempts.get() + 1);
        if attempts.get() > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }
        match auth {
            Some(GitAuth::SshKey(key)) if allowed.is_ssh_key() => {
                Cred::ssh_key(username_from_url.unwrap_or("git"), None, key, None)
            }
            Some(GitAuth::UserPass { user, password }) if allowed.is_user_pass_plaintext() => {
                Cred::userpass_plaintext(user, password.expose())
            }
            _ => Cred::default(),
        }
    });
    callbacks
}

fn fetch_options(auth: Option<&GitAuth>) -> FetchOptions<'_> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(remote_callbacks(auth));
    options
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| io_error(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io_error(dir, e))?;
    entries.sort();
    Ok(entries)
}

/// File name of `path` unless it is hidden (`.git`, `.github`, ...).
fn visible_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    (!name.starts_with('.')).then(|| name.to_owned())
}

fn git_error(what: &str, err: git2::Error) -> StoreError {
    StoreError::remote(SERVICE, format!("{what}: {}", err.message()))
}

fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::remote(SERVICE, format!("{}: {err}", path.display()))
}
