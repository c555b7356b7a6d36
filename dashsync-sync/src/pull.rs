//! Pull reconciler: version control → live store.
//!
//! Every file `folder/name` on the branch is parsed, filtered, normalized
//! against the live copy with the same uid and written through only when the
//! two differ. Malformed files abort the phase instead of being skipped.

use dashsync_core::{CommitId, DashboardDocument, FolderRef, LiveStore, PullConfig, VersionStore};

use crate::error::{malformed, SyncError};
use crate::filter::{join_path, PathFilter};
use crate::normalize::{documents_equal, normalize, unified_diff};
use crate::session::Session;

/// Outcome of reconciling one versioned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportResult {
    /// Written to the live store.
    Imported { path: String },
    /// `--dry-run`: the write was suppressed.
    WouldImport { path: String },
    /// Live copy already equal after normalization.
    UpToDate { path: String },
    /// Path did not match the filter.
    Skipped { path: String },
}

/// Unified diff of one dashboard that needed (or would need) an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardChange {
    pub path: String,
    pub unified_diff: String,
}

/// Result of one pull phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    /// Branch tip the files were read from.
    pub revision: CommitId,
    pub results: Vec<ImportResult>,
    pub changes: Vec<DashboardChange>,
}

impl PullReport {
    /// Imports performed, or that would have been performed in a dry run.
    pub fn imported(&self) -> usize {
        self.results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    ImportResult::Imported { .. } | ImportResult::WouldImport { .. }
                )
            })
            .count()
    }

    pub fn up_to_date(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ImportResult::UpToDate { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ImportResult::Skipped { .. }))
            .count()
    }
}

/// A live-store folder for a versioned directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderTarget {
    Resolved(FolderRef),
    /// `--dry-run`: the folder does not exist and was not created.
    Pending(String),
}

impl FolderTarget {
    pub fn id(&self) -> Option<i64> {
        match self {
            FolderTarget::Resolved(folder) => Some(folder.id),
            FolderTarget::Pending(_) => None,
        }
    }
}

/// Find the live folder called `name`, creating it unless `dry_run`.
///
/// The reserved folder resolves to id `0` without touching the store.
pub fn resolve_folder<L: LiveStore>(
    live: &mut L,
    name: &str,
    dry_run: bool,
) -> Result<FolderTarget, SyncError> {
    if FolderRef::is_reserved(name) {
        return Ok(FolderTarget::Resolved(FolderRef::general()));
    }
    if let Some(folder) = live.get_folder(name)? {
        return Ok(FolderTarget::Resolved(folder));
    }
    if dry_run {
        tracing::info!(folder = %name, "[dry-run] would create live folder");
        return Ok(FolderTarget::Pending(name.to_owned()));
    }
    tracing::info!(folder = %name, "creating live folder");
    Ok(FolderTarget::Resolved(live.create_folder(name)?))
}

/// Import every versioned dashboard on `config.git_branch` into the live store.
pub fn pull_dashboards<L, V>(
    session: &mut Session<L, V>,
    config: &PullConfig,
    dry_run: bool,
) -> Result<PullReport, SyncError>
where
    L: LiveStore,
    V: VersionStore,
{
    let filter = PathFilter::compile(config.filter.as_deref())?;
    let job = session.job_name.clone();

    tracing::info!(
        job = %job,
        branch = %config.git_branch,
        filter = %filter.pattern(),
        "starting dashboard import from version control"
    );

    let handle = session.vcs.checkout_or_clone(&config.git_branch)?;
    let revision = session.vcs.latest_revision_id(&handle)?;
    let tree = session.vcs.list_tree(&handle)?;

    let mut report = PullReport {
        revision: revision.clone(),
        results: vec![],
        changes: vec![],
    };

    for (folder_name, files) in &tree {
        let folder = resolve_folder(&mut session.live, folder_name, dry_run)?;

        for (file_name, bytes) in files {
            let file_path = join_path(folder_name, file_name);
            let source = DashboardDocument::from_slice(folder_name.as_str(), bytes)
                .map_err(|e| malformed(&file_path, e))?;
            let path = join_path(folder_name, source.title());

            if !filter.matches(folder_name, source.title()) {
                tracing::info!(
                    job = %job,
                    dashboard = %path,
                    filter = %filter.pattern(),
                    "skipping import: dashboard does not match the filter"
                );
                report.results.push(ImportResult::Skipped { path });
                continue;
            }

            let current = if source.uid().is_empty() {
                None
            } else {
                session.live.get_by_uid(source.uid())?
            };
            let normalized = normalize(&current.unwrap_or_default(), &source);

            if documents_equal(&normalized, &source) {
                tracing::info!(job = %job, dashboard = %path, "dashboard already up to date");
                report.results.push(ImportResult::UpToDate { path });
                continue;
            }

            let diff = unified_diff(&file_path, &normalized, &source)
                .map_err(|e| malformed(&file_path, e))?;
            tracing::debug!(job = %job, dashboard = %path, diff = %diff, "dashboard differs");
            report.changes.push(DashboardChange {
                path: file_path.clone(),
                unified_diff: diff,
            });

            // `resolve_folder` only leaves a folder pending in dry-run.
            let folder_id = match &folder {
                FolderTarget::Resolved(folder) if !dry_run => folder.id,
                _ => {
                    tracing::info!(
                        job = %job,
                        dashboard = %path,
                        folder = %folder_name,
                        "[dry-run] would import dashboard"
                    );
                    report.results.push(ImportResult::WouldImport { path });
                    continue;
                }
            };
            let message = format!(
                "[SYNC] Synchronized dashboard. Version '{}' from origin '{}' (commit {}).",
                source.revision(),
                source.sync_origin(),
                revision
            );
            tracing::info!(job = %job, dashboard = %path, folder = %folder_name, "importing dashboard");
            session.live.create_or_update(&source, folder_id, &message)?;
            report.results.push(ImportResult::Imported { path });
        }
    }

    tracing::info!(
        job = %job,
        imported = report.imported(),
        up_to_date = report.up_to_date(),
        skipped = report.skipped(),
        dry_run,
        "dashboard import finished"
    );
    Ok(report)
}
