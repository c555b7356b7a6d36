//! Push reconciler: live store → version control.
//!
//! 1. Compile the path filter (fatal when malformed).
//! 2. Search the live store for the tag; no hits is a successful no-op.
//! 3. Check the branch out.
//! 4. Per hit: fetch, filter, reject titles that do not map to a plain
//!    `folder/title.json` path, drop the tag, stamp `syncOrigin`, write the
//!    stripped copy back to the live store, stage the file.
//! 5. Commit and push once.
//!
//! Any store error aborts the phase; nothing is retried.

use dashsync_core::{
    check_tree_path, CommitId, DashboardDocument, LiveStore, PushConfig, RepoHandle, StoreError,
    VersionStore,
};

use crate::error::{malformed, SyncError};
use crate::filter::PathFilter;
use crate::session::Session;

/// Revision shown in messages when the branch has no commits yet.
const UNBORN_REVISION: &str = "initial";

/// Outcome of exporting one matched dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportResult {
    /// Written back to the live store and staged.
    Exported { path: String },
    /// `--dry-run`: staged only, the live-store write was suppressed.
    WouldExport { path: String },
    /// Path did not match the filter.
    Skipped { path: String },
    /// Folder or title cannot be stored as `folder/title.json` (a `/` in the
    /// title, `..`, a leading dot). Neither written back nor staged.
    Rejected { path: String, reason: String },
}

/// What happened to the staged tree at the end of the phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing matched the tag (or the filter), so nothing was committed.
    NothingToCommit,
    /// Committed and pushed.
    Pushed(CommitId),
    /// The staged files equal the branch tip.
    Unchanged,
    /// `--dry-run`: commit and push were suppressed.
    Suppressed,
}

/// Result of one push phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    /// Dashboards returned by the tag search.
    pub matched: usize,
    pub results: Vec<ExportResult>,
    pub commit: CommitOutcome,
}

impl PushReport {
    /// Dashboards staged into the working tree (dry-run included).
    pub fn exported(&self) -> usize {
        self.results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    ExportResult::Exported { .. } | ExportResult::WouldExport { .. }
                )
            })
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ExportResult::Skipped { .. }))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ExportResult::Rejected { .. }))
            .count()
    }
}

/// Export every live dashboard tagged `config.tag_pattern` into the VCS.
pub fn push_dashboards<L, V>(
    session: &mut Session<L, V>,
    config: &PushConfig,
    dry_run: bool,
) -> Result<PushReport, SyncError>
where
    L: LiveStore,
    V: VersionStore,
{
    let filter = PathFilter::compile(config.filter.as_deref())?;
    let tag = config.tag_pattern.as_str();
    let job = session.job_name.clone();

    tracing::info!(
        job = %job,
        branch = %config.git_branch,
        filter = %filter.pattern(),
        tag = %tag,
        preserve_tags = config.preserve_tags_on_export,
        "starting dashboard export into version control"
    );

    let hits = session.live.search_by_tag(tag)?;
    if hits.is_empty() {
        tracing::info!(job = %job, tag = %tag, "no dashboards carry the tag");
        return Ok(PushReport {
            matched: 0,
            results: vec![],
            commit: CommitOutcome::NothingToCommit,
        });
    }
    tracing::info!(job = %job, amount = hits.len(), "fetched tagged dashboards");

    let handle = session.vcs.checkout_or_clone(&config.git_branch)?;
    let revision = branch_revision(&session.vcs, &handle)?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in &hits {
        let Some(mut document) = session.live.get_by_uid(&hit.uid)? else {
            return Err(StoreError::NotFound(format!("dashboard '{}'", hit.uid)).into());
        };
        if document.folder_path.is_empty() {
            document.folder_path = hit.folder_title.clone();
        }
        let path = document.file_path();

        if !filter.matches(&document.folder_path, document.title()) {
            tracing::info!(
                job = %job,
                dashboard = %path,
                filter = %filter.pattern(),
                "skipping export: dashboard does not match the filter"
            );
            results.push(ExportResult::Skipped { path });
            continue;
        }
        if let Err(err) = check_tree_path(&path) {
            tracing::warn!(
                job = %job,
                uid = %hit.uid,
                dashboard = %path,
                error = %err,
                "skipping export: dashboard cannot be stored under this path"
            );
            results.push(ExportResult::Rejected {
                path,
                reason: err.to_string(),
            });
            continue;
        }

        if !config.preserve_tags_on_export {
            document.remove_tag_once(tag);
        }
        document.set_sync_origin(&job);
        let bytes = document.to_bytes().map_err(|e| malformed(&path, e))?;

        let message = export_message(&document, &job, tag, &revision, config);
        if dry_run {
            tracing::info!(job = %job, dashboard = %path, "[dry-run] would update live dashboard");
        } else {
            tracing::info!(job = %job, dashboard = %path, "updating live dashboard");
            session
                .live
                .create_or_update(&document, hit.folder_id, &message)?;
        }

        tracing::info!(job = %job, dashboard = %path, "staging dashboard");
        session.vcs.stage_file(&path, &bytes)?;
        results.push(if dry_run {
            ExportResult::WouldExport { path }
        } else {
            ExportResult::Exported { path }
        });
    }

    let mut report = PushReport {
        matched: hits.len(),
        results,
        commit: CommitOutcome::NothingToCommit,
    };
    if report.exported() == 0 {
        tracing::info!(job = %job, "no dashboard passed the filter; nothing to commit");
        return Ok(report);
    }
    if dry_run {
        tracing::info!(job = %job, staged = report.exported(), "[dry-run] would commit and push");
        report.commit = CommitOutcome::Suppressed;
        return Ok(report);
    }

    let commit_message = format!("Synchronized dashboards with tag <{tag}>");
    report.commit = match session.vcs.commit_staged(&handle, &commit_message) {
        Ok(commit) => {
            tracing::info!(job = %job, commit = %commit, "pushing dashboards to the remote repository");
            session.vcs.push(&handle)?;
            CommitOutcome::Pushed(commit)
        }
        Err(StoreError::NoChanges) => {
            tracing::info!(job = %job, "versioned dashboards already up to date; nothing to push");
            CommitOutcome::Unchanged
        }
        Err(err) => return Err(err.into()),
    };
    Ok(report)
}

fn branch_revision<V: VersionStore>(vcs: &V, handle: &RepoHandle) -> Result<String, SyncError> {
    match vcs.latest_revision_id(handle) {
        Ok(commit) => Ok(commit.0),
        Err(StoreError::NotFound(_)) => Ok(UNBORN_REVISION.to_owned()),
        Err(err) => Err(err.into()),
    }
}

fn export_message(
    document: &DashboardDocument,
    job: &str,
    tag: &str,
    revision: &str,
    config: &PushConfig,
) -> String {
    let action = if config.preserve_tags_on_export {
        "Exported dashboard".to_owned()
    } else {
        format!("Deleted '{tag}' tag")
    };
    format!(
        "[SYNC] {action}. Version '{}' exported by job '{job}' (commit {revision}).",
        document.revision()
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory::{MemoryLiveStore, MemoryVersionStore};

    fn push_config(tag: &str) -> PushConfig {
        PushConfig {
            enable: true,
            git_branch: "main".into(),
            filter: None,
            tag_pattern: tag.into(),
            preserve_tags_on_export: false,
        }
    }

    fn session_with(live: MemoryLiveStore) -> Session<MemoryLiveStore, MemoryVersionStore> {
        let mut vcs = MemoryVersionStore::new();
        vcs.seed_branch("main", [("README.md", b"dashboards\n".to_vec())], "init");
        Session::new("export-job", live, vcs)
    }

    #[test]
    fn no_tagged_dashboards_is_a_noop() {
        let mut live = MemoryLiveStore::new();
        live.insert("ops", json!({"uid": "u1", "title": "cpu", "tags": ["other"]}))
            .expect("seed");
        let mut session = session_with(live);

        let report = push_dashboards(&mut session, &push_config("sync"), false).expect("push");
        assert_eq!(report.matched, 0);
        assert_eq!(report.commit, CommitOutcome::NothingToCommit);
        assert_eq!(session.vcs.clones(), 0, "no checkout without matches");
        assert!(session.live.writes().is_empty());
    }

    #[test]
    fn malformed_filter_fails_before_any_request() {
        let mut session = session_with(MemoryLiveStore::new());
        let mut config = push_config("sync");
        config.filter = Some("(".into());
        let err = push_dashboards(&mut session, &config, false).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPattern { .. }));
        assert_eq!(session.vcs.clones(), 0);
    }

    #[test]
    fn tag_is_removed_once_and_origin_stamped() {
        let mut live = MemoryLiveStore::new();
        live.insert(
            "ops",
            json!({"uid": "u1", "title": "cpu", "tags": ["keep", "sync", "sync"]}),
        )
        .expect("seed");
        let mut session = session_with(live);

        push_dashboards(&mut session, &push_config("sync"), false).expect("push");

        let exported = session
            .vcs
            .remote_file("main", "ops/cpu.json")
            .expect("exported file");
        let exported = DashboardDocument::from_slice("ops", exported).expect("parse");
        assert_eq!(exported.tags(), vec!["keep", "sync"]);
        assert_eq!(exported.sync_origin(), "export-job");
    }

    #[test]
    fn preserve_tags_keeps_the_selection_tag() {
        let mut live = MemoryLiveStore::new();
        live.insert("ops", json!({"uid": "u1", "title": "cpu", "tags": ["sync"]}))
            .expect("seed");
        let mut session = session_with(live);
        let mut config = push_config("sync");
        config.preserve_tags_on_export = true;

        push_dashboards(&mut session, &config, false).expect("push");

        let exported = session.vcs.remote_file("main", "ops/cpu.json").expect("file");
        let exported = DashboardDocument::from_slice("ops", exported).expect("parse");
        assert_eq!(exported.tags(), vec!["sync"]);
        assert!(session.live.writes()[0].message.contains("Exported dashboard"));
    }

    #[test]
    fn filtered_out_dashboards_are_not_written_or_committed() {
        let mut live = MemoryLiveStore::new();
        live.insert("dev", json!({"uid": "u1", "title": "cpu", "tags": ["sync"]}))
            .expect("seed");
        let mut session = session_with(live);
        let mut config = push_config("sync");
        config.filter = Some("^ops/".into());

        let report = push_dashboards(&mut session, &config, false).expect("push");
        assert_eq!(report.matched, 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.commit, CommitOutcome::NothingToCommit);
        assert!(session.live.writes().is_empty());
        assert_eq!(session.vcs.pushes(), 0);
    }

    #[test]
    fn titles_that_escape_the_folder_are_rejected_untouched() {
        let mut live = MemoryLiveStore::new();
        live.insert("teamB", json!({"uid": "u1", "title": "teamA/old", "tags": ["sync"]}))
            .expect("seed");
        live.insert("ops", json!({"uid": "u2", "title": "../../x", "tags": ["sync"]}))
            .expect("seed");
        live.insert("ops", json!({"uid": "u3", "title": "cpu", "tags": ["sync"]}))
            .expect("seed");
        let mut session = session_with(live);

        let report = push_dashboards(&mut session, &push_config("sync"), false).expect("push");

        assert_eq!(report.matched, 3);
        assert_eq!(report.rejected(), 2);
        assert_eq!(report.exported(), 1);
        assert_eq!(report.skipped(), 0);
        assert_eq!(session.live.writes().len(), 1);
        assert_eq!(session.live.writes()[0].uid, "u3");
        assert_eq!(session.live.dashboard("u1").expect("u1").tags(), vec!["sync"]);
        assert!(session.vcs.remote_file("main", "ops/cpu.json").is_some());
        assert!(session.vcs.remote_file("main", "teamB/teamA/old.json").is_none());
    }

    #[test]
    fn live_write_message_embeds_revision_job_and_commit() {
        let mut live = MemoryLiveStore::new();
        live.insert("ops", json!({"uid": "u1", "title": "cpu", "tags": ["sync"], "version": 4}))
            .expect("seed");
        let mut session = session_with(live);
        let tip = session.vcs.remote_commits("main")[0].id.clone();

        push_dashboards(&mut session, &push_config("sync"), false).expect("push");

        let write = &session.live.writes()[0];
        assert!(write.message.contains("Deleted 'sync' tag"));
        assert!(write.message.contains("Version '4'"));
        assert!(write.message.contains("export-job"));
        assert!(write.message.contains(&tip.0));
    }

    #[test]
    fn unchanged_export_skips_the_push() {
        let mut live = MemoryLiveStore::new();
        live.insert("ops", json!({"uid": "u1", "title": "cpu", "tags": ["sync"]}))
            .expect("seed");
        let mut session = session_with(live);
        let mut config = push_config("sync");
        config.preserve_tags_on_export = true;

        let first = push_dashboards(&mut session, &config, false).expect("first push");
        assert!(matches!(first.commit, CommitOutcome::Pushed(_)));

        // The write-back bumped the live revision, so pin it to the exported one.
        let exported = session.vcs.remote_file("main", "ops/cpu.json").expect("file").to_vec();
        let exported = DashboardDocument::from_slice("ops", &exported).expect("parse");
        session.live.set_revision("u1", exported.revision());

        let second = push_dashboards(&mut session, &config, false).expect("second push");
        assert_eq!(second.commit, CommitOutcome::Unchanged);
        assert_eq!(session.vcs.pushes(), 1);
    }

    #[test]
    fn unborn_branch_is_reported_as_initial() {
        let mut live = MemoryLiveStore::new();
        live.insert("ops", json!({"uid": "u1", "title": "cpu", "tags": ["sync"]}))
            .expect("seed");
        let mut session = Session::new("export-job", live, MemoryVersionStore::new());

        let report = push_dashboards(&mut session, &push_config("sync"), false).expect("push");
        assert!(matches!(report.commit, CommitOutcome::Pushed(_)));
        assert!(session.live.writes()[0].message.contains("(commit initial)"));
        assert_eq!(session.vcs.remote_commits("main").len(), 1);
    }
}
