//! Shared run entrypoint: every configured job, push before pull.

use chrono::{DateTime, Utc};

use dashsync_core::{LiveStore, SyncJob, VersionStore};

use crate::pull::{pull_dashboards, PullReport};
use crate::push::{push_dashboards, PushReport};
use crate::session::Session;
use crate::SyncError;

/// What one job did. A phase is `None` when it is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub push: Option<PushReport>,
    pub pull: Option<PullReport>,
}

/// Per-job result of [`run_all`].
#[derive(Debug)]
pub struct JobOutcome {
    pub job: String,
    pub result: Result<JobReport, SyncError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run one job: push (if enabled), then pull (if enabled).
///
/// The first phase error aborts the job; a failed push skips the pull.
pub fn run_job<L, V>(
    session: &mut Session<L, V>,
    job: &SyncJob,
    dry_run: bool,
) -> Result<JobReport, SyncError>
where
    L: LiveStore,
    V: VersionStore,
{
    let started_at = Utc::now();
    tracing::info!(job = %job.job_name, dry_run, "starting job");

    let push = if job.push_configuration.enable {
        Some(push_dashboards(session, &job.push_configuration, dry_run)?)
    } else {
        tracing::debug!(job = %job.job_name, "push phase disabled");
        None
    };

    let pull = if job.pull_configuration.enable {
        Some(pull_dashboards(session, &job.pull_configuration, dry_run)?)
    } else {
        tracing::debug!(job = %job.job_name, "pull phase disabled");
        None
    };

    let finished_at = Utc::now();
    tracing::info!(
        job = %job.job_name,
        elapsed_ms = (finished_at - started_at).num_milliseconds(),
        "job finished"
    );
    Ok(JobReport {
        job: job.job_name.clone(),
        dry_run,
        started_at,
        finished_at,
        push,
        pull,
    })
}

/// Run every job in order with a fresh session from `connect`.
///
/// Failures are logged and recorded; they never stop later jobs.
pub fn run_all<L, V, F>(jobs: &[SyncJob], dry_run: bool, mut connect: F) -> Vec<JobOutcome>
where
    L: LiveStore,
    V: VersionStore,
    F: FnMut(&SyncJob) -> Result<Session<L, V>, SyncError>,
{
    jobs.iter()
        .map(|job| {
            let result = connect(job).and_then(|mut session| run_job(&mut session, job, dry_run));
            if let Err(err) = &result {
                tracing::error!(job = %job.job_name, error = %err, "job failed");
            }
            JobOutcome {
                job: job.job_name.clone(),
                result,
            }
        })
        .collect()
}
