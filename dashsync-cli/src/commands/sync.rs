//! `dashsync sync`: run every configured job.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use dashsync_core::config::{self, DEFAULT_CONFIG_FILE};
use dashsync_core::SyncJob;
use dashsync_git::GitClient;
use dashsync_grafana::GrafanaClient;
use dashsync_sync::{
    run_all, CommitOutcome, JobOutcome, PullReport, PushReport, Session, SyncError,
};

/// Arguments for `dashsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Job configuration file.
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Report what would change without writing to Grafana or git.
    #[arg(long)]
    pub dry_run: bool,

    /// Print a unified diff for every dashboard the pull phase (would) import.
    #[arg(long)]
    pub show_diff: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let jobs = config::load_jobs_at(&self.config)
            .with_context(|| format!("cannot load jobs from {}", self.config.display()))?;
        tracing::info!(
            config = %self.config.display(),
            jobs = jobs.len(),
            dry_run = self.dry_run,
            "loaded job configuration"
        );
        if jobs.is_empty() {
            println!("No jobs configured in {}.", self.config.display());
            return Ok(());
        }

        let outcomes = run_all(&jobs, self.dry_run, connect);
        print_summary(&outcomes, self.dry_run);
        if self.show_diff {
            print_diffs(&outcomes);
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        if failed > 0 {
            bail!("{failed} of {} jobs failed", outcomes.len());
        }
        Ok(())
    }
}

/// Invalid jobs fail here, inside `run_all`, so the remaining jobs still run.
fn connect(job: &SyncJob) -> Result<Session<GrafanaClient, GitClient>, SyncError> {
    let refuse = |reason: String| SyncError::Connect {
        job: job.job_name.clone(),
        reason,
    };
    job.validate().map_err(|e| refuse(e.to_string()))?;
    let live = GrafanaClient::from_job(job).map_err(|e| refuse(e.to_string()))?;
    Ok(Session::new(
        job.job_name.clone(),
        live,
        GitClient::from_job(job),
    ))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "job")]
    job: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "push")]
    push: String,
    #[tabled(rename = "pull")]
    pull: String,
    #[tabled(rename = "duration")]
    duration: String,
}

fn print_summary(outcomes: &[JobOutcome], dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let rows: Vec<JobRow> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(report) => JobRow {
                job: outcome.job.clone(),
                status: "ok".green().to_string(),
                push: report
                    .push
                    .as_ref()
                    .map_or_else(|| "disabled".to_owned(), describe_push),
                pull: report
                    .pull
                    .as_ref()
                    .map_or_else(|| "disabled".to_owned(), describe_pull),
                duration: format!(
                    "{}ms",
                    (report.finished_at - report.started_at).num_milliseconds()
                ),
            },
            Err(err) => JobRow {
                job: outcome.job.clone(),
                status: "failed".red().bold().to_string(),
                push: err.to_string(),
                pull: "-".to_owned(),
                duration: "-".to_owned(),
            },
        })
        .collect();

    println!("{prefix}dashsync v{} | {} jobs", env!("CARGO_PKG_VERSION"), rows.len());
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn describe_push(report: &PushReport) -> String {
    let commit = match &report.commit {
        CommitOutcome::NothingToCommit => "nothing to commit".to_owned(),
        CommitOutcome::Pushed(id) => format!("pushed {}", short(&id.0)),
        CommitOutcome::Unchanged => "up to date".to_owned(),
        CommitOutcome::Suppressed => "commit suppressed".to_owned(),
    };
    let rejected = match report.rejected() {
        0 => String::new(),
        n => format!(", {n} rejected"),
    };
    format!(
        "{} exported, {} skipped{rejected}, {commit}",
        report.exported(),
        report.skipped()
    )
}

fn describe_pull(report: &PullReport) -> String {
    format!(
        "{} imported, {} up to date, {} skipped @ {}",
        report.imported(),
        report.up_to_date(),
        report.skipped(),
        short(&report.revision.0)
    )
}

fn short(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}

fn print_diffs(outcomes: &[JobOutcome]) {
    for outcome in outcomes {
        let Ok(report) = &outcome.result else {
            continue;
        };
        let Some(pull) = &report.pull else {
            continue;
        };
        for change in &pull.changes {
            println!("{}", format!("# {} :: {}", outcome.job, change.path).bold());
            for line in change.unified_diff.lines() {
                if line.starts_with('+') && !line.starts_with("+++") {
                    println!("{}", line.green());
                } else if line.starts_with('-') && !line.starts_with("---") {
                    println!("{}", line.red());
                } else {
                    println!("{line}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_revision_keeps_eight_characters() {
        assert_eq!(short("0123456789abcdef"), "01234567");
        assert_eq!(short("initial"), "initial");
    }
}
