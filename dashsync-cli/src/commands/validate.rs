//! `dashsync validate`: check the job configuration offline.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use dashsync_core::config::{self, DEFAULT_CONFIG_FILE};
use dashsync_core::SyncJob;
use dashsync_sync::PathFilter;

/// Arguments for `dashsync validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Job configuration file.
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Tabled)]
struct ValidationRow {
    #[tabled(rename = "job")]
    job: String,
    #[tabled(rename = "push")]
    push: String,
    #[tabled(rename = "pull")]
    pull: String,
    #[tabled(rename = "result")]
    result: String,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let jobs = config::load_jobs_at(&self.config)
            .with_context(|| format!("cannot load jobs from {}", self.config.display()))?;

        let mut problems = 0usize;
        let rows: Vec<ValidationRow> = jobs
            .iter()
            .map(|job| {
                let result = match check(job) {
                    Ok(()) => "valid".green().to_string(),
                    Err(reason) => {
                        problems += 1;
                        reason.red().to_string()
                    }
                };
                ValidationRow {
                    job: job.job_name.clone(),
                    push: describe_phase(
                        job.push_configuration.enable,
                        &job.push_configuration.git_branch,
                        Some(job.push_configuration.tag_pattern.as_str()),
                    ),
                    pull: describe_phase(
                        job.pull_configuration.enable,
                        &job.pull_configuration.git_branch,
                        None,
                    ),
                    result,
                }
            })
            .collect();

        println!("{} | {} jobs", self.config.display(), rows.len());
        if !rows.is_empty() {
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }

        if problems > 0 {
            bail!("{problems} invalid jobs in {}", self.config.display());
        }
        Ok(())
    }
}

/// Config validation plus filter compilation, as the first request would do.
fn check(job: &SyncJob) -> Result<(), String> {
    job.validate().map_err(|e| e.to_string())?;
    for filter in [
        &job.push_configuration.filter,
        &job.pull_configuration.filter,
    ] {
        PathFilter::compile(filter.as_deref()).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn describe_phase(enable: bool, branch: &str, tag: Option<&str>) -> String {
    match (enable, tag) {
        (false, _) => "disabled".to_owned(),
        (true, Some(tag)) => format!("{branch} (tag {tag})"),
        (true, None) => branch.to_owned(),
    }
}
