//! Job configuration file.
//!
//! # Format
//!
//! ```yaml
//! - job-name: ops-dashboards
//!   grafana-url: https://grafana.example.com
//!   grafana-token: glsa_...
//!   git-repository-url: git@example.com:ops/dashboards.git
//!   private-key-file: /etc/dashsync/id_ed25519
//!   push-configuration:
//!     enable: true
//!     git-branch: main
//!     tag-pattern: sync
//!     push-tags: false
//!   pull-configuration:
//!     enable: true
//!     git-branch: main
//!     filter: "^ops/"
//! ```
//!
//! Loading never touches the network; [`SyncJob::validate`] rejects jobs that
//! could not possibly run before any collaborator is built.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::SyncJob;

/// File read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "configuration.yml";

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// Load every job from the YAML file at `path`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_jobs_at(path: &Path) -> Result<Vec<SyncJob>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_jobs(path, &contents)
}

/// Parse job YAML already read into memory; `origin` is only used for errors.
pub fn parse_jobs(origin: &Path, contents: &str) -> Result<Vec<SyncJob>, ConfigError> {
    // An empty file is an empty job list, not a parse error.
    if contents.trim().is_empty() {
        return Ok(vec![]);
    }
    serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: origin.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// 2. Validate
// ---------------------------------------------------------------------------

impl SyncJob {
    /// Check the job is runnable. Filter patterns are compiled by the engine,
    /// not here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            job: self.job_name.clone(),
            reason: reason.to_owned(),
        };

        if self.job_name.trim().is_empty() {
            return Err(invalid("job-name must not be empty"));
        }
        if self.grafana_url.trim().is_empty() {
            return Err(invalid("grafana-url must not be empty"));
        }
        if self.git_repository_url.trim().is_empty() {
            return Err(invalid("git-repository-url must not be empty"));
        }
        if self.live_auth().is_none() {
            return Err(invalid(
                "set grafana-token or both grafana-user and grafana-password",
            ));
        }
        if self.git_auth().is_none() {
            return Err(invalid(
                "set private-key-file or both git-user-name and git-password",
            ));
        }

        let push = &self.push_configuration;
        if push.enable {
            if push.git_branch.trim().is_empty() {
                return Err(invalid("push-configuration.git-branch must not be empty"));
            }
            if push.tag_pattern.is_empty() {
                return Err(invalid("push-configuration.tag-pattern must not be empty"));
            }
        }
        let pull = &self.pull_configuration;
        if pull.enable && pull.git_branch.trim().is_empty() {
            return Err(invalid("pull-configuration.git-branch must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn io_err(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: PathBuf::from(path),
        source,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
