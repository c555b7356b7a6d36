//! Job configuration loading tests for `dashsync-core`.
//!
//! Each `#[case]` is isolated; nothing is shared between cases.

use std::path::PathBuf;

use assert_fs::prelude::*;
use dashsync_core::{config::load_jobs_at, ConfigError, GitAuth, LiveAuth, SyncJob};
use predicates::prelude::*;
use rstest::rstest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const FULL: &str = r#"
- job-name: ops-export
  grafana-url: https://grafana.example.com
  grafana-user: admin
  grafana-password: admin-pw
  git-repository-url: git@example.com:ops/dashboards.git
  private-key-file: /etc/dashsync/id_ed25519
  push-configuration:
    enable: true
    git-branch: main
    filter: "^ops/"
    tag-pattern: sync
    push-tags: true
  pull-configuration:
    enable: true
    git-branch: import
- job-name: team-import
  grafana-url: https://grafana.example.com
  grafana-token: glsa_abc
  git-repository-url: https://example.com/dash.git
  git-user-name: bot
  git-password: bot-pw
  pull-configuration:
    enable: true
    git-branch: main
"#;

fn valid_job() -> SyncJob {
    let file = assert_fs::NamedTempFile::new("jobs.yml").expect("tempfile");
    file.write_str(FULL).expect("write");
    load_jobs_at(file.path()).expect("load").remove(1)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

#[test]
fn full_configuration_loads_every_field() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("configuration.yml");
    file.write_str(FULL).expect("write");
    file.assert(predicate::path::exists());

    let jobs = load_jobs_at(file.path()).expect("load");
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        job.validate().expect("valid job");
    }

    let export = &jobs[0];
    assert_eq!(export.job_name, "ops-export");
    assert!(export.push_configuration.enable);
    assert_eq!(export.push_configuration.git_branch, "main");
    assert_eq!(export.push_configuration.filter.as_deref(), Some("^ops/"));
    assert_eq!(export.push_configuration.tag_pattern, "sync");
    assert!(export.push_configuration.preserve_tags_on_export);
    assert_eq!(export.pull_configuration.git_branch, "import");
    assert!(matches!(export.live_auth(), Some(LiveAuth::Basic { ref user, .. }) if user == "admin"));
    assert_eq!(
        export.git_auth(),
        Some(GitAuth::SshKey(PathBuf::from("/etc/dashsync/id_ed25519")))
    );

    let import = &jobs[1];
    assert!(!import.push_configuration.enable);
    assert!(import.pull_configuration.enable);
}

#[test]
fn unknown_top_level_shape_is_a_parse_error() {
    let file = assert_fs::NamedTempFile::new("jobs.yml").expect("tempfile");
    file.write_str("job-name: not-a-list\n").expect("write");
    let err = load_jobs_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("jobs.yml"));
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

#[rstest]
#[case::empty_name(|j: &mut SyncJob| j.job_name.clear(), "job-name")]
#[case::empty_grafana_url(|j: &mut SyncJob| j.grafana_url.clear(), "grafana-url")]
#[case::empty_git_url(|j: &mut SyncJob| j.git_repository_url.clear(), "git-repository-url")]
#[case::no_live_auth(|j: &mut SyncJob| j.grafana_token = None, "grafana-token")]
#[case::no_git_auth(|j: &mut SyncJob| j.git_password = None, "private-key-file")]
#[case::pull_without_branch(|j: &mut SyncJob| j.pull_configuration.git_branch.clear(), "pull-configuration.git-branch")]
#[case::push_without_branch(
    |j: &mut SyncJob| { j.push_configuration.enable = true; j.push_configuration.tag_pattern = "sync".into(); },
    "push-configuration.git-branch"
)]
#[case::push_without_tag(
    |j: &mut SyncJob| { j.push_configuration.enable = true; j.push_configuration.git_branch = "main".into(); },
    "tag-pattern"
)]
fn invalid_jobs_are_rejected(#[case] mutate: fn(&mut SyncJob), #[case] expected: &str) {
    let mut job = valid_job();
    job.validate().expect("baseline is valid");
    mutate(&mut job);
    let err = job.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
    assert!(
        err.to_string().contains(expected),
        "'{err}' should mention '{expected}'"
    );
}

#[test]
fn disabled_phases_need_no_branch() {
    let mut job = valid_job();
    job.pull_configuration.enable = false;
    job.pull_configuration.git_branch.clear();
    job.validate().expect("disabled pull needs no branch");
}
