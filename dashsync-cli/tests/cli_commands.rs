use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use git2::{Repository, Signature};
use predicates::prelude::*;
use tempfile::TempDir;

fn dashsync() -> Command {
    let mut cmd = Command::cargo_bin("dashsync").expect("dashsync binary");
    cmd.env("NO_COLOR", "1").env("RUST_LOG", "warn");
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("configuration.yml");
    fs::write(&path, yaml).expect("write config");
    path
}

/// Bare repository with one commit holding only a README on `main`.
fn bare_remote_with_readme(dir: &Path) {
    let bare = Repository::init_bare(dir).expect("init bare");
    let blob = bare.blob(b"dashboards\n").expect("blob");
    let mut root = bare.treebuilder(None).expect("builder");
    root.insert("README.md", blob, 0o100644).expect("insert");
    let tree = bare.find_tree(root.write().expect("tree")).expect("find tree");
    let sig = Signature::now("seed", "seed@localhost").expect("sig");
    bare.commit(Some("refs/heads/main"), &sig, &sig, "init", &tree, &[])
        .expect("commit");
    bare.set_head("refs/heads/main").expect("head");
}

fn job_yaml(name: &str, grafana: &str, repo: &str, push: bool, pull: bool) -> String {
    format!(
        r#"
- job-name: {name}
  grafana-url: {grafana}
  grafana-token: t0ken
  git-repository-url: {repo}
  git-user-name: bot
  git-password: secret
  push-configuration:
    enable: {push}
    git-branch: main
    tag-pattern: sync
  pull-configuration:
    enable: {pull}
    git-branch: main
"#
    )
}

#[test]
fn validate_accepts_a_well_formed_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &job_yaml("ops", "http://grafana:3000", "git@example.com:ops.git", true, true),
    );

    dashsync()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("ops"))
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn validate_rejects_a_malformed_filter() {
    let dir = TempDir::new().unwrap();
    let mut yaml = job_yaml("ops", "http://grafana:3000", "git@example.com:ops.git", false, true);
    yaml.push_str("    filter: \"([\"\n");
    let config = write_config(&dir, &yaml);

    dashsync()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid filter pattern"))
        .stderr(predicate::str::contains("1 invalid jobs"));
}

#[test]
fn validate_rejects_missing_credentials() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"
- job-name: anon
  grafana-url: http://grafana:3000
  git-repository-url: git@example.com:ops.git
  private-key-file: /keys/id_ed25519
"#,
    );

    dashsync()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("grafana-token"));
}

#[test]
fn sync_without_config_file_fails() {
    let dir = TempDir::new().unwrap();
    dashsync()
        .current_dir(dir.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration not found"));
}

#[test]
fn sync_with_all_phases_disabled_touches_nothing() {
    let dir = TempDir::new().unwrap();
    // Neither endpoint exists; disabled phases must not contact them.
    let config = write_config(
        &dir,
        &job_yaml("idle", "http://127.0.0.1:9", "/nonexistent/repo.git", false, false),
    );

    dashsync()
        .args(["sync", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("idle"))
        .stdout(predicate::str::contains("disabled"));
}

#[test]
fn sync_pulls_from_a_local_repository_without_dashboards() {
    let remote = TempDir::new().unwrap();
    bare_remote_with_readme(remote.path());
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &job_yaml(
            "pull-only",
            "http://127.0.0.1:9",
            &remote.path().to_string_lossy(),
            false,
            true,
        ),
    );

    dashsync()
        .args(["sync", "--dry-run", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry-run]"))
        .stdout(predicate::str::contains("0 imported"));
}

#[test]
fn failing_job_fails_the_run_but_later_jobs_still_run() {
    let dir = TempDir::new().unwrap();
    let mut yaml = job_yaml("unreachable", "http://127.0.0.1:9", "/nonexistent/repo.git", true, false);
    yaml.push_str(&job_yaml("idle", "http://127.0.0.1:9", "/nonexistent/repo.git", false, false));
    let config = write_config(&dir, &yaml);

    dashsync()
        .args(["--log-as-json", "sync", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("unreachable"))
        .stdout(predicate::str::contains("idle"))
        .stderr(predicate::str::contains("1 of 2 jobs failed"));
}

#[test]
fn invalid_job_is_reported_while_the_valid_one_still_runs() {
    let dir = TempDir::new().unwrap();
    let mut yaml = String::from(
        r#"
- job-name: no-credentials
  grafana-url: http://127.0.0.1:9
  git-repository-url: /nonexistent/repo.git
  private-key-file: /keys/id_ed25519
"#,
    );
    yaml.push_str(&job_yaml("idle", "http://127.0.0.1:9", "/nonexistent/repo.git", false, false));
    let config = write_config(&dir, &yaml);

    dashsync()
        .args(["sync", "-c"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("no-credentials"))
        .stdout(predicate::str::contains("grafana-token"))
        .stdout(predicate::str::contains("idle"))
        .stdout(predicate::str::contains("disabled"))
        .stderr(predicate::str::contains("1 of 2 jobs failed"));
}

#[test]
fn short_config_flag_is_accepted() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &job_yaml("ops", "http://grafana:3000", "git@example.com:ops.git", true, true),
    );

    dashsync()
        .args(["validate", "-c"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("ops"));
}
