//! `GitCli` against throwaway repositories.
//!
//! Skipped when no `git` binary is available.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::path::Path;
use std::process::Command;

use logbook_git_tooling::{GitCli, Vcs};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn git_cli() -> Option<GitCli> {
    match GitCli::locate() {
        Ok(git) => Some(git),
        Err(err) => {
            eprintln!("skipping: {err}");
            None
        }
    }
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["config", "user.email", "dev@example.com"]);
    git(dir.path(), &["config", "user.name", "Dev"]);
    git(dir.path(), &["config", "commit.gpgsign", "false"]);
    dir
}

fn staged_names(dir: &Path) -> Vec<String> {
    let output = Command::new("git")
        .args(["diff", "--cached", "--name-only"])
        .current_dir(dir)
        .output()
        .expect("spawn git");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn detects_repository() {
    let Some(git) = git_cli() else { return };
    let repo = init_repo();
    let plain = TempDir::new().expect("temp dir");

    assert!(git.is_repository(repo.path()));
    assert!(!git.is_repository(plain.path()));
}

#[test]
fn status_and_diff_before_first_commit() {
    let Some(git) = git_cli() else { return };
    let repo = init_repo();
    fs::write(repo.path().join("notes.txt"), "hello\n").expect("write");
    crate::git(repo.path(), &["add", "notes.txt"]);

    let status = git.status(repo.path()).expect("status");
    assert!(status.contains("notes.txt"));

    let diff = git.combined_diff(repo.path()).expect("diff");
    assert!(diff.contains("+hello"));
}

#[test]
fn stage_all_skips_excluded_names() {
    let Some(git) = git_cli() else { return };
    let git = git.with_excluded([".logbook.lock", ".logbook.draft.yaml"]);
    let repo = init_repo();
    fs::write(repo.path().join("src.rs"), "fn main() {}\n").expect("write");
    fs::write(repo.path().join(".logbook.lock"), "pid: 1\n").expect("write");
    fs::write(repo.path().join(".logbook.draft.yaml"), "changes: []\n").expect("write");

    git.stage_all(repo.path()).expect("stage all");
    assert_eq!(staged_names(repo.path()), vec!["src.rs".to_string()]);
}

#[test]
fn stage_file_and_commit_returns_head() {
    let Some(git) = git_cli() else { return };
    let repo = init_repo();
    fs::write(repo.path().join("LOGBOOK.yaml"), "---\nchanges: []\n").expect("write");
    fs::write(repo.path().join("other.txt"), "unstaged\n").expect("write");

    git.stage_file(repo.path(), Path::new("LOGBOOK.yaml"))
        .expect("stage file");
    assert_eq!(staged_names(repo.path()), vec!["LOGBOOK.yaml".to_string()]);

    let commit_id = git.commit(repo.path(), "docs: record checkpoint").expect("commit");
    assert_eq!(commit_id.len(), 40);

    let diff = git.combined_diff(repo.path()).expect("diff");
    assert!(diff.is_empty());
}

#[test]
fn commit_with_nothing_staged_fails() {
    let Some(git) = git_cli() else { return };
    let repo = init_repo();
    let err = git.commit(repo.path(), "empty").unwrap_err();
    assert!(err.to_string().contains("git commit"));
}
