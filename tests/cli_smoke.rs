mod support;

use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

use support::TestRepo;

fn tasklog(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tasklog").expect("binary");
    cmd.current_dir(dir).env_remove("TASKLOG_REPO").env_remove("RUST_LOG");
    cmd
}

fn json(dir: &Path, args: &[&str]) -> Value {
    let output = tasklog(dir)
        .arg("--json")
        .args(args)
        .output()
        .expect("run tasklog");
    serde_json::from_slice(&output.stdout).expect("json envelope")
}

#[test]
fn help_works() {
    Command::cargo_bin("tasklog")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("task logs and worktrees"));
}

#[test]
fn subcommand_help_works() {
    for cmd in [
        "add",
        "list",
        "ready",
        "show",
        "update",
        "start",
        "complete",
        "delete",
        "reopen",
        "relate",
        "unrelate",
        "why-blocked",
        "worktree",
        "pull",
    ] {
        Command::cargo_bin("tasklog")
            .expect("binary")
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}

#[test]
fn blocked_task_flow() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    tasklog(root).args(["add", "Write schema"]).assert().success();
    let added = json(root, &["add", "Use schema", "--blocked-by", "1", "--type", "feature"]);
    assert_eq!(added["status"], "success");
    assert_eq!(added["data"]["task"]["id"], 2);
    assert_eq!(added["data"]["task"]["type"], "feature");

    let ready = json(root, &["ready"]);
    assert_eq!(ready["data"]["total"], 1);
    assert_eq!(ready["data"]["tasks"][0]["id"], 1);

    let output = tasklog(root).args(["--json", "start", "2"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    let err: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(err["status"], "error");
    assert_eq!(err["command"], "start");
    assert_eq!(err["error"]["kind"], "task_blocked");
    assert_eq!(err["error"]["details"]["blocking_ids"][0], 1);

    let why = json(root, &["why-blocked", "2"]);
    assert_eq!(why["data"]["is_blocked"], true);
    assert_eq!(why["data"]["blocking_ids"][0], 1);

    let blocker = json(root, &["show", "1"]);
    assert_eq!(blocker["data"]["blocks"], serde_json::json!([2]));
    assert!(json(root, &["show", "2"])["data"].get("blocks").is_none());

    tasklog(root).args(["complete", "1"]).assert().success();
    let ready = json(root, &["ready"]);
    assert_eq!(ready["data"]["tasks"][0]["id"], 2);

    let archive = std::fs::read_to_string(root.join(".tasks/archive.jsonl")).unwrap();
    assert!(archive.contains("\"status\":\"closed\""));

    let started = json(root, &["start", "2"]);
    assert_eq!(started["data"]["task"]["status"], "in-progress");
    assert!(root.join(".tasks/current.json").exists());
    tasklog(root).args(["complete", "2"]).assert().success();
    assert!(!root.join(".tasks/current.json").exists());
}

#[test]
fn errors_use_exit_codes() {
    let dir = TempDir::new().unwrap();

    tasklog(dir.path())
        .args(["show", "99"])
        .assert()
        .code(2)
        .stderr(contains("Task not found: 99"));

    tasklog(dir.path())
        .args(["add", "x", "--type", "epic"])
        .assert()
        .code(2);

    tasklog(dir.path())
        .args(["worktree", "list"])
        .assert()
        .code(2)
        .stderr(contains("Not a git repository"));
}

#[test]
fn list_all_includes_archive() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    tasklog(root).args(["add", "keep"]).assert().success();
    tasklog(root).args(["add", "drop"]).assert().success();
    tasklog(root).args(["delete", "2"]).assert().success();

    assert_eq!(json(root, &["list"])["data"]["total"], 1);
    assert_eq!(json(root, &["list", "--all"])["data"]["total"], 2);
    assert_eq!(json(root, &["list", "--status", "deleted"])["data"]["tasks"][0]["id"], 2);

    tasklog(root).args(["reopen", "2"]).assert().success();
    assert_eq!(json(root, &["list"])["data"]["total"], 2);
}

#[test]
fn start_with_worktree_in_git_repo() {
    let repo = TestRepo::init();
    repo.commit_file("README.md", "base\n", "initial commit");

    let added = json(repo.path(), &["add", "Parallel work", "--commit"]);
    assert_eq!(added["data"]["commit"]["success"], true);

    let started = json(repo.path(), &["start", "1", "--worktree"]);
    let path = started["data"]["worktree"]["path"].as_str().unwrap().to_string();
    assert!(path.ends_with("app-1-parallel-work"));
    assert!(Path::new(&path).join("README.md").exists());
    assert_eq!(started["data"]["worktree"]["branch"], "task/1-parallel-work");

    let listed = json(repo.path(), &["worktree", "list"]);
    assert_eq!(listed["data"]["total"], 2);

    tasklog(repo.path())
        .args(["worktree", "remove", "1"])
        .assert()
        .success();
    assert!(!Path::new(&path).exists());
}

#[test]
fn worktree_remove_resolves_relative_path_against_repo() {
    let repo = TestRepo::init();
    repo.commit_file("README.md", "base\n", "initial commit");
    let repo_arg = repo.path().to_string_lossy().into_owned();

    tasklog(repo.path()).args(["add", "Elsewhere"]).assert().success();
    let started = json(repo.path(), &["start", "1", "--worktree"]);
    let path = started["data"]["worktree"]["path"].as_str().unwrap().to_string();
    assert!(Path::new(&path).exists());

    tasklog(repo.temp_path())
        .args(["--repo", &repo_arg, "worktree", "remove", "../app-1-elsewhere"])
        .assert()
        .success();
    assert!(!Path::new(&path).exists());
}

#[test]
fn conflicting_pull_reports_remediation() {
    let repo = TestRepo::init();
    repo.commit_file("README.md", "base\n", "initial commit");
    let origin = repo.add_origin();

    let other = repo.temp_path().join("other");
    support::git_in(
        repo.temp_path(),
        &["clone", "-q", &origin.to_string_lossy(), "other"],
    );
    support::git_in(&other, &["config", "user.name", "tasklog-test"]);
    support::git_in(&other, &["config", "user.email", "tasklog-test@example.com"]);
    std::fs::write(other.join("README.md"), "theirs\n").unwrap();
    support::git_in(&other, &["commit", "-q", "-am", "theirs"]);
    support::git_in(&other, &["push", "-q", "origin", "main"]);

    repo.commit_file("README.md", "ours\n", "ours");

    let output = tasklog(repo.path()).args(["--json", "pull"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    let err: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(err["command"], "pull");
    assert_eq!(err["error"]["kind"], "pull_failed");
    assert_eq!(err["error"]["details"]["kind"], "conflict");
    assert!(err["next_steps"][0]
        .as_str()
        .unwrap()
        .contains("resolve the conflicting files"));
}
