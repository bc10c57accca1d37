#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// A throwaway git repository at `<tempdir>/app`, so derived sibling
/// worktree paths stay inside the temp directory.
pub struct TestRepo {
    dir: TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn init() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let root = dir.path().join("app");
        fs::create_dir_all(&root).expect("create repo dir");
        let repo = Self { dir, root };
        repo.git(&["init", "-q"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.git(&["config", "user.name", "tasklog-test"]);
        repo.git(&["config", "user.email", "tasklog-test@example.com"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn temp_path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> PathBuf {
        let path = self.root.join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn commit_file(&self, rel_path: &str, contents: &str, message: &str) {
        self.write_file(rel_path, contents);
        self.git(&["add", rel_path]);
        self.git(&["commit", "-q", "-m", message]);
    }

    /// Run git in the repository root, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        git_in(&self.root, args)
    }

    /// Create a bare repository next to this one and push `main` to it.
    pub fn add_origin(&self) -> PathBuf {
        let remote = self.dir.path().join("origin.git");
        git_in(self.dir.path(), &["init", "-q", "--bare", "origin.git"]);
        git_in(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        self.git(&["remote", "add", "origin", &remote.to_string_lossy()]);
        self.git(&["push", "-q", "-u", "origin", "main"]);
        remote
    }
}

pub fn git_in(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}
