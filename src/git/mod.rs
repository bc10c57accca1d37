//! Git driver: branches, commits, pulls and worktrees.
//!
//! All process access goes through a [`GitRunner`]. Repository-wide
//! worktree operations are always issued from the main repository root,
//! even when called with a path inside a secondary worktree.
//!
//! `commit` and `pull` report expected failures in their outcome value
//! instead of returning `Err`: a failed commit must not abort task
//! completion, and a repository without a remote is a normal setup.

mod classify;
mod runner;
mod worktree;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::GitConfig;
use crate::error::{Error, Result};

pub use classify::{classify_pull_failure, exit_class, ExitClass, PullFailureKind};
pub use runner::{GitCall, GitOutput, GitRunner, ScriptedGit, SystemGit};
pub use worktree::{
    branch_name, is_secondary_worktree, locate_repo, main_repo_root, parse_porcelain, same_path,
    short_branch, slugify, worktree_path, RepoLocation, WorktreeEntry,
};

/// Result of [`Git::commit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommitOutcome {
    fn committed(commit: String) -> Self {
        Self {
            success: true,
            commit: Some(commit),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            commit: None,
            error: Some(error.into()),
        }
    }
}

/// Result of [`Git::pull`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullOutcome {
    pub success: bool,
    /// Whether new changes were brought in.
    pub pulled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PullFailureKind>,
    /// Raw git output for failures and no-op pulls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Tracking state of the current branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "count")]
pub enum PushStatus {
    NoUpstream,
    UpToDate,
    Unpushed(usize),
}

#[derive(Debug, Clone)]
pub struct Git<R: GitRunner = SystemGit> {
    runner: R,
    remote: String,
    default_branches: Vec<String>,
}

impl Git<SystemGit> {
    pub fn system(config: &GitConfig) -> Self {
        Self::with_config(SystemGit::new(), config)
    }
}

impl<R: GitRunner> Git<R> {
    pub fn new(runner: R) -> Self {
        Self::with_config(runner, &GitConfig::default())
    }

    pub fn with_config(runner: R, config: &GitConfig) -> Self {
        Self {
            runner,
            remote: config.remote.clone(),
            default_branches: config.default_branches.clone(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput> {
        self.runner.run(dir, args)
    }

    /// Run and require success, returning trimmed stdout.
    fn run_ok(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self.run(dir, args)?;
        if !output.success() {
            return Err(Error::GitFailed {
                command: args.join(" "),
                stderr: output.combined(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Current branch name, `None` when HEAD is detached.
    pub fn current_branch(&self, dir: &Path) -> Result<Option<String>> {
        let name = self.run_ok(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        if name == "HEAD" || name.is_empty() {
            Ok(None)
        } else {
            Ok(Some(name))
        }
    }

    /// Default branch: the remote's HEAD, then the first configured
    /// candidate that exists locally, then the current branch.
    pub fn default_branch(&self, dir: &Path) -> Result<String> {
        let remote_head = format!("refs/remotes/{}/HEAD", self.remote);
        let output = self.run(dir, &["symbolic-ref", "--quiet", "--short", remote_head.as_str()])?;
        if output.success() {
            let name = output.stdout.trim();
            let prefix = format!("{}/", self.remote);
            let name = name.strip_prefix(&prefix).unwrap_or(name);
            if !name.is_empty() {
                return Ok(name.to_string());
            }
        }

        for candidate in &self.default_branches {
            if self.branch_exists(dir, candidate)? {
                return Ok(candidate.clone());
            }
        }

        if let Some(current) = self.current_branch(dir).ok().flatten() {
            return Ok(current);
        }
        Ok(self
            .default_branches
            .first()
            .cloned()
            .unwrap_or_else(|| "main".to_string()))
    }

    pub fn branch_exists(&self, dir: &Path, name: &str) -> Result<bool> {
        let reference = format!("refs/heads/{}", short_branch(name));
        let output = self.run(dir, &["rev-parse", "--verify", "--quiet", reference.as_str()])?;
        Ok(output.success())
    }

    pub fn checkout(&self, dir: &Path, name: &str) -> Result<()> {
        self.run_ok(dir, &["checkout", name])?;
        Ok(())
    }

    pub fn create_and_checkout(&self, dir: &Path, name: &str) -> Result<()> {
        self.run_ok(dir, &["checkout", "-b", name])?;
        Ok(())
    }

    // =========================================================================
    // Commit and pull
    // =========================================================================

    /// Stage exactly `files` and commit them.
    pub fn commit(&self, dir: &Path, files: &[PathBuf], message: &str) -> CommitOutcome {
        if files.is_empty() {
            return CommitOutcome::failed("no files to commit");
        }
        let paths: Vec<String> = files
            .iter()
            .map(|file| file.to_string_lossy().into_owned())
            .collect();

        let mut add: Vec<&str> = vec!["add", "--"];
        add.extend(paths.iter().map(String::as_str));
        match self.run(dir, &add) {
            Ok(output) if output.success() => {}
            Ok(output) => return CommitOutcome::failed(output.combined()),
            Err(err) => return CommitOutcome::failed(err.to_string()),
        }

        let mut commit: Vec<&str> = vec!["commit", "-m", message, "--"];
        commit.extend(paths.iter().map(String::as_str));
        match self.run(dir, &commit) {
            Ok(output) if output.success() => {}
            Ok(output) => {
                let text = output.combined();
                let lower = text.to_lowercase();
                let error = if lower.contains("nothing to commit")
                    || lower.contains("nothing added to commit")
                    || lower.contains("no changes added to commit")
                {
                    "nothing to commit".to_string()
                } else {
                    text
                };
                return CommitOutcome::failed(error);
            }
            Err(err) => return CommitOutcome::failed(err.to_string()),
        }

        match self.run_ok(dir, &["rev-parse", "HEAD"]) {
            Ok(sha) => CommitOutcome::committed(sha),
            Err(err) => CommitOutcome::failed(err.to_string()),
        }
    }

    /// Pull `branch` from the configured remote with merge semantics.
    pub fn pull(&self, dir: &Path, branch: &str) -> PullOutcome {
        let output = match self.run(dir, &["pull", "--no-rebase", self.remote.as_str(), branch]) {
            Ok(output) => output,
            Err(err) => {
                return PullOutcome {
                    success: false,
                    pulled: false,
                    failure: Some(PullFailureKind::Other),
                    message: Some(err.to_string()),
                }
            }
        };

        if output.success() {
            let up_to_date = output.stdout.contains("Already up to date")
                || output.stdout.contains("Already up-to-date");
            return PullOutcome {
                success: true,
                pulled: !up_to_date,
                failure: None,
                message: None,
            };
        }

        let text = output.combined();
        let kind = classify_pull_failure(output.code, &text);
        if kind == PullFailureKind::NoRemote {
            tracing::info!(remote = %self.remote, branch, "no remote to pull from; continuing");
            return PullOutcome {
                success: true,
                pulled: false,
                failure: Some(kind),
                message: Some(text),
            };
        }

        PullOutcome {
            success: false,
            pulled: false,
            failure: Some(kind),
            message: Some(text),
        }
    }

    /// Whether the current branch has commits its upstream lacks.
    pub fn push_status(&self, dir: &Path) -> Result<PushStatus> {
        let upstream = self.run(
            dir,
            &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
        )?;
        if !upstream.success() {
            let text = upstream.combined().to_lowercase();
            if text.contains("no upstream")
                || text.contains("does not point to a branch")
                || text.contains("no such branch")
            {
                return Ok(PushStatus::NoUpstream);
            }
            return Err(Error::GitFailed {
                command: "rev-parse @{u}".to_string(),
                stderr: upstream.combined(),
            });
        }

        let count = self.run_ok(dir, &["rev-list", "--count", "@{u}..HEAD"])?;
        let count: usize = count.parse().map_err(|_| {
            Error::OperationFailed(format!("unexpected rev-list output: {count}"))
        })?;
        Ok(if count == 0 {
            PushStatus::UpToDate
        } else {
            PushStatus::Unpushed(count)
        })
    }

    // =========================================================================
    // Worktrees
    // =========================================================================

    pub fn main_repo_root(&self, dir: &Path) -> Result<PathBuf> {
        main_repo_root(dir)
    }

    pub fn list_worktrees(&self, dir: &Path) -> Result<Vec<WorktreeEntry>> {
        let root = main_repo_root(dir)?;
        let listing = self.run_ok(&root, &["worktree", "list", "--porcelain"])?;
        Ok(parse_porcelain(&listing))
    }

    pub fn worktree_exists(&self, dir: &Path, path: &Path) -> Result<bool> {
        Ok(self
            .list_worktrees(dir)?
            .iter()
            .any(|entry| same_path(&entry.path, path)))
    }

    pub fn find_worktree_for_branch(
        &self,
        dir: &Path,
        branch: &str,
    ) -> Result<Option<WorktreeEntry>> {
        let branch = short_branch(branch);
        Ok(self
            .list_worktrees(dir)?
            .into_iter()
            .find(|entry| entry.branch.as_deref() == Some(branch.as_str())))
    }

    /// Create a worktree at `path` on `branch`.
    ///
    /// An existing branch is checked out as-is; a new branch is created
    /// from `base_branch` (or HEAD). Re-creating the same worktree for the
    /// same branch is a no-op.
    pub fn create_worktree(
        &self,
        dir: &Path,
        path: &Path,
        branch: &str,
        base_branch: Option<&str>,
    ) -> Result<PathBuf> {
        let root = main_repo_root(dir)?;

        if let Some(existing) = self.find_worktree_for_branch(&root, branch)? {
            if same_path(&existing.path, path) {
                return Ok(existing.path);
            }
            return Err(Error::InvalidArgument(format!(
                "branch '{}' is already checked out at {}",
                branch,
                existing.path.display()
            )));
        }

        if path.exists() {
            let is_empty = path
                .read_dir()
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                return Err(Error::InvalidArgument(format!(
                    "worktree path already exists and is not empty: {}",
                    path.display()
                )));
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_arg = path.to_string_lossy().into_owned();
        if self.branch_exists(&root, branch)? {
            self.run_ok(&root, &["worktree", "add", path_arg.as_str(), branch])?;
        } else {
            let mut args = vec!["worktree", "add", "-b", branch, path_arg.as_str()];
            if let Some(base) = base_branch {
                args.push(base);
            }
            self.run_ok(&root, &args)?;
        }

        tracing::info!(path = %path.display(), branch, "worktree created");
        Ok(path.to_path_buf())
    }

    /// Remove the worktree at `path`.
    ///
    /// Without `force`, refuses when the worktree's branch has commits that
    /// are not on its upstream.
    pub fn remove_worktree(&self, dir: &Path, path: &Path, force: bool) -> Result<()> {
        let root = main_repo_root(dir)?;
        if same_path(&root, path) {
            return Err(Error::InvalidArgument(
                "refusing to remove the main worktree".to_string(),
            ));
        }
        if !self.worktree_exists(&root, path)? {
            return Err(Error::WorktreeNotFound(path.to_path_buf()));
        }

        if !force && path.exists() {
            match self.push_status(path)? {
                PushStatus::Unpushed(count) => {
                    return Err(Error::UnpushedCommits {
                        path: path.to_path_buf(),
                        count,
                    });
                }
                PushStatus::NoUpstream => {
                    tracing::warn!(path = %path.display(), "worktree branch has no upstream; its branch is kept");
                }
                PushStatus::UpToDate => {}
            }
        }

        let path_arg = path.to_string_lossy().into_owned();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(path_arg.as_str());
        self.run_ok(&root, &args)?;
        tracing::info!(path = %path.display(), "worktree removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> &'static Path {
        Path::new("/repo")
    }

    #[test]
    fn current_branch_detached_is_none() {
        let git = Git::new(ScriptedGit::new().on(&["rev-parse"], GitOutput::ok("HEAD\n")));
        assert_eq!(git.current_branch(dir()).unwrap(), None);
    }

    #[test]
    fn default_branch_prefers_remote_head() {
        let git = Git::new(
            ScriptedGit::new().on(&["symbolic-ref"], GitOutput::ok("origin/trunk\n")),
        );
        assert_eq!(git.default_branch(dir()).unwrap(), "trunk");
    }

    #[test]
    fn default_branch_falls_back_to_candidates() {
        let git = Git::new(
            ScriptedGit::new()
                .on(&["symbolic-ref"], GitOutput::failed(1, ""))
                .on(
                    &["rev-parse", "--verify", "--quiet", "refs/heads/main"],
                    GitOutput::failed(1, ""),
                )
                .on(
                    &["rev-parse", "--verify", "--quiet", "refs/heads/master"],
                    GitOutput::ok("abc\n"),
                ),
        );
        assert_eq!(git.default_branch(dir()).unwrap(), "master");
    }

    #[test]
    fn commit_stages_only_given_files() {
        let git = Git::new(
            ScriptedGit::new()
                .on(&["add"], GitOutput::ok(""))
                .on(&["commit"], GitOutput::ok("[main abc] msg"))
                .on(&["rev-parse", "HEAD"], GitOutput::ok("abc123\n")),
        );
        let outcome = git.commit(
            dir(),
            &[PathBuf::from(".tasks/tasks.jsonl")],
            "Complete task 3",
        );
        assert!(outcome.success);
        assert_eq!(outcome.commit.as_deref(), Some("abc123"));
        assert_eq!(
            git.runner().command_lines(),
            vec![
                "add -- .tasks/tasks.jsonl",
                "commit -m Complete task 3 -- .tasks/tasks.jsonl",
                "rev-parse HEAD",
            ]
        );
    }

    #[test]
    fn commit_failure_is_reported_not_raised() {
        let git = Git::new(
            ScriptedGit::new()
                .on(&["add"], GitOutput::ok(""))
                .on(
                    &["commit"],
                    GitOutput::failed(1, "").with_stdout("nothing to commit, working tree clean"),
                ),
        );
        let outcome = git.commit(dir(), &[PathBuf::from("a")], "msg");
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("nothing to commit"));
        assert!(!git.commit(dir(), &[], "msg").success);
    }

    #[test]
    fn pull_up_to_date_is_success_without_changes() {
        let git = Git::new(ScriptedGit::new().on(&["pull"], GitOutput::ok("Already up to date.\n")));
        let outcome = git.pull(dir(), "main");
        assert!(outcome.success);
        assert!(!outcome.pulled);
        assert_eq!(
            git.runner().command_lines(),
            vec!["pull --no-rebase origin main"]
        );
    }

    #[test]
    fn push_status_variants() {
        let no_upstream = Git::new(ScriptedGit::new().on(
            &["rev-parse"],
            GitOutput::failed(128, "fatal: no upstream configured for branch 'x'"),
        ));
        assert_eq!(no_upstream.push_status(dir()).unwrap(), PushStatus::NoUpstream);

        let ahead = Git::new(
            ScriptedGit::new()
                .on(&["rev-parse"], GitOutput::ok("origin/x\n"))
                .on(&["rev-list"], GitOutput::ok("3\n")),
        );
        assert_eq!(ahead.push_status(dir()).unwrap(), PushStatus::Unpushed(3));

        let broken = Git::new(
            ScriptedGit::new().on(&["rev-parse"], GitOutput::failed(128, "fatal: bad object")),
        );
        assert!(matches!(
            broken.push_status(dir()),
            Err(Error::GitFailed { .. })
        ));
    }
}
