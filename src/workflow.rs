//! Multi-step operations combining the task store and the git driver.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::{self, CommitOutcome, Git, GitRunner};
use crate::graph::TaskGraph;
use crate::storage::Storage;
use crate::task::Task;

/// Where a task's worktree lives and whether it already existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreePlan {
    pub path: PathBuf,
    pub branch: String,
    /// Branch the worktree was created from, `None` when reused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    pub reused: bool,
}

/// Derive the worktree path and branch for `task` without touching git.
pub fn plan_worktree(project_dir: &Path, task: &Task, config: &Config) -> WorktreePlan {
    let limit = config.worktree.word_limit;
    WorktreePlan {
        path: git::worktree_path(project_dir, &task.title, task.id, limit),
        branch: git::branch_name(&config.git.branch_prefix, &task.title, task.id, limit),
        base: None,
        reused: false,
    }
}

/// Make sure `task` has a worktree, creating one from the default branch
/// when its branch is not checked out anywhere yet.
pub fn prepare_worktree<R: GitRunner>(
    git: &Git<R>,
    project_dir: &Path,
    task: &Task,
    config: &Config,
) -> Result<WorktreePlan> {
    let main_root = git.main_repo_root(project_dir)?;
    let mut plan = plan_worktree(&main_root, task, config);

    if let Some(existing) = git.find_worktree_for_branch(&main_root, &plan.branch)? {
        tracing::debug!(id = task.id, path = %existing.path.display(), "reusing worktree");
        plan.path = existing.path;
        plan.reused = true;
        return Ok(plan);
    }

    let base = git.default_branch(&main_root)?;
    plan.path = git.create_worktree(&main_root, &plan.path, &plan.branch, Some(&base))?;
    plan.base = Some(base);
    Ok(plan)
}

/// Commit the task log files that exist under the storage root.
///
/// Failures are logged and returned in the outcome; callers keep going.
pub fn commit_task_files<R: GitRunner>(
    git: &Git<R>,
    storage: &Storage,
    message: &str,
) -> CommitOutcome {
    let files: Vec<PathBuf> = storage
        .log_files()
        .into_iter()
        .filter(|file| storage.root().join(file).exists())
        .collect();

    let outcome = git.commit(storage.root(), &files, message);
    match &outcome.commit {
        Some(sha) => tracing::info!(commit = %sha, message, "task files committed"),
        None => tracing::warn!(
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "task files not committed"
        ),
    }
    outcome
}

/// Refuse to work on a blocked task unless `force` is set.
pub fn ensure_unblocked(graph: &TaskGraph<'_>, task: &Task, force: bool) -> Result<()> {
    let blockers = graph.blocking_ids(task);
    if blockers.is_empty() {
        return Ok(());
    }
    if force {
        tracing::warn!(id = task.id, blockers = ?blockers, "starting blocked task");
        return Ok(());
    }
    Err(Error::TaskBlocked {
        id: task.id,
        blockers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{GitOutput, ScriptedGit};
    use crate::task::Relation;
    use tempfile::TempDir;

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        dir
    }

    #[test]
    fn plan_uses_sibling_directory_and_prefixed_branch() {
        let task = Task::new(12, "Fix the Login Flow today please");
        let plan = plan_worktree(Path::new("/work/app"), &task, &Config::default());
        assert_eq!(plan.path, PathBuf::from("/work/app-12-fix-the-login-flow"));
        assert_eq!(plan.branch, "task/12-fix-the-login-flow");
    }

    #[test]
    fn prepare_reuses_existing_branch_worktree() {
        let dir = repo();
        let listing = format!(
            "worktree {}\nHEAD aaa\nbranch refs/heads/main\n\nworktree /elsewhere/wt\nHEAD bbb\nbranch refs/heads/task/3-ship-it\n",
            dir.path().display()
        );
        let git = Git::new(ScriptedGit::new().on(&["worktree", "list"], GitOutput::ok(listing)));
        let plan = prepare_worktree(&git, dir.path(), &Task::new(3, "Ship it"), &Config::default())
            .unwrap();
        assert!(plan.reused);
        assert_eq!(plan.path, PathBuf::from("/elsewhere/wt"));
        assert!(plan.base.is_none());
    }

    #[test]
    fn prepare_creates_from_default_branch() {
        let dir = repo();
        let listing = format!(
            "worktree {}\nHEAD aaa\nbranch refs/heads/main\n",
            dir.path().display()
        );
        let git = Git::new(
            ScriptedGit::new()
                .on(&["worktree", "list"], GitOutput::ok(listing))
                .on(&["symbolic-ref"], GitOutput::ok("origin/main\n"))
                .on(&["rev-parse", "--verify"], GitOutput::failed(1, ""))
                .on(&["worktree", "add"], GitOutput::ok("")),
        );
        let task = Task::new(4, "New thing");
        let plan = prepare_worktree(&git, dir.path(), &task, &Config::default()).unwrap();
        assert!(!plan.reused);
        assert_eq!(plan.base.as_deref(), Some("main"));
        let add = git
            .runner()
            .command_lines()
            .into_iter()
            .find(|line| line.starts_with("worktree add"))
            .unwrap();
        assert!(add.starts_with("worktree add -b task/4-new-thing "));
        assert!(add.ends_with(" main"));
    }

    #[test]
    fn commit_skips_missing_log_files() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::for_root(dir.path());
        std::fs::create_dir_all(storage.tasks_dir()).unwrap();
        std::fs::write(storage.active_log(), "").unwrap();

        let git = Git::new(
            ScriptedGit::new()
                .on(&["add"], GitOutput::ok(""))
                .on(&["commit"], GitOutput::ok(""))
                .on(&["rev-parse", "HEAD"], GitOutput::ok("f00\n")),
        );
        let outcome = commit_task_files(&git, &storage, "Add task 1");
        assert!(outcome.success);
        assert_eq!(git.runner().command_lines()[0], "add -- .tasks/tasks.jsonl");
    }

    #[test]
    fn blocked_task_refused_unless_forced() {
        let blocker = Task::new(1, "first");
        let mut task = Task::new(2, "second");
        task.relations.push(Relation::blocked_by(1, 1));
        let tasks = vec![blocker, task.clone()];
        let graph = TaskGraph::new(&tasks);

        let err = ensure_unblocked(&graph, &task, false).unwrap_err();
        assert!(matches!(err, Error::TaskBlocked { id: 2, ref blockers } if blockers == &vec![1]));
        assert!(ensure_unblocked(&graph, &task, true).is_ok());
    }
}
