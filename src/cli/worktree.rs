//! tasklog worktree and pull commands.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::{load_context, Global};
use crate::error::{Error, Result};
use crate::git::{self, PullOutcome, WorktreeEntry};
use crate::output::{emit, Report};
use crate::workflow;

#[derive(Serialize)]
struct WorktreeListOutput {
    total: usize,
    worktrees: Vec<WorktreeEntry>,
}

#[derive(Serialize)]
struct RemoveOutput {
    path: PathBuf,
    forced: bool,
}

#[derive(Serialize)]
struct PullOutput {
    branch: String,
    #[serde(flatten)]
    outcome: PullOutcome,
}

pub fn run_path(id: u64, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let task = ctx.store.get(id)?.task;
    let project_dir = if ctx.in_git {
        git::main_repo_root(&ctx.root)?
    } else {
        ctx.root.clone()
    };
    let plan = workflow::plan_worktree(&project_dir, &task, &ctx.config);

    let mut human = Report::new(plan.path.display().to_string());
    human.field("Branch", plan.branch.clone());
    emit(global.output(), "worktree path", &plan, &human)
}

pub fn run_list(global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    ctx.require_git()?;
    let worktrees = ctx.git().list_worktrees(&ctx.root)?;

    let mut human = Report::new("Worktrees");
    human.field("Total", worktrees.len().to_string());
    for entry in &worktrees {
        let branch = match (&entry.branch, entry.detached, entry.bare) {
            (_, _, true) => "(bare)".to_string(),
            (Some(branch), _, _) => branch.clone(),
            (None, _, _) => "(detached)".to_string(),
        };
        let mut line = format!("{} [{}]", entry.path.display(), branch);
        if entry.locked {
            line.push_str(" locked");
        }
        if entry.prunable {
            line.push_str(" prunable");
        }
        human.line(line);
    }

    emit(
        global.output(),
        "worktree list",
        &WorktreeListOutput {
            total: worktrees.len(),
            worktrees,
        },
        &human,
    )
}

pub fn run_create(id: u64, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    ctx.require_git()?;
    let located = ctx.store.get(id)?;
    if located.archived {
        return Err(Error::InvalidArgument(format!(
            "task {id} is archived ({})",
            located.task.status
        )));
    }

    let plan = workflow::prepare_worktree(&ctx.git(), &ctx.root, &located.task, &ctx.config)?;

    let header = if plan.reused {
        "Worktree reused"
    } else {
        "Worktree created"
    };
    let mut human = Report::new(header);
    human.field("Path", plan.path.display().to_string());
    human.field("Branch", plan.branch.clone());
    if let Some(base) = &plan.base {
        human.field("Base", base.clone());
    }
    human.suggest(format!("cd {}", plan.path.display()));
    emit(global.output(), "worktree create", &plan, &human)
}

pub fn run_remove(target: &str, force: bool, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    ctx.require_git()?;
    let git = ctx.git();

    let path = match target.parse::<u64>() {
        Ok(id) => {
            let task = ctx.store.get(id)?.task;
            let project_dir = git.main_repo_root(&ctx.root)?;
            let plan = workflow::plan_worktree(&project_dir, &task, &ctx.config);
            match git.find_worktree_for_branch(&ctx.root, &plan.branch)? {
                Some(entry) => entry.path,
                None => return Err(Error::WorktreeNotFound(plan.path)),
            }
        }
        Err(_) => ctx.root.join(target),
    };

    git.remove_worktree(&ctx.root, &path, force)?;

    let mut human = Report::new("Worktree removed");
    human.field("Path", path.display().to_string());
    emit(
        global.output(),
        "worktree remove",
        &RemoveOutput {
            path,
            forced: force,
        },
        &human,
    )
}

pub fn run_pull(branch: Option<String>, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    ctx.require_git()?;
    let git = ctx.git();

    let branch = match branch {
        Some(branch) => branch,
        None => match git.current_branch(&ctx.root)? {
            Some(branch) => branch,
            None => git.default_branch(&ctx.root)?,
        },
    };

    let outcome = git.pull(&ctx.root, &branch);
    if !outcome.success {
        return Err(Error::PullFailed {
            branch,
            kind: outcome.failure.unwrap_or(git::PullFailureKind::Other),
            message: outcome.message.unwrap_or_default(),
        });
    }

    let header = if outcome.pulled {
        "Pulled changes"
    } else {
        "Nothing pulled"
    };
    let mut human = Report::new(header);
    human.field("Remote", git.remote().to_string());
    human.field("Branch", branch.clone());
    if let Some(kind) = outcome.failure {
        human.warn(format!("{kind}: {}", kind.remediation()));
    }

    emit(
        global.output(),
        "pull",
        &PullOutput { branch, outcome },
        &human,
    )
}
