//! Command-line interface for tasklog
//!
//! This module defines the CLI structure using clap derive macros.
//! Task commands live in `task`, worktree and pull commands in `worktree`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git;
use crate::storage::Storage;
use crate::store::TaskStore;

mod task;
mod worktree;

/// tasklog - task logs and worktrees for agents
///
/// Tracks tasks as JSON lines inside the repository, resolves blocking
/// relations between them, and gives each task its own git worktree.
#[derive(Parser, Debug)]
#[command(name = "tasklog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the repository (defaults to current directory)
    #[arg(long, global = true, env = "TASKLOG_REPO")]
    pub repo: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a task
    Add {
        /// Task title
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        design: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Task type: task, bug, feature, story, chore
        #[arg(long = "type", default_value = "task")]
        task_type: String,

        /// Parent task (story) id
        #[arg(long)]
        parent: Option<u64>,

        /// Ids of tasks that block this one
        #[arg(long = "blocked-by", value_delimiter = ',')]
        blocked_by: Vec<u64>,

        /// Metadata entries as key=value
        #[arg(long = "meta")]
        meta: Vec<String>,

        /// Insert at the top of the log instead of the end
        #[arg(long)]
        first: bool,

        /// Commit the task log afterwards
        #[arg(long)]
        commit: bool,
    },

    /// List tasks
    List {
        /// Include archived (completed and deleted) tasks
        #[arg(long)]
        all: bool,

        /// Only tasks with this status
        #[arg(long)]
        status: Option<String>,
    },

    /// List open tasks with nothing blocking them
    Ready,

    /// Show one task
    Show { id: u64 },

    /// Edit an active task
    Update {
        id: u64,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        design: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Task type: task, bug, feature, story, chore
        #[arg(long = "type")]
        task_type: Option<String>,

        /// Status: open, in-progress, blocked
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        parent: Option<u64>,

        /// Metadata entries as key=value (empty value removes the key)
        #[arg(long = "meta")]
        meta: Vec<String>,
    },

    /// Start working on a task
    Start {
        id: u64,

        /// Story the task belongs to (defaults to its parent)
        #[arg(long)]
        story: Option<u64>,

        /// Start even if the task is blocked
        #[arg(long)]
        force: bool,

        /// Also create (or reuse) the task's worktree
        #[arg(long)]
        worktree: bool,
    },

    /// Complete a task and move it to the archive
    Complete {
        id: u64,

        /// Commit the task logs afterwards
        #[arg(long)]
        commit: bool,
    },

    /// Delete a task (moved to the archive as deleted)
    Delete {
        id: u64,

        /// Commit the task logs afterwards
        #[arg(long)]
        commit: bool,
    },

    /// Move an archived task back to the active log
    Reopen { id: u64 },

    /// Relate a task to another task
    Relate {
        id: u64,

        /// Target task id
        target: u64,

        /// Relation type: blocked-by, related, discovered-during
        #[arg(long = "type", default_value = "blocked-by")]
        relation_type: String,
    },

    /// Remove a relation by its id
    Unrelate { id: u64, relation_id: u64 },

    /// Explain what is blocking a task
    WhyBlocked { id: u64 },

    /// Task worktree management
    #[command(subcommand)]
    Worktree(WorktreeCommands),

    /// Pull the current branch from the configured remote
    Pull {
        /// Branch to pull (defaults to the current branch)
        #[arg(long)]
        branch: Option<String>,
    },
}

/// Worktree subcommands
#[derive(Subcommand, Debug)]
pub enum WorktreeCommands {
    /// Print the worktree path and branch derived for a task
    Path { id: u64 },

    /// List worktrees of the repository
    List,

    /// Create (or reuse) the worktree for a task
    Create { id: u64 },

    /// Remove a worktree by task id or path
    Remove {
        target: String,

        /// Remove even with unpushed commits or local changes
        #[arg(long)]
        force: bool,
    },
}

/// Repository, configuration and store resolved for one invocation.
pub(crate) struct RepoContext {
    pub root: PathBuf,
    pub in_git: bool,
    pub config: Config,
    pub storage: Storage,
    pub store: TaskStore,
}

pub(crate) fn load_context(repo: Option<PathBuf>) -> Result<RepoContext> {
    let start = match repo {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    if !start.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "repository path does not exist: {}",
            start.display()
        )));
    }

    let (root, in_git) = match git::locate_repo(&start) {
        Ok(location) => (location.worktree_root, true),
        Err(Error::NotARepo(_)) => (start, false),
        Err(err) => return Err(err),
    };

    let config = Config::load_from_repo(&root);
    let storage = Storage::new(root.clone(), config.store.clone());
    let store = TaskStore::from_storage(&storage);
    Ok(RepoContext {
        root,
        in_git,
        config,
        storage,
        store,
    })
}

impl RepoContext {
    pub fn git(&self) -> git::Git {
        git::Git::system(&self.config.git)
    }

    pub fn require_git(&self) -> Result<()> {
        if self.in_git {
            Ok(())
        } else {
            Err(Error::NotARepo(self.root.clone()))
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let global = Global {
            repo: self.repo,
            json: self.json,
            quiet: self.quiet,
        };
        match self.command {
            Commands::Add {
                title,
                description,
                design,
                category,
                task_type,
                parent,
                blocked_by,
                meta,
                first,
                commit,
            } => task::run_add(
                task::AddOptions {
                    title,
                    description,
                    design,
                    category,
                    task_type,
                    parent,
                    blocked_by,
                    meta,
                    first,
                    commit,
                },
                global,
            ),
            Commands::List { all, status } => {
                task::run_list(task::ListOptions { all, status }, global)
            }
            Commands::Ready => task::run_ready(global),
            Commands::Show { id } => task::run_show(id, global),
            Commands::Update {
                id,
                title,
                description,
                design,
                category,
                task_type,
                status,
                parent,
                meta,
            } => task::run_update(
                task::UpdateOptions {
                    id,
                    title,
                    description,
                    design,
                    category,
                    task_type,
                    status,
                    parent,
                    meta,
                },
                global,
            ),
            Commands::Start {
                id,
                story,
                force,
                worktree,
            } => task::run_start(
                task::StartOptions {
                    id,
                    story,
                    force,
                    worktree,
                },
                global,
            ),
            Commands::Complete { id, commit } => task::run_complete(id, commit, global),
            Commands::Delete { id, commit } => task::run_delete(id, commit, global),
            Commands::Reopen { id } => task::run_reopen(id, global),
            Commands::Relate {
                id,
                target,
                relation_type,
            } => task::run_relate(id, target, &relation_type, global),
            Commands::Unrelate { id, relation_id } => task::run_unrelate(id, relation_id, global),
            Commands::WhyBlocked { id } => task::run_why_blocked(id, global),
            Commands::Worktree(cmd) => match cmd {
                WorktreeCommands::Path { id } => worktree::run_path(id, global),
                WorktreeCommands::List => worktree::run_list(global),
                WorktreeCommands::Create { id } => worktree::run_create(id, global),
                WorktreeCommands::Remove { target, force } => {
                    worktree::run_remove(&target, force, global)
                }
            },
            Commands::Pull { branch } => worktree::run_pull(branch, global),
        }
    }
}

/// Flags shared by every command.
#[derive(Debug, Clone)]
pub(crate) struct Global {
    pub repo: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

impl Global {
    pub fn output(&self) -> crate::output::Format {
        crate::output::Format::from_flags(self.json, self.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_worktree_command() {
        let cli = Cli::parse_from(["tasklog", "--json", "worktree", "remove", "7", "--force"]);
        assert!(cli.json);
        match cli.command {
            Commands::Worktree(WorktreeCommands::Remove { target, force }) => {
                assert_eq!(target, "7");
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn blocked_by_accepts_comma_list() {
        let cli = Cli::parse_from(["tasklog", "add", "Ship", "--blocked-by", "1,2"]);
        match cli.command {
            Commands::Add { blocked_by, .. } => assert_eq!(blocked_by, vec![1, 2]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
