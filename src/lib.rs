//! tasklog - task persistence, dependency graph and worktree orchestration
//!
//! This library provides the core functionality for the tasklog CLI tool,
//! letting agents track work items inside the repository they work on.
//!
//! # Core Concepts
//!
//! - **Task logs**: JSON lines files holding one task per line, rewritten
//!   atomically on every change
//! - **Archive**: completed and deleted tasks move to a second log
//! - **Relations**: `blocked-by` edges decide which tasks are ready
//! - **Worktrees**: each task can get its own git worktree and branch
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.tasklog.toml`
//! - `context`: Execution context (current story and task)
//! - `error`: Error types and result aliases
//! - `git`: Git driver behind a process runner seam
//! - `graph`: Blocking resolution and cycle detection
//! - `output`: Human and JSON output envelopes
//! - `schema`: Field-level validation of task records
//! - `storage`: Repository layout and atomic file writes
//! - `store`: Task log store and task lifecycle
//! - `task`: Task and relation types
//! - `workflow`: Operations spanning the store and git

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod git;
pub mod graph;
pub mod output;
pub mod schema;
pub mod storage;
pub mod store;
pub mod task;
pub mod workflow;

pub use error::{Error, Result};
