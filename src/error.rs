//! Error types for tasklog
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (invalid record, unknown task, bad args or config)
//! - 3: Blocked by policy (unpushed work, blocked task)
//! - 4: Operation failed (I/O, serialization, git)

use std::path::PathBuf;
use thiserror::Error;

use crate::git::PullFailureKind;
use crate::schema::ValidationErrors;

/// Exit codes for the tasklog CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const POLICY_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for tasklog operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Task not found: {0}")]
    TaskNotFound(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("Worktree not found: {0}")]
    WorktreeNotFound(PathBuf),

    // Policy blocks (exit code 3)
    #[error("Worktree {path} has {count} unpushed commit(s)")]
    UnpushedCommits { path: PathBuf, count: usize },

    #[error("Task {id} is blocked by {}", format_ids(.blockers))]
    TaskBlocked { id: u64, blockers: Vec<u64> },

    // Operation failures (exit code 4)
    #[error("git {command} failed: {stderr}")]
    GitFailed { command: String, stderr: String },

    #[error("pull of {branch} failed ({kind}): {message}")]
    PullFailed {
        branch: String,
        kind: PullFailureKind,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

fn format_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::Validation(_)
            | Error::TaskNotFound(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::NotARepo(_)
            | Error::WorktreeNotFound(_) => exit_codes::USER_ERROR,

            // Policy blocks
            Error::UnpushedCommits { .. } | Error::TaskBlocked { .. } => {
                exit_codes::POLICY_BLOCKED
            }

            // Operation failures
            Error::GitFailed { .. }
            | Error::PullFailed { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for the JSON error envelope
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::Validation(errors) => serde_json::to_value(errors.fields()).ok(),
            Error::TaskNotFound(id) => Some(serde_json::json!({ "id": id })),
            Error::UnpushedCommits { path, count } => Some(serde_json::json!({
                "path": path,
                "count": count,
            })),
            Error::TaskBlocked { id, blockers } => Some(serde_json::json!({
                "id": id,
                "blocking_ids": blockers,
            })),
            Error::GitFailed { command, stderr } => Some(serde_json::json!({
                "command": command,
                "stderr": stderr,
            })),
            Error::PullFailed { branch, kind, .. } => Some(serde_json::json!({
                "branch": branch,
                "kind": kind,
                "remediation": kind.remediation(),
            })),
            _ => None,
        }
    }
}

/// Result type alias for tasklog operations
pub type Result<T> = std::result::Result<T, Error>;
