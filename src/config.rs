//! Configuration loading and management
//!
//! Handles parsing of `.tasklog.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// File name looked up at the repository root
pub const CONFIG_FILE: &str = ".tasklog.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Task log locations
    #[serde(default)]
    pub store: StoreConfig,

    /// Version-control settings
    #[serde(default)]
    pub git: GitConfig,

    /// Worktree naming
    #[serde(default)]
    pub worktree: WorktreeConfig,
}

/// Task log locations, relative to the repository root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: String,

    /// Active task log file name
    #[serde(default = "default_active_log")]
    pub active: String,

    /// Archive log file name
    #[serde(default = "default_archive_log")]
    pub archive: String,

    /// Execution context file name
    #[serde(default = "default_context_file")]
    pub context: String,
}

fn default_store_dir() -> String {
    ".tasks".to_string()
}

fn default_active_log() -> String {
    "tasks.jsonl".to_string()
}

fn default_archive_log() -> String {
    "archive.jsonl".to_string()
}

fn default_context_file() -> String {
    "current.json".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            active: default_active_log(),
            archive: default_archive_log(),
            context: default_context_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitConfig {
    /// Remote used for pulls and default-branch discovery
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch names tried when the remote has no default
    #[serde(default = "default_branches")]
    pub default_branches: Vec<String>,

    /// Prefix for per-task branches (`<prefix>/<id>-<slug>`)
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

fn default_branch_prefix() -> String {
    "task".to_string()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            default_branches: default_branches(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorktreeConfig {
    /// Maximum number of title words in worktree and branch names
    #[serde(default = "default_word_limit")]
    pub word_limit: usize,
}

fn default_word_limit() -> usize {
    4
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            word_limit: default_word_limit(),
        }
    }
}

impl Config {
    /// Load configuration from a `.tasklog.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from repo root, or return defaults
    pub fn load_from_repo(repo_root: &Path) -> Self {
        let config_path = repo_root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        crate::storage::write_atomic(path, content.as_bytes())
    }

    fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.git.validate()?;
        if self.worktree.word_limit == 0 {
            return Err(Error::InvalidConfig(
                "worktree.word_limit must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("store.dir", &self.dir),
            ("store.active", &self.active),
            ("store.archive", &self.archive),
            ("store.context", &self.context),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{field} cannot be empty")));
            }
        }
        for (field, value) in &fields[1..] {
            if value.contains('/') || value.contains('\\') {
                return Err(Error::InvalidConfig(format!(
                    "{field} must be a file name, got '{value}'"
                )));
            }
        }
        if self.active == self.archive {
            return Err(Error::InvalidConfig(
                "store.active and store.archive must differ".to_string(),
            ));
        }
        Ok(())
    }
}

impl GitConfig {
    fn validate(&self) -> Result<()> {
        if self.remote.trim().is_empty() {
            return Err(Error::InvalidConfig("git.remote cannot be empty".to_string()));
        }
        if self.default_branches.iter().any(|b| b.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "git.default_branches cannot include empty entries".to_string(),
            ));
        }
        let prefix = self.branch_prefix.trim();
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return Err(Error::InvalidConfig(
                "git.branch_prefix must be a non-empty name without spaces".to_string(),
            ));
        }
        Ok(())
    }
}
