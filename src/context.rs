//! Execution context: which story/task an agent is currently working on.
//!
//! The context is a plain value handed to whoever needs it. Persisting it
//! (to `.tasks/current.json` by default) is an explicit caller decision so
//! the rest of the crate never reads it from ambient state.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(story_id: Option<u64>, task_id: Option<u64>) -> Self {
        Self {
            story_id,
            task_id,
            started_at: Utc::now(),
        }
    }

    pub fn for_task(task_id: u64) -> Self {
        Self::new(None, Some(task_id))
    }

    pub fn with_story(mut self, story_id: u64) -> Self {
        self.story_id = Some(story_id);
        self
    }

    pub fn is_executing(&self, task_id: u64) -> bool {
        self.task_id == Some(task_id)
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        storage::read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::write_json(path, self)
    }

    /// Remove the persisted context; returns whether one existed.
    pub fn clear(path: &Path) -> Result<bool> {
        storage::remove_if_exists(path)
    }
}
