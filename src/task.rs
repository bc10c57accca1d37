//! Task records as stored in the task logs.
//!
//! Each task is serialized as a single JSON object per line using
//! kebab-case keys (`parent-id`, `relates-to`, `as-type`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{self, ValidationErrors};

pub const STATUSES: [&str; 5] = ["open", "closed", "in-progress", "blocked", "deleted"];
pub const TASK_TYPES: [&str; 5] = ["task", "bug", "feature", "story", "chore"];
pub const RELATION_TYPES: [&str; 3] = ["blocked-by", "related", "discovered-during"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Open,
    Closed,
    InProgress,
    Blocked,
    Deleted,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Closed => "closed",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Deleted => "deleted",
        }
    }

    /// Closed and deleted tasks no longer block anything.
    pub fn is_resolved(self) -> bool {
        matches!(self, TaskStatus::Closed | TaskStatus::Deleted)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "open" => Ok(TaskStatus::Open),
            "closed" => Ok(TaskStatus::Closed),
            "in-progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "deleted" => Ok(TaskStatus::Deleted),
            other => Err(Error::InvalidArgument(format!(
                "invalid status '{other}' (expected {})",
                STATUSES.join("|")
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    #[default]
    Task,
    Bug,
    Feature,
    Story,
    Chore,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Task => "task",
            TaskType::Bug => "bug",
            TaskType::Feature => "feature",
            TaskType::Story => "story",
            TaskType::Chore => "chore",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "task" => Ok(TaskType::Task),
            "bug" => Ok(TaskType::Bug),
            "feature" => Ok(TaskType::Feature),
            "story" => Ok(TaskType::Story),
            "chore" => Ok(TaskType::Chore),
            other => Err(Error::InvalidArgument(format!(
                "invalid type '{other}' (expected {})",
                TASK_TYPES.join("|")
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RelationType {
    BlockedBy,
    Related,
    DiscoveredDuring,
}

impl RelationType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::BlockedBy => "blocked-by",
            RelationType::Related => "related",
            RelationType::DiscoveredDuring => "discovered-during",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "blocked-by" => Ok(RelationType::BlockedBy),
            "related" => Ok(RelationType::Related),
            "discovered-during" => Ok(RelationType::DiscoveredDuring),
            other => Err(Error::InvalidArgument(format!(
                "invalid relation type '{other}' (expected {})",
                RELATION_TYPES.join("|")
            ))),
        }
    }
}

/// Directed edge from the owning task to another task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Relation {
    /// Unique within the owning task only.
    pub id: u64,
    pub relates_to: u64,
    pub as_type: RelationType,
}

impl Relation {
    pub fn new(id: u64, relates_to: u64, as_type: RelationType) -> Self {
        Self {
            id,
            relates_to,
            as_type,
        }
    }

    pub fn blocked_by(id: u64, relates_to: u64) -> Self {
        Self::new(id, relates_to, RelationType::BlockedBy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Task {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    pub status: TaskStatus,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub design: String,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Task {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: None,
            status: TaskStatus::Open,
            title: title.into(),
            description: String::new(),
            design: String::new(),
            category: String::new(),
            task_type: TaskType::Task,
            meta: BTreeMap::new(),
            relations: Vec::new(),
        }
    }

    /// Run the record through the schema validator.
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let value = serde_json::to_value(self).map_err(|err| {
            ValidationErrors::from(vec![schema::FieldError::new("", err.to_string())])
        })?;
        schema::validate(&value)
    }

    /// Relations of the given type, in record order.
    pub fn relations_of(&self, as_type: RelationType) -> impl Iterator<Item = &Relation> {
        self.relations
            .iter()
            .filter(move |relation| relation.as_type == as_type)
    }

    pub fn blocked_by_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.relations_of(RelationType::BlockedBy)
            .map(|relation| relation.relates_to)
    }

    /// Next relation id for this task (ids are only unique per task).
    pub fn next_relation_id(&self) -> Result<u64> {
        self.relations
            .iter()
            .map(|relation| relation.id)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| {
                Error::OperationFailed(format!("task {} has no relation ids left", self.id))
            })
    }

    pub fn is_refined(&self) -> bool {
        self.meta
            .get("refined")
            .map(|value| value == "true")
            .unwrap_or(false)
    }
}

/// Fields supplied by the caller when creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub parent_id: Option<u64>,
    pub description: String,
    pub design: String,
    pub category: String,
    pub task_type: TaskType,
    pub meta: BTreeMap<String, String>,
    pub relations: Vec<Relation>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn into_task(self, id: u64) -> Task {
        Task {
            id,
            parent_id: self.parent_id,
            status: TaskStatus::Open,
            title: self.title,
            description: self.description,
            design: self.design,
            category: self.category,
            task_type: self.task_type,
            meta: self.meta,
            relations: self.relations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kebab_case_keys() {
        let mut task = Task::new(2, "Wire up store");
        task.parent_id = Some(1);
        task.task_type = TaskType::Story;
        task.relations.push(Relation::blocked_by(1, 1));

        let json = serde_json::to_string(&task).expect("serialize");
        assert!(json.contains("\"parent-id\":1"));
        assert!(json.contains("\"type\":\"story\""));
        assert!(json.contains("\"relates-to\":1"));
        assert!(json.contains("\"as-type\":\"blocked-by\""));
        assert!(!json.contains('\n'));
    }

    #[test]
    fn missing_optional_fields_default() {
        let task: Task =
            serde_json::from_str(r#"{"id":5,"status":"in-progress","title":"x","type":"bug"}"#)
                .expect("parse");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.description.is_empty());
        assert!(task.relations.is_empty());
        assert!(task.parent_id.is_none());
    }

    #[test]
    fn next_relation_id_is_per_task() {
        let mut task = Task::new(1, "x");
        assert_eq!(task.next_relation_id().unwrap(), 1);
        task.relations.push(Relation::blocked_by(4, 9));
        assert_eq!(task.next_relation_id().unwrap(), 5);
        task.relations.push(Relation::blocked_by(u64::MAX, 10));
        assert!(matches!(
            task.next_relation_id(),
            Err(Error::OperationFailed(_))
        ));
    }

    #[test]
    fn status_parses_and_reports_resolution() {
        assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!("done".parse::<TaskStatus>().is_err());
        assert!(TaskStatus::Deleted.is_resolved());
        assert!(!TaskStatus::Blocked.is_resolved());
    }

    #[test]
    fn refined_flag_reads_meta() {
        let mut task = Task::new(1, "x");
        assert!(!task.is_refined());
        task.meta.insert("refined".to_string(), "true".to_string());
        assert!(task.is_refined());
    }
}
