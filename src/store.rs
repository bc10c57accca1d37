//! Task log store.
//!
//! A task log is a JSONL file holding one [`Task`] per line. Reads are
//! best effort: a line that does not parse, or parses but fails the schema,
//! is skipped with a warning. Every mutation reads the whole file, computes
//! the new record sequence in memory and replaces the file atomically.
//!
//! [`TaskStore`] layers the task lifecycle over two logs: the active log
//! and the archive log holding completed and deleted tasks.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::schema;
use crate::storage::{self, Storage};
use crate::task::{NewTask, Relation, RelationType, Task, TaskStatus};

/// Read every valid record from a log, in file order.
pub fn read_all(path: &Path) -> Result<Vec<Task>> {
    let lines = storage::read_lines(path)?;
    let mut tasks = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(path = %path.display(), line = line_no, error = %err, "skipping unparseable task record");
                continue;
            }
        };
        if let Err(errors) = schema::validate(&value) {
            tracing::warn!(path = %path.display(), line = line_no, errors = %errors, "skipping invalid task record");
            continue;
        }
        match serde_json::from_value::<Task>(value) {
            Ok(task) => tasks.push(task),
            Err(err) => {
                tracing::warn!(path = %path.display(), line = line_no, error = %err, "skipping undecodable task record");
            }
        }
    }

    Ok(tasks)
}

/// Validate `task` and add it at the end of the log.
pub fn append(path: &Path, task: &Task) -> Result<()> {
    insert(path, task, Placement::Last)
}

/// Validate `task` and add it at the start of the log.
pub fn prepend(path: &Path, task: &Task) -> Result<()> {
    insert(path, task, Placement::First)
}

/// Replace the record with the same id.
pub fn replace(path: &Path, task: &Task) -> Result<()> {
    task.validate()?;
    let mut tasks = read_all(path)?;
    let slot = tasks
        .iter_mut()
        .find(|existing| existing.id == task.id)
        .ok_or(Error::TaskNotFound(task.id))?;
    *slot = task.clone();
    write_all(path, &tasks)
}

/// Remove the record with `id`, returning it.
pub fn delete(path: &Path, id: u64) -> Result<Task> {
    let mut tasks = read_all(path)?;
    let index = tasks
        .iter()
        .position(|task| task.id == id)
        .ok_or(Error::TaskNotFound(id))?;
    let removed = tasks.remove(index);
    write_all(path, &tasks)?;
    Ok(removed)
}

/// Where a new record lands in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    First,
    #[default]
    Last,
}

fn insert(path: &Path, task: &Task, placement: Placement) -> Result<()> {
    task.validate()?;
    let mut tasks = read_all(path)?;
    if tasks.iter().any(|existing| existing.id == task.id) {
        return Err(Error::InvalidArgument(format!(
            "task {} already exists in {}",
            task.id,
            path.display()
        )));
    }
    match placement {
        Placement::First => tasks.insert(0, task.clone()),
        Placement::Last => tasks.push(task.clone()),
    }
    write_all(path, &tasks)
}

fn write_all(path: &Path, tasks: &[Task]) -> Result<()> {
    let mut buffer = Vec::new();
    for task in tasks {
        let json = serde_json::to_string(task)?;
        buffer.extend_from_slice(json.as_bytes());
        buffer.push(b'\n');
    }
    storage::write_atomic(path, &buffer)
}

/// A task together with the log it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub task: Task,
    pub archived: bool,
}

/// Task lifecycle over the active and archive logs.
#[derive(Debug, Clone)]
pub struct TaskStore {
    active: PathBuf,
    archive: PathBuf,
}

impl TaskStore {
    pub fn new(active: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self {
            active: active.into(),
            archive: archive.into(),
        }
    }

    pub fn from_storage(storage: &Storage) -> Self {
        Self::new(storage.active_log(), storage.archive_log())
    }

    pub fn active_path(&self) -> &Path {
        &self.active
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    /// Tasks in the active log.
    pub fn list(&self) -> Result<Vec<Task>> {
        read_all(&self.active)
    }

    /// Tasks in the archive log.
    pub fn archived(&self) -> Result<Vec<Task>> {
        read_all(&self.archive)
    }

    /// Look a task up in the active log, then the archive.
    pub fn get(&self, id: u64) -> Result<Located> {
        if let Some(task) = self.list()?.into_iter().find(|task| task.id == id) {
            return Ok(Located {
                task,
                archived: false,
            });
        }
        self.archived()?
            .into_iter()
            .find(|task| task.id == id)
            .map(|task| Located {
                task,
                archived: true,
            })
            .ok_or(Error::TaskNotFound(id))
    }

    /// One past the highest id in either log, so ids are never reused.
    pub fn next_id(&self) -> Result<u64> {
        let active_max = self.list()?.iter().map(|task| task.id).max().unwrap_or(0);
        let archive_max = self
            .archived()?
            .iter()
            .map(|task| task.id)
            .max()
            .unwrap_or(0);
        active_max
            .max(archive_max)
            .checked_add(1)
            .ok_or_else(|| Error::OperationFailed("task ids are exhausted".to_string()))
    }

    /// Create a new open task and write it to the active log.
    pub fn add(&self, new_task: NewTask, placement: Placement) -> Result<Task> {
        let task = new_task.into_task(self.next_id()?);
        insert(&self.active, &task, placement)?;
        tracing::debug!(id = task.id, "task added");
        Ok(task)
    }

    /// Edit an active task in place. The id cannot be changed.
    pub fn update<F>(&self, id: u64, edit: F) -> Result<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut task = self.active_task(id)?;
        edit(&mut task);
        task.id = id;
        if task.status.is_resolved() {
            return Err(Error::InvalidArgument(format!(
                "use complete or delete to set task {id} to {}",
                task.status
            )));
        }
        replace(&self.active, &task)?;
        Ok(task)
    }

    /// Set the status of an active task.
    pub fn set_status(&self, id: u64, status: TaskStatus) -> Result<Task> {
        self.update(id, |task| task.status = status)
    }

    /// Mark a task in progress and return the context describing it.
    pub fn start(&self, id: u64, story_id: Option<u64>) -> Result<(Task, ExecutionContext)> {
        let task = self.set_status(id, TaskStatus::InProgress)?;
        let story_id = story_id.or(task.parent_id);
        Ok((task, ExecutionContext::new(story_id, Some(id))))
    }

    /// Archive a task as closed.
    pub fn complete(&self, id: u64) -> Result<Task> {
        self.archive_task(id, TaskStatus::Closed)
    }

    /// Archive a task as deleted.
    pub fn delete(&self, id: u64) -> Result<Task> {
        self.archive_task(id, TaskStatus::Deleted)
    }

    /// Move an archived task back to the active log as open.
    pub fn reopen(&self, id: u64) -> Result<Task> {
        let mut task = self
            .archived()?
            .into_iter()
            .find(|task| task.id == id)
            .ok_or(Error::TaskNotFound(id))?;
        task.status = TaskStatus::Open;

        // Active first: an interrupted reopen leaves a duplicate that `get`
        // resolves to the active copy, never a lost task.
        match insert(&self.active, &task, Placement::Last) {
            Ok(()) => {}
            Err(Error::InvalidArgument(_)) => replace(&self.active, &task)?,
            Err(err) => return Err(err),
        }
        delete(&self.archive, id)?;
        tracing::debug!(id, "task reopened");
        Ok(task)
    }

    /// Add a relation from task `id` to `relates_to`.
    ///
    /// The target is not required to exist; dangling references are
    /// reported by the graph resolver instead.
    pub fn add_relation(&self, id: u64, relates_to: u64, as_type: RelationType) -> Result<Relation> {
        let mut task = self.active_task(id)?;
        if let Some(existing) = task
            .relations
            .iter()
            .find(|relation| relation.relates_to == relates_to && relation.as_type == as_type)
        {
            return Ok(existing.clone());
        }
        let relation = Relation::new(task.next_relation_id()?, relates_to, as_type);
        task.relations.push(relation.clone());
        replace(&self.active, &task)?;
        Ok(relation)
    }

    /// Remove relation `relation_id` from task `id`.
    pub fn remove_relation(&self, id: u64, relation_id: u64) -> Result<Relation> {
        let mut task = self.active_task(id)?;
        let index = task
            .relations
            .iter()
            .position(|relation| relation.id == relation_id)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("task {id} has no relation {relation_id}"))
            })?;
        let removed = task.relations.remove(index);
        replace(&self.active, &task)?;
        Ok(removed)
    }

    fn active_task(&self, id: u64) -> Result<Task> {
        let located = self.get(id)?;
        if located.archived {
            return Err(Error::InvalidArgument(format!(
                "task {id} is archived ({}); reopen it first",
                located.task.status
            )));
        }
        Ok(located.task)
    }

    fn archive_task(&self, id: u64, status: TaskStatus) -> Result<Task> {
        let mut task = self.active_task(id)?;
        task.status = status;

        // Archive first: an interrupted move leaves a duplicate that the
        // next attempt overwrites, never a lost task.
        match insert(&self.archive, &task, Placement::Last) {
            Ok(()) => {}
            Err(Error::InvalidArgument(_)) => replace(&self.archive, &task)?,
            Err(err) => return Err(err),
        }
        delete(&self.active, id)?;
        tracing::debug!(id, status = %status, "task archived");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> TaskStore {
        TaskStore::from_storage(&Storage::for_root(dir.path()))
    }

    #[test]
    fn read_all_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_all(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }

    #[test]
    fn append_and_prepend_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        append(&path, &Task::new(1, "one")).unwrap();
        append(&path, &Task::new(2, "two")).unwrap();
        prepend(&path, &Task::new(3, "three")).unwrap();

        let ids: Vec<u64> = read_all(&path).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn invalid_record_is_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        append(&path, &Task::new(1, "one")).unwrap();
        let before = fs::read(&path).unwrap();

        let err = append(&path, &Task::new(2, "  ")).unwrap_err();
        match err {
            Error::Validation(errors) => assert!(errors.contains_path("title")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn duplicate_id_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        append(&path, &Task::new(1, "one")).unwrap();
        assert!(matches!(
            prepend(&path, &Task::new(1, "again")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn schema_invalid_line_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(
            &path,
            "{\"id\":1,\"status\":\"open\",\"title\":\"a\",\"type\":\"task\"}\n\
             {\"id\":2,\"status\":\"finished\",\"title\":\"b\",\"type\":\"task\"}\n",
        )
        .unwrap();
        let tasks = read_all(&path).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, 1);
    }

    #[test]
    fn next_id_spans_both_logs() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.next_id().unwrap(), 1);
        store.add(NewTask::new("a"), Placement::Last).unwrap();
        let b = store.add(NewTask::new("b"), Placement::Last).unwrap();
        store.complete(b.id).unwrap();
        assert_eq!(store.next_id().unwrap(), 3);
    }

    #[test]
    fn update_keeps_id_and_rejects_resolved_status() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let task = store.add(NewTask::new("a"), Placement::Last).unwrap();

        let updated = store
            .update(task.id, |t| {
                t.id = 99;
                t.title = "renamed".to_string();
            })
            .unwrap();
        assert_eq!(updated.id, task.id);
        assert_eq!(store.get(task.id).unwrap().task.title, "renamed");

        assert!(matches!(
            store.set_status(task.id, TaskStatus::Closed),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn start_returns_context_with_parent_story() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let story = store.add(NewTask::new("story"), Placement::Last).unwrap();
        let mut child = NewTask::new("child");
        child.parent_id = Some(story.id);
        let child = store.add(child, Placement::Last).unwrap();

        let (task, ctx) = store.start(child.id, None).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(ctx.task_id, Some(child.id));
        assert_eq!(ctx.story_id, Some(story.id));
    }

    #[test]
    fn archive_move_recovers_from_interrupted_complete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let task = store.add(NewTask::new("a"), Placement::Last).unwrap();

        // Simulate a crash after the archive write but before the active delete.
        let mut stale = task.clone();
        stale.status = TaskStatus::Closed;
        append(store.archive_path(), &stale).unwrap();

        let done = store.complete(task.id).unwrap();
        assert_eq!(done.status, TaskStatus::Closed);
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.archived().unwrap().len(), 1);
    }

    #[test]
    fn relations_allocate_per_task_ids() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let a = store.add(NewTask::new("a"), Placement::Last).unwrap();
        let b = store.add(NewTask::new("b"), Placement::Last).unwrap();

        let first = store.add_relation(b.id, a.id, RelationType::BlockedBy).unwrap();
        let again = store.add_relation(b.id, a.id, RelationType::BlockedBy).unwrap();
        let second = store.add_relation(b.id, 40, RelationType::Related).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(again, first);
        assert_eq!(second.id, 2);

        let other = store.add_relation(a.id, b.id, RelationType::DiscoveredDuring).unwrap();
        assert_eq!(other.id, 1);

        let removed = store.remove_relation(b.id, first.id).unwrap();
        assert_eq!(removed.relates_to, a.id);
        assert_eq!(store.get(b.id).unwrap().task.relations.len(), 1);
        assert!(store.remove_relation(b.id, first.id).is_err());
    }
}
