//! tasklog task command implementations.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::cli::{load_context, Global, RepoContext};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::git::CommitOutcome;
use crate::graph::{BlockedReport, TaskGraph};
use crate::output::{emit, Report};
use crate::store::Placement;
use crate::task::{NewTask, Relation, RelationType, Task, TaskStatus, TaskType};
use crate::workflow::{self, WorktreePlan};

pub struct AddOptions {
    pub title: String,
    pub description: Option<String>,
    pub design: Option<String>,
    pub category: Option<String>,
    pub task_type: String,
    pub parent: Option<u64>,
    pub blocked_by: Vec<u64>,
    pub meta: Vec<String>,
    pub first: bool,
    pub commit: bool,
}

pub struct ListOptions {
    pub all: bool,
    pub status: Option<String>,
}

pub struct UpdateOptions {
    pub id: u64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub design: Option<String>,
    pub category: Option<String>,
    pub task_type: Option<String>,
    pub status: Option<String>,
    pub parent: Option<u64>,
    pub meta: Vec<String>,
}

pub struct StartOptions {
    pub id: u64,
    pub story: Option<u64>,
    pub force: bool,
    pub worktree: bool,
}

#[derive(Serialize)]
struct TaskOutput {
    task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit: Option<CommitOutcome>,
}

#[derive(Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct ShowOutput {
    task: Task,
    archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocked: Option<BlockedReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    blocks: Vec<u64>,
}

#[derive(Serialize)]
struct StartOutput {
    task: Task,
    context: ExecutionContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    worktree: Option<WorktreePlan>,
}

#[derive(Serialize)]
struct RelationOutput {
    id: u64,
    relation: Relation,
}

pub fn run_add(options: AddOptions, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let title = options.title.trim();
    if title.is_empty() {
        return Err(Error::InvalidArgument("title cannot be empty".to_string()));
    }

    let mut new_task = NewTask::new(title);
    new_task.parent_id = options.parent;
    new_task.description = options.description.unwrap_or_default();
    new_task.design = options.design.unwrap_or_default();
    new_task.category = options.category.unwrap_or_default();
    new_task.task_type = TaskType::from_str(&options.task_type)?;
    apply_meta(&mut new_task.meta, &options.meta)?;
    for (index, blocker) in options.blocked_by.iter().enumerate() {
        new_task
            .relations
            .push(Relation::blocked_by(index as u64 + 1, *blocker));
    }

    let placement = if options.first {
        Placement::First
    } else {
        Placement::Last
    };
    let task = ctx.store.add(new_task, placement)?;

    let mut human = Report::new("Task created");
    human.field("ID", task.id.to_string());
    human.field("Title", task.title.clone());
    human.field("Type", task.task_type.to_string());
    if !options.blocked_by.is_empty() {
        human.field("Blocked by", format_ids(&options.blocked_by));
    }

    let commit = if options.commit {
        let message = format!("Add task {}: {}", task.id, task.title);
        Some(commit_logs(&ctx, &message, &mut human)?)
    } else {
        None
    };

    emit(
        global.output(),
        "add",
        &TaskOutput { task, commit },
        &human,
    )
}

pub fn run_list(options: ListOptions, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let status = options
        .status
        .as_deref()
        .map(TaskStatus::from_str)
        .transpose()?;

    let active = ctx.store.list()?;
    let archived = ctx.store.archived()?;
    let graph = TaskGraph::new(&active).with_archived(&archived);

    let mut blocked_ids = Vec::new();
    for task in &active {
        if graph.is_blocked(task) {
            blocked_ids.push(task.id);
        }
    }

    let mut tasks = active.clone();
    if options.all || status.map(TaskStatus::is_resolved).unwrap_or(false) {
        tasks.extend(archived);
    }
    if let Some(status) = status {
        tasks.retain(|task| task.status == status);
    }

    let mut human = Report::new("Tasks");
    human.field("Total", tasks.len().to_string());
    for task in &tasks {
        let mut line = task_line(task);
        if blocked_ids.contains(&task.id) {
            line.push_str(" (blocked)");
        }
        human.line(line);
    }

    emit(
        global.output(),
        "list",
        &TaskListOutput {
            total: tasks.len(),
            tasks,
        },
        &human,
    )
}

pub fn run_ready(global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let active = ctx.store.list()?;
    let archived = ctx.store.archived()?;
    let graph = TaskGraph::new(&active).with_archived(&archived);
    let tasks: Vec<Task> = graph.ready(&active).into_iter().cloned().collect();

    let mut human = Report::new("Ready tasks");
    human.field("Total", tasks.len().to_string());
    for task in &tasks {
        human.line(task_line(task));
    }
    if tasks.is_empty() && !active.is_empty() {
        human.suggest("tasklog list");
    }

    emit(
        global.output(),
        "ready",
        &TaskListOutput {
            total: tasks.len(),
            tasks,
        },
        &human,
    )
}

pub fn run_show(id: u64, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let located = ctx.store.get(id)?;
    let active = ctx.store.list()?;
    let archived = ctx.store.archived()?;
    let graph = TaskGraph::new(&active).with_archived(&archived);
    let blocked = if located.archived {
        None
    } else {
        Some(graph.why_blocked(&located.task))
    };
    let blocks = graph.blocked_by(id);

    let task = &located.task;
    let mut human = Report::new(format!("Task {}", task.id));
    human.field("Title", task.title.clone());
    human.field("Status", task.status.to_string());
    human.field("Type", task.task_type.to_string());
    if let Some(parent) = task.parent_id {
        human.field("Parent", parent.to_string());
    }
    if !task.category.is_empty() {
        human.field("Category", task.category.clone());
    }
    if !blocks.is_empty() {
        human.field("Blocks", format_ids(&blocks));
    }
    if located.archived {
        human.field("Archived", "");
    }
    if !task.description.is_empty() {
        human.line(format!("Description: {}", task.description));
    }
    if !task.design.is_empty() {
        human.line(format!("Design: {}", task.design));
    }
    for (key, value) in &task.meta {
        human.line(format!("meta {key} = {value}"));
    }
    for relation in &task.relations {
        human.line(format!(
            "relation {}: {} #{}",
            relation.id, relation.as_type, relation.relates_to
        ));
    }
    if let Some(report) = &blocked {
        if report.is_blocked {
            human.warn(format!("blocked by {}", format_ids(&report.blocking_ids)));
        }
    }

    emit(
        global.output(),
        "show",
        &ShowOutput {
            task: located.task.clone(),
            archived: located.archived,
            blocked,
            blocks,
        },
        &human,
    )
}

pub fn run_update(options: UpdateOptions, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let task_type = options
        .task_type
        .as_deref()
        .map(TaskType::from_str)
        .transpose()?;
    let status = options
        .status
        .as_deref()
        .map(TaskStatus::from_str)
        .transpose()?;
    let mut meta = ctx.store.get(options.id)?.task.meta;
    apply_meta(&mut meta, &options.meta)?;

    let task = ctx.store.update(options.id, |task| {
        if let Some(title) = options.title {
            task.title = title;
        }
        if let Some(description) = options.description {
            task.description = description;
        }
        if let Some(design) = options.design {
            task.design = design;
        }
        if let Some(category) = options.category {
            task.category = category;
        }
        if let Some(task_type) = task_type {
            task.task_type = task_type;
        }
        if let Some(status) = status {
            task.status = status;
        }
        if let Some(parent) = options.parent {
            task.parent_id = Some(parent);
        }
        task.meta = meta;
    })?;

    let mut human = Report::new("Task updated");
    human.field("ID", task.id.to_string());
    human.field("Status", task.status.to_string());
    emit(
        global.output(),
        "update",
        &TaskOutput { task, commit: None },
        &human,
    )
}

pub fn run_start(options: StartOptions, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let active = ctx.store.list()?;
    let archived = ctx.store.archived()?;
    let located = ctx.store.get(options.id)?;
    if !located.archived {
        let graph = TaskGraph::new(&active).with_archived(&archived);
        workflow::ensure_unblocked(&graph, &located.task, options.force)?;
    }

    let (task, context) = ctx.store.start(options.id, options.story)?;
    context.save(&ctx.storage.context_file())?;

    let worktree = if options.worktree {
        ctx.require_git()?;
        Some(workflow::prepare_worktree(
            &ctx.git(),
            &ctx.root,
            &task,
            &ctx.config,
        )?)
    } else {
        None
    };

    let mut human = Report::new("Task started");
    human.field("ID", task.id.to_string());
    human.field("Title", task.title.clone());
    if let Some(story) = context.story_id {
        human.field("Story", story.to_string());
    }
    if let Some(plan) = &worktree {
        human.field("Worktree", plan.path.display().to_string());
        human.field("Branch", plan.branch.clone());
        human.suggest(format!("cd {}", plan.path.display()));
    }
    human.suggest(format!("tasklog complete {}", task.id));

    emit(
        global.output(),
        "start",
        &StartOutput {
            task,
            context,
            worktree,
        },
        &human,
    )
}

pub fn run_complete(id: u64, commit: bool, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let task = ctx.store.complete(id)?;
    finish_archived(&ctx, task, commit, "Complete", "complete", global)
}

pub fn run_delete(id: u64, commit: bool, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let task = ctx.store.delete(id)?;
    finish_archived(&ctx, task, commit, "Delete", "delete", global)
}

fn finish_archived(
    ctx: &RepoContext,
    task: Task,
    commit: bool,
    verb: &str,
    command: &str,
    global: Global,
) -> Result<()> {
    let context_file = ctx.storage.context_file();
    if let Some(current) = ExecutionContext::load(&context_file)? {
        if current.is_executing(task.id) {
            ExecutionContext::clear(&context_file)?;
        }
    }

    let mut human = Report::new(format!("Task {} archived as {}", task.id, task.status));
    human.field("Title", task.title.clone());

    let commit = if commit {
        let message = format!("{verb} task {}: {}", task.id, task.title);
        Some(commit_logs(ctx, &message, &mut human)?)
    } else {
        None
    };

    emit(global.output(), command, &TaskOutput { task, commit }, &human)
}

pub fn run_reopen(id: u64, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let task = ctx.store.reopen(id)?;
    let mut human = Report::new("Task reopened");
    human.field("ID", task.id.to_string());
    human.field("Title", task.title.clone());
    emit(
        global.output(),
        "reopen",
        &TaskOutput { task, commit: None },
        &human,
    )
}

pub fn run_relate(id: u64, target: u64, relation_type: &str, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let as_type = RelationType::from_str(relation_type)?;
    if as_type == RelationType::BlockedBy && target == id {
        tracing::warn!(id, "task marked as blocked by itself");
    }
    let relation = ctx.store.add_relation(id, target, as_type)?;

    let mut human = Report::new("Relation added");
    human.field("Task", id.to_string());
    human.field(relation.as_type.to_string(), relation.relates_to.to_string());
    if ctx.store.get(target).is_err() {
        human.warn(format!("task {target} does not exist"));
    }
    emit(
        global.output(),
        "relate",
        &RelationOutput { id, relation },
        &human,
    )
}

pub fn run_unrelate(id: u64, relation_id: u64, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let relation = ctx.store.remove_relation(id, relation_id)?;
    let mut human = Report::new("Relation removed");
    human.field("Task", id.to_string());
    human.field(relation.as_type.to_string(), relation.relates_to.to_string());
    emit(
        global.output(),
        "unrelate",
        &RelationOutput { id, relation },
        &human,
    )
}

pub fn run_why_blocked(id: u64, global: Global) -> Result<()> {
    let ctx = load_context(global.repo.clone())?;
    let task = ctx.store.get(id)?.task;
    let active = ctx.store.list()?;
    let archived = ctx.store.archived()?;
    let graph = TaskGraph::new(&active).with_archived(&archived);
    let report = graph.why_blocked(&task);

    let header = if report.is_blocked {
        format!("Task {id} is blocked")
    } else {
        format!("Task {id} is not blocked")
    };
    let mut human = Report::new(header);
    if !report.blocking_ids.is_empty() {
        human.field("Blocked by", format_ids(&report.blocking_ids));
    }
    if let Some(cycle) = &report.circular_dependency {
        human.warn(format!(
            "circular dependency: {}",
            cycle
                .iter()
                .map(|id| format!("#{id}"))
                .collect::<Vec<_>>()
                .join(" -> ")
        ));
    }
    if let Some(error) = &report.error {
        human.warn(error.clone());
    }
    for blocker in &report.blocking_ids {
        human.suggest(format!("tasklog show {blocker}"));
    }

    emit(global.output(), "why-blocked", &report, &human)
}

fn commit_logs(ctx: &RepoContext, message: &str, human: &mut Report) -> Result<CommitOutcome> {
    ctx.require_git()?;
    let outcome = workflow::commit_task_files(&ctx.git(), &ctx.storage, message);
    match (&outcome.commit, &outcome.error) {
        (Some(sha), _) => human.field("Commit", sha.clone()),
        (None, Some(error)) => human.warn(format!("commit failed: {error}")),
        (None, None) => {}
    }
    Ok(outcome)
}

/// Apply `key=value` entries; an empty value removes the key.
fn apply_meta(meta: &mut BTreeMap<String, String>, entries: &[String]) -> Result<()> {
    for entry in entries {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::InvalidArgument(format!("meta entry must be key=value: {entry}"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "meta entry has an empty key: {entry}"
            )));
        }
        if value.is_empty() {
            meta.remove(key);
        } else {
            meta.insert(key.to_string(), value.to_string());
        }
    }
    Ok(())
}

fn task_line(task: &Task) -> String {
    format!("[{}] #{} {}", task.status, task.id, task.title)
}

fn format_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_entries_insert_and_remove() {
        let mut meta = BTreeMap::from([("refined".to_string(), "false".to_string())]);
        apply_meta(
            &mut meta,
            &["refined=true".to_string(), "owner=".to_string(), "team=core".to_string()],
        )
        .unwrap();
        assert_eq!(meta.get("refined").map(String::as_str), Some("true"));
        assert_eq!(meta.get("team").map(String::as_str), Some("core"));

        apply_meta(&mut meta, &["team=".to_string()]).unwrap();
        assert!(!meta.contains_key("team"));
    }

    #[test]
    fn meta_entry_without_equals_is_rejected() {
        let mut meta = BTreeMap::new();
        let err = apply_meta(&mut meta, &["broken".to_string()]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn task_line_format() {
        assert_eq!(task_line(&Task::new(3, "Ship it")), "[open] #3 Ship it");
    }
}
