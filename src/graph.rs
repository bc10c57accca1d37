//! Blocking relationships between tasks.
//!
//! [`TaskGraph`] indexes a snapshot of loaded tasks. Archived tasks can be
//! added as known-but-resolved ids so that a `blocked-by` pointing at a
//! completed task reads as satisfied rather than dangling.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::task::{RelationType, Task, TaskStatus};

/// Diagnostic answer to "why is this task blocked?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedReport {
    pub id: u64,
    pub is_blocked: bool,
    pub blocking_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circular_dependency: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskGraph<'a> {
    tasks: HashMap<u64, &'a Task>,
    archived: HashSet<u64>,
}

impl<'a> TaskGraph<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        Self {
            tasks: tasks.iter().map(|task| (task.id, task)).collect(),
            archived: HashSet::new(),
        }
    }

    /// Register archived tasks as resolved.
    pub fn with_archived(mut self, archived: &[Task]) -> Self {
        self.archived.extend(archived.iter().map(|task| task.id));
        self
    }

    pub fn get(&self, id: u64) -> Option<&'a Task> {
        self.tasks.get(&id).copied()
    }

    pub fn is_known(&self, id: u64) -> bool {
        self.tasks.contains_key(&id) || self.archived.contains(&id)
    }

    /// Whether the target of a `blocked-by` edge still blocks.
    fn blocks(&self, id: u64) -> bool {
        self.tasks
            .get(&id)
            .map(|task| !task.status.is_resolved())
            .unwrap_or(false)
    }

    pub fn is_blocked(&self, task: &Task) -> bool {
        task.blocked_by_ids().any(|id| self.blocks(id))
    }

    /// Ids of tasks currently blocking `task`, in relation order.
    pub fn blocking_ids(&self, task: &Task) -> Vec<u64> {
        task.blocked_by_ids().filter(|id| self.blocks(*id)).collect()
    }

    pub fn why_blocked(&self, task: &Task) -> BlockedReport {
        let blocking_ids = self.blocking_ids(task);
        let error = task
            .blocked_by_ids()
            .find(|id| !self.is_known(*id))
            .map(|id| format!("Blocked by invalid task ID: {id}"));

        BlockedReport {
            id: task.id,
            is_blocked: !blocking_ids.is_empty(),
            blocking_ids,
            circular_dependency: self.find_cycle_from(task),
            error,
        }
    }

    /// Find a circular `blocked-by` chain reachable from task `id`.
    pub fn find_cycle(&self, id: u64) -> Option<Vec<u64>> {
        self.get(id).and_then(|task| self.find_cycle_from(task))
    }

    /// Depth-first walk along `blocked-by` edges.
    ///
    /// Returns the path from the first revisited task back to itself, e.g.
    /// `[42, 10, 42]`. Tasks whose subtree was fully explored are never
    /// re-entered, so shared ancestors (diamonds) are not reported and the
    /// walk terminates on any finite graph.
    fn find_cycle_from(&self, start: &Task) -> Option<Vec<u64>> {
        let mut path: Vec<u64> = vec![start.id];
        let mut on_path: HashSet<u64> = HashSet::from([start.id]);
        let mut done: HashSet<u64> = HashSet::new();
        let mut stack: Vec<std::vec::IntoIter<u64>> = vec![self.edges(start)];

        while let Some(edges) = stack.last_mut() {
            match edges.next() {
                Some(next) => {
                    if on_path.contains(&next) {
                        let begin = path.iter().position(|id| *id == next).unwrap_or(0);
                        let mut cycle = path[begin..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    if done.contains(&next) {
                        continue;
                    }
                    let Some(task) = self.get(next) else {
                        continue;
                    };
                    path.push(next);
                    on_path.insert(next);
                    stack.push(self.edges(task));
                }
                None => {
                    stack.pop();
                    if let Some(finished) = path.pop() {
                        on_path.remove(&finished);
                        done.insert(finished);
                    }
                }
            }
        }

        None
    }

    fn edges(&self, task: &Task) -> std::vec::IntoIter<u64> {
        task.relations
            .iter()
            .filter(|relation| relation.as_type == RelationType::BlockedBy)
            .map(|relation| relation.relates_to)
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Open tasks with nothing blocking them, in input order.
    pub fn ready<'t>(&self, tasks: &'t [Task]) -> Vec<&'t Task> {
        tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Open && !self.is_blocked(task))
            .collect()
    }

    /// Tasks that list `id` as a blocker.
    pub fn blocked_by(&self, id: u64) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .tasks
            .values()
            .filter(|task| task.blocked_by_ids().any(|blocker| blocker == id))
            .map(|task| task.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
