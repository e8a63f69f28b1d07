//! Todo tasks derived from modifications and reconciled against the tree.

use crate::error::CoursegenError;
use crate::Result;
use chrono::Utc;
use coursegen_types::{Action, ContentTree, Modification, TodoTask};
use tracing::{debug, info};

/// One pending task per ADD or UPDATE that names a target path.
///
/// DELETE records yield no task even when they carry a path. Reconciliation
/// completes a task when its path is present in the tree, so a removal could
/// never be confirmed and its task would stay pending forever.
pub fn derive_tasks(modifications: &[Modification]) -> Vec<TodoTask> {
    modifications.iter().filter_map(derive_task).collect()
}

fn derive_task(modification: &Modification) -> Option<TodoTask> {
    let verb = match modification.action {
        Action::Add => "Create",
        Action::Update => "Update",
        Action::Delete => return None,
    };
    let path = modification.target_path()?;
    let node_type = modification.target_type;
    let name = modification.display_name();

    let description = match modification.parent_path.as_deref() {
        Some(parent) => format!("{} {} \"{}\" under {}", verb, node_type.label(), name, parent),
        None => format!("{} {} \"{}\"", verb, node_type.label(), name),
    };

    Some(TodoTask::new(
        format!("{} {}: {}", verb, node_type.label(), name),
        description,
        node_type,
        Some(path),
    ))
}

/// Complete every pending task whose path exists in `tree`.
///
/// Completed tasks are left alone, so completion only ever moves forward.
pub fn reconcile(mut tasks: Vec<TodoTask>, tree: &ContentTree) -> Vec<TodoTask> {
    complete_present(&mut tasks, tree);
    tasks
}

fn complete_present(tasks: &mut [TodoTask], tree: &ContentTree) -> usize {
    let paths = tree.paths();
    let now = Utc::now();

    tasks
        .iter_mut()
        .filter(|task| !task.completed)
        .filter(|task| task.path.as_ref().is_some_and(|p| paths.contains(p)))
        .map(|task| task.complete(now))
        .filter(|completed| *completed)
        .count()
}

/// The running task list for a pipeline.
#[derive(Debug, Default)]
pub struct TaskTracker {
    tasks: Vec<TodoTask>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tasks, skipping any that describe work already tracked.
    /// Returns how many were added.
    pub fn ingest(&mut self, tasks: Vec<TodoTask>) -> usize {
        let mut added = 0;
        for task in tasks {
            if self.tasks.iter().any(|t| t.same_work(&task)) {
                debug!(target: "coursegen::tasks", "Skipping duplicate task: {}", task.title);
                continue;
            }
            debug!(target: "coursegen::tasks", "New task: {}", task.title);
            self.tasks.push(task);
            added += 1;
        }
        added
    }

    /// Complete tasks whose paths now exist. Returns whether anything changed.
    pub fn reconcile_with(&mut self, tree: &ContentTree) -> bool {
        let completed = complete_present(&mut self.tasks, tree);
        if completed > 0 {
            info!(target: "coursegen::tasks", "Completed {} task(s) from tree state", completed);
        }
        completed > 0
    }

    /// Complete a task by hand, whatever the tree says.
    ///
    /// Returns `Ok(true)` if the task was pending, `Ok(false)` if it was
    /// already done.
    pub fn mark_done(&mut self, task_id: &str) -> Result<bool> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| CoursegenError::TaskNotFound(task_id.to_string()))?;

        let changed = task.complete(Utc::now());
        if changed {
            info!(target: "coursegen::tasks", "Task marked done: {}", task.title);
        }
        Ok(changed)
    }

    pub fn tasks(&self) -> &[TodoTask] {
        &self.tasks
    }

    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|t| !t.completed).count()
    }
}
