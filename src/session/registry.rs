//! Registry of a session's unfinished tasks.

use dashmap::DashMap;

use crate::task::{Task, TaskId};

/// Tasks that have been created and have not reached a terminal state.
///
/// Tasks remove themselves when they finish.
#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    tasks: DashMap<TaskId, Task>,
}

impl TaskRegistry {
    pub(crate) fn insert(&self, task: Task) {
        self.tasks.insert(task.id(), task);
    }

    pub(crate) fn remove(&self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id).map(|(_, task)| task)
    }

    /// Snapshot ordered by task id.
    pub(crate) fn snapshot(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by_key(Task::id);
        tasks
    }

    pub(crate) fn clear(&self) {
        self.tasks.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
