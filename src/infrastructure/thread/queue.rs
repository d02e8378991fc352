//! Task queue of a loader thread.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::domain::entities::LoadingDescription;
use crate::infrastructure::tasks::{LoadSaveTask, TaskStatusCell};

/// A task waiting for its turn, with the status handle used to stop it.
pub(crate) struct QueuedTask {
    pub task: Box<dyn LoadSaveTask>,
    pub status: Arc<TaskStatusCell>,
}

impl QueuedTask {
    pub fn new(task: Box<dyn LoadSaveTask>) -> Self {
        Self {
            task,
            status: Arc::new(TaskStatusCell::new()),
        }
    }

    pub fn description(&self) -> Option<&LoadingDescription> {
        self.task.loading_description()
    }

    fn loads(&self, description: &LoadingDescription) -> bool {
        self.description() == Some(description)
    }
}

/// Interactive tasks first, in order; preloads only when nothing else waits.
#[derive(Default)]
pub(crate) struct TaskQueue {
    todo: VecDeque<QueuedTask>,
    background: VecDeque<QueuedTask>,
}

impl TaskQueue {
    pub fn push_back(&mut self, entry: QueuedTask) {
        self.todo.push_back(entry);
    }

    pub fn push_front(&mut self, entry: QueuedTask) {
        self.todo.push_front(entry);
    }

    /// Inserts a group at the front, keeping the group's order.
    pub fn push_front_group(&mut self, entries: Vec<QueuedTask>) {
        for entry in entries.into_iter().rev() {
            self.todo.push_front(entry);
        }
    }

    pub fn push_background(&mut self, entry: QueuedTask) {
        self.background.push_back(entry);
    }

    /// Next task to run, and whether it is a preload.
    pub fn pop_next(&mut self) -> Option<(QueuedTask, bool)> {
        if let Some(entry) = self.todo.pop_front() {
            return Some((entry, false));
        }
        self.background.pop_front().map(|entry| (entry, true))
    }

    pub fn contains_todo(&self, description: &LoadingDescription) -> bool {
        self.todo.iter().any(|entry| entry.loads(description))
    }

    pub fn contains_background(&self, description: &LoadingDescription) -> bool {
        self.background.iter().any(|entry| entry.loads(description))
    }

    pub fn take_todo(&mut self, description: &LoadingDescription) -> Option<QueuedTask> {
        let index = self.todo.iter().position(|entry| entry.loads(description))?;
        self.todo.remove(index)
    }

    pub fn take_background(&mut self, description: &LoadingDescription) -> Option<QueuedTask> {
        let index = self
            .background
            .iter()
            .position(|entry| entry.loads(description))?;
        self.background.remove(index)
    }

    /// Removes interactive load tasks whose description matches.
    pub fn remove_todo_loads(
        &mut self,
        mut matches: impl FnMut(&LoadingDescription) -> bool,
    ) -> Vec<QueuedTask> {
        let (removed, kept) = self
            .todo
            .drain(..)
            .partition(|entry| entry.description().is_some_and(&mut matches));
        self.todo = kept;
        removed.into()
    }

    /// Removes load tasks, interactive and preload, whose description matches.
    pub fn remove_loads(
        &mut self,
        mut matches: impl FnMut(&LoadingDescription) -> bool,
    ) -> Vec<QueuedTask> {
        let mut removed = self.remove_todo_loads(&mut matches);
        let (taken, kept): (VecDeque<_>, VecDeque<_>) = self
            .background
            .drain(..)
            .partition(|entry| entry.description().is_some_and(&mut matches));
        self.background = kept;
        removed.extend(taken);
        removed
    }

    pub fn drain_all(&mut self) -> Vec<QueuedTask> {
        self.todo.drain(..).chain(self.background.drain(..)).collect()
    }

    pub fn len(&self) -> usize {
        self.todo.len() + self.background.len()
    }

    pub fn is_empty(&self) -> bool {
        self.todo.is_empty() && self.background.is_empty()
    }
}
