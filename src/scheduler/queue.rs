// src/scheduler/queue.rs

use std::collections::VecDeque;

use tracing::debug;

use crate::task::{Task, TaskId};
use crate::types::Level;

/// FIFO of tasks waiting for a worker at one priority level.
///
/// Tasks are served strictly in submission order; a task removed by
/// [`TaskQueue::remove`] (cancellation) simply leaves the line.
#[derive(Debug)]
pub struct TaskQueue {
    level: Level,
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            tasks: VecDeque::new(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn push(&mut self, task: Task) {
        debug!(
            level = %self.level,
            task = %task.id(),
            name = %task.name(),
            depth = self.tasks.len() + 1,
            "queued task"
        );
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|t| t.id() == id)
    }

    /// Take a specific task out of the line.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let pos = self.tasks.iter().position(|t| t.id() == id)?;
        self.tasks.remove(pos)
    }

    /// Empty the queue, returning tasks in submission order.
    pub fn drain(&mut self) -> Vec<Task> {
        self.tasks.drain(..).collect()
    }
}
