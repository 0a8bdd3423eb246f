// src/task/state.rs

use std::fmt;

use serde::Serialize;

/// Lifecycle of a task.
///
/// `Pending -> Running -> (Paused <-> Running) -> Done | Error | Cancelled |
/// CancelledWithError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Queued (or waiting for its next periodic run) and not started.
    Pending,
    Running,
    /// Suspended at a step boundary waiting for operator input.
    Paused,
    Done,
    /// A step failed and retries, if any, were exhausted.
    Error,
    /// Cancelled between steps; nothing was left half-done.
    Cancelled,
    /// Cancelled while a step was running and the step aborted with an error.
    CancelledWithError,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Done
                | TaskState::Error
                | TaskState::Cancelled
                | TaskState::CancelledWithError
        )
    }

    /// Terminal states that should be surfaced as a failure of the work.
    pub fn is_failure(self) -> bool {
        matches!(self, TaskState::Error | TaskState::CancelledWithError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Done => "done",
            TaskState::Error => "error",
            TaskState::Cancelled => "cancelled",
            TaskState::CancelledWithError => "cancelled_with_error",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
