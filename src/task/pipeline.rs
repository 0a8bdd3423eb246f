// src/task/pipeline.rs

//! Pipeline building blocks.

use std::fmt;
use std::time::Duration;

use crate::errors::Result;
use crate::task::context::{InputPrompt, TaskContext};
use crate::task::Task;

/// What a step asks of the runner once it returns successfully.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Continue,
    /// Suspend before the next step; this same step runs again on resume.
    Pause(InputPrompt),
}

pub type StepFn = Box<dyn FnMut(&mut TaskContext) -> Result<StepOutcome> + Send>;

/// Bounded retry for transient failures of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(2).min(16);
        self.backoff.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// One node of a pipeline.
pub enum Step {
    Atomic {
        name: String,
        retry: RetryPolicy,
        run: StepFn,
    },
    /// A whole task embedded as a step. The outer pipeline only proceeds
    /// once the inner task is `done`.
    SubPipeline(Box<Task>),
}

impl Step {
    pub fn atomic<F>(name: impl Into<String>, run: F) -> Self
    where
        F: FnMut(&mut TaskContext) -> Result<StepOutcome> + Send + 'static,
    {
        Step::Atomic {
            name: name.into(),
            retry: RetryPolicy::none(),
            run: Box::new(run),
        }
    }

    pub fn retrying<F>(name: impl Into<String>, retry: RetryPolicy, run: F) -> Self
    where
        F: FnMut(&mut TaskContext) -> Result<StepOutcome> + Send + 'static,
    {
        Step::Atomic {
            name: name.into(),
            retry,
            run: Box::new(run),
        }
    }

    pub fn sub(task: Task) -> Self {
        Step::SubPipeline(Box::new(task))
    }

    pub fn name(&self) -> &str {
        match self {
            Step::Atomic { name, .. } => name,
            Step::SubPipeline(task) => task.name(),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Atomic { name, retry, .. } => f
                .debug_struct("Atomic")
                .field("name", name)
                .field("retry", retry)
                .finish_non_exhaustive(),
            Step::SubPipeline(task) => f.debug_tuple("SubPipeline").field(task).finish(),
        }
    }
}
