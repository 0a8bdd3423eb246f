// src/task/mod.rs

//! Resumable, cancellable pipelines.
//!
//! A [`Task`] runs its [`Step`]s strictly in order on the calling thread.
//! It only ever stops at step boundaries:
//! - a step returning [`StepOutcome::Pause`] leaves the cursor on that step,
//!   so the same step runs again once an answer is supplied;
//! - a cancellation request is observed before each step (`cancelled`), or
//!   surfaces as `cancelled_with_error` when the running step aborts;
//! - a failing step (after its retries) moves the task to `error`.
//!
//! Every terminal state runs the `on_end` callbacks, then drops the book
//! lock the task held.

pub mod context;
pub mod handle;
pub mod pipeline;
pub mod state;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::book::{BookLockGuard, SharedBook};
use crate::errors::{BookflowError, Result};
use crate::types::Level;

pub use context::{Answer, AnswerKind, InputPrompt, TaskContext};
pub use handle::{TaskHandle, TaskId, TaskInfo};
pub use pipeline::{RetryPolicy, Step, StepFn, StepOutcome};
pub use state::TaskState;

/// Passed to completion callbacks.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: TaskId,
    pub name: String,
    pub book: Option<Uuid>,
    pub state: TaskState,
    pub error: Option<Arc<BookflowError>>,
}

type EndCallback = Box<dyn FnMut(&TaskReport) + Send>;

/// Result of driving one step.
enum Flow {
    Continue,
    Paused(InputPrompt),
    Cancelled,
    Failed(BookflowError),
}

pub struct Task {
    name: String,
    level: Level,
    handle: Arc<TaskHandle>,
    steps: Vec<Step>,
    cursor: usize,
    context: TaskContext,
    interval: Option<Duration>,
    book: Option<SharedBook>,
    book_uuid: Option<Uuid>,
    guard: Option<BookLockGuard>,
    error: Option<Arc<BookflowError>>,
    on_end: Vec<EndCallback>,
    on_cancelled_with_error: Vec<EndCallback>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.handle.id())
            .field("name", &self.name)
            .field("level", &self.level)
            .field("state", &self.handle.state())
            .field("steps", &self.steps)
            .field("cursor", &self.cursor)
            .field("interval", &self.interval)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn book_uuid(&self) -> Option<Uuid> {
        self.book_uuid
    }

    pub fn state(&self) -> TaskState {
        self.handle.state()
    }

    pub fn handle(&self) -> &Arc<TaskHandle> {
        &self.handle
    }

    pub fn info(&self) -> TaskInfo {
        self.handle.info()
    }

    pub fn error(&self) -> Option<&Arc<BookflowError>> {
        self.error.as_ref()
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut TaskContext {
        &mut self.context
    }

    /// Whether this task currently holds its book's advisory lock.
    pub fn holds_lock(&self) -> bool {
        self.guard.is_some()
    }

    /// Run (or resume) the pipeline until it pauses or reaches a terminal
    /// state. Blocks the calling thread.
    pub fn run(&mut self) -> TaskState {
        let span = info_span!("task", id = %self.handle.id(), name = %self.name);
        let _entered = span.enter();

        let state = self.state();
        if state.is_terminal() {
            return state;
        }
        if self.handle.is_cancel_requested() {
            return self.finish(TaskState::Cancelled);
        }
        if let Err(e) = self.acquire_lock() {
            debug!(error = %e, "could not take book lock");
            self.error = Some(Arc::new(e));
            return self.finish(TaskState::Error);
        }

        self.handle.update(|info| {
            info.state = TaskState::Running;
            info.prompt = None;
        });
        debug!(step = self.cursor, steps = self.steps.len(), "task running");

        while self.cursor < self.steps.len() {
            if self.handle.is_cancel_requested() {
                return self.finish(TaskState::Cancelled);
            }

            let index = self.cursor;
            self.handle.update(|info| info.step = index);

            let flow = match &mut self.steps[index] {
                Step::Atomic { name, retry, run } => {
                    run_atomic(name, *retry, run, &mut self.context)
                }
                Step::SubPipeline(inner) => run_sub(inner),
            };

            match flow {
                Flow::Continue => self.cursor += 1,
                Flow::Paused(prompt) => {
                    info!(step = index, prompt = %prompt.id, "task paused for input");
                    self.handle.update(|info| {
                        info.state = TaskState::Paused;
                        info.prompt = Some(prompt);
                    });
                    return TaskState::Paused;
                }
                Flow::Cancelled => return self.finish(TaskState::Cancelled),
                Flow::Failed(err) => {
                    let state = if self.handle.is_cancel_requested() {
                        TaskState::CancelledWithError
                    } else {
                        TaskState::Error
                    };
                    self.error = Some(Arc::new(err));
                    return self.finish(state);
                }
            }
        }

        self.finish(TaskState::Done)
    }

    /// Store the answer for the prompt this task (or the sub-pipeline it is
    /// paused in) is waiting on.
    pub fn supply_answer(&mut self, answer: Answer) -> Result<()> {
        if let Some(Step::SubPipeline(inner)) = self.steps.get_mut(self.cursor) {
            if inner.state() == TaskState::Paused {
                return inner.supply_answer(answer);
            }
        }

        let prompt = self.handle.info().prompt.ok_or_else(|| {
            BookflowError::Precondition(format!("{} is not waiting for input", self.id()))
        })?;
        if !answer.fits(&prompt.expected) {
            return Err(BookflowError::Precondition(format!(
                "answer {answer:?} does not fit prompt '{}' (expected {:?})",
                prompt.id, prompt.expected
            )));
        }
        self.context.supply_answer(prompt.id, answer);
        Ok(())
    }

    /// Cancel a task that is not currently running (queued, paused, or
    /// waiting for its next periodic run).
    pub fn cancel_idle(&mut self) -> TaskState {
        self.handle.request_cancel();
        self.finish(TaskState::Cancelled)
    }

    /// Prepare a finished periodic task for its next run.
    pub(crate) fn reset(&mut self) {
        self.cursor = 0;
        self.error = None;
        self.context = TaskContext::new(self.handle.clone());
        for step in &mut self.steps {
            if let Step::SubPipeline(inner) = step {
                inner.reset();
            }
        }
        self.handle.clear_cancel();
        self.handle.update(|info| {
            info.state = TaskState::Pending;
            info.progress = None;
            info.prompt = None;
            info.error = None;
            info.step = 0;
        });
    }

    fn acquire_lock(&mut self) -> Result<()> {
        if self.guard.is_none() {
            if let Some(book) = &self.book {
                self.guard = Some(BookLockGuard::acquire(book, self.handle.id().to_string())?);
            }
        }
        Ok(())
    }

    fn finish(&mut self, state: TaskState) -> TaskState {
        let error = self.error.clone();
        let message = error.as_ref().map(|e| e.to_string());

        match state {
            TaskState::Done => info!("task done"),
            TaskState::Cancelled => info!("task cancelled"),
            _ => warn!(state = %state, error = ?message, "task failed"),
        }

        self.handle.update(|info| {
            info.state = state;
            info.prompt = None;
            info.error = message;
        });

        let report = TaskReport {
            id: self.handle.id(),
            name: self.name.clone(),
            book: self.book_uuid,
            state,
            error,
        };
        if state == TaskState::CancelledWithError {
            for callback in &mut self.on_cancelled_with_error {
                callback(&report);
            }
        }
        for callback in &mut self.on_end {
            callback(&report);
        }

        // Released only after callbacks so nothing else can grab the book
        // before the outcome is recorded.
        self.guard = None;
        state
    }
}

fn run_atomic(
    name: &str,
    retry: RetryPolicy,
    run: &mut StepFn,
    context: &mut TaskContext,
) -> Flow {
    let attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(step = %name, attempt, "running step");
        let result = panic::catch_unwind(AssertUnwindSafe(|| run(context)))
            .unwrap_or_else(|payload| {
                Err(BookflowError::Other(anyhow!(
                    "step '{name}' panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match result {
            Ok(StepOutcome::Continue) => return Flow::Continue,
            Ok(StepOutcome::Pause(prompt)) => return Flow::Paused(prompt),
            Err(e) if e.is_retryable() && attempt < attempts && !context.is_cancelled() => {
                attempt += 1;
                let delay = retry.delay_before(attempt);
                warn!(step = %name, attempt, ?delay, error = %e, "retrying step");
                thread::sleep(delay);
            }
            Err(e) => return Flow::Failed(e),
        }
    }
}

fn run_sub(inner: &mut Task) -> Flow {
    match inner.run() {
        TaskState::Done => Flow::Continue,
        TaskState::Paused => match inner.handle.info().prompt {
            Some(prompt) => Flow::Paused(prompt),
            None => Flow::Failed(BookflowError::Integrity(format!(
                "sub-pipeline '{}' paused without a prompt",
                inner.name
            ))),
        },
        TaskState::Cancelled => Flow::Cancelled,
        state => {
            let reason = inner
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| state.to_string());
            Flow::Failed(BookflowError::Other(anyhow!(
                "sub-pipeline '{}' ended {state}: {reason}",
                inner.name
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`Task`].
///
/// `book`/`lock` tie the task to a book: the advisory lock is taken when the
/// task first runs (or up front via `lock`) and held until it ends.
pub struct TaskBuilder {
    name: String,
    level: Level,
    interval: Option<Duration>,
    book: Option<SharedBook>,
    guard: Option<BookLockGuard>,
    steps: Vec<Step>,
    on_end: Vec<EndCallback>,
    on_cancelled_with_error: Vec<EndCallback>,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Level::default(),
            interval: None,
            book: None,
            guard: None,
            steps: Vec::new(),
            on_end: Vec::new(),
            on_cancelled_with_error: Vec::new(),
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Re-run this task `interval` after each run finishes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn book(mut self, book: SharedBook) -> Self {
        self.book = Some(book);
        self
    }

    /// Hand an already-taken lock to the task.
    pub fn lock(mut self, guard: BookLockGuard) -> Self {
        self.book = Some(guard.book().clone());
        self.guard = Some(guard);
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn atomic<F>(self, name: impl Into<String>, run: F) -> Self
    where
        F: FnMut(&mut TaskContext) -> Result<StepOutcome> + Send + 'static,
    {
        self.step(Step::atomic(name, run))
    }

    pub fn on_end(mut self, callback: impl FnMut(&TaskReport) + Send + 'static) -> Self {
        self.on_end.push(Box::new(callback));
        self
    }

    /// Compensating action for a step aborted by cancellation.
    pub fn on_cancelled_with_error(
        mut self,
        callback: impl FnMut(&TaskReport) + Send + 'static,
    ) -> Self {
        self.on_cancelled_with_error.push(Box::new(callback));
        self
    }

    /// Must not be called while holding the book's mutex.
    pub fn build(self) -> Task {
        let book_uuid = match (&self.guard, &self.book) {
            (Some(guard), _) => Some(guard.uuid()),
            (None, Some(book)) => Some(book.lock().uuid()),
            (None, None) => None,
        };

        let handle = Arc::new(TaskHandle::new(
            self.name.clone(),
            self.level,
            book_uuid,
            self.steps.len(),
            self.interval.is_some(),
        ));
        for step in &self.steps {
            if let Step::SubPipeline(inner) = step {
                inner.handle.set_parent(handle.clone());
            }
        }

        Task {
            name: self.name,
            level: self.level,
            context: TaskContext::new(handle.clone()),
            handle,
            steps: self.steps,
            cursor: 0,
            interval: self.interval,
            book: self.book,
            book_uuid,
            guard: self.guard,
            error: None,
            on_end: self.on_end,
            on_cancelled_with_error: self.on_cancelled_with_error,
        }
    }
}
