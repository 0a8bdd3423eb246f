// src/task/handle.rs

//! Shared, observable view of a task.
//!
//! The [`Task`](crate::task::Task) itself moves between the scheduler's
//! queues and its workers; the [`TaskHandle`] stays put so observers can read
//! state and request cancellation at any time.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::task::context::InputPrompt;
use crate::task::state::TaskState;
use crate::types::Level;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Point-in-time snapshot of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub level: Level,
    pub book: Option<Uuid>,
    pub state: TaskState,
    pub progress: Option<String>,
    /// Set while paused for input.
    pub prompt: Option<InputPrompt>,
    pub error: Option<String>,
    /// Index of the current (or pausing) step.
    pub step: usize,
    pub steps: usize,
    pub periodic: bool,
}

pub type Observer = Arc<dyn Fn(&TaskInfo) + Send + Sync>;

pub struct TaskHandle {
    id: TaskId,
    info: Mutex<TaskInfo>,
    cancel: AtomicBool,
    parent: OnceLock<Arc<TaskHandle>>,
    observer: OnceLock<Observer>,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("info", &*self.info.lock())
            .field("cancel", &self.cancel.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TaskHandle {
    pub(crate) fn new(
        name: String,
        level: Level,
        book: Option<Uuid>,
        steps: usize,
        periodic: bool,
    ) -> Self {
        let id = TaskId::next();
        Self {
            id,
            info: Mutex::new(TaskInfo {
                id,
                name,
                level,
                book,
                state: TaskState::Pending,
                progress: None,
                prompt: None,
                error: None,
                step: 0,
                steps,
                periodic,
            }),
            cancel: AtomicBool::new(false),
            parent: OnceLock::new(),
            observer: OnceLock::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn info(&self) -> TaskInfo {
        self.info.lock().clone()
    }

    pub fn state(&self) -> TaskState {
        self.info.lock().state
    }

    /// Ask the task to stop at the next step boundary.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// True once this task, or the task embedding it, was asked to cancel.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
            || self
                .parent
                .get()
                .is_some_and(|parent| parent.is_cancel_requested())
    }

    pub(crate) fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_parent(&self, parent: Arc<TaskHandle>) {
        let _ = self.parent.set(parent);
    }

    /// Install the change observer. Only the first call has an effect.
    pub(crate) fn set_observer(&self, observer: Observer) {
        let _ = self.observer.set(observer);
    }

    /// Mutate the snapshot and notify the observer with the result.
    pub(crate) fn update(&self, f: impl FnOnce(&mut TaskInfo)) {
        let snapshot = {
            let mut info = self.info.lock();
            f(&mut info);
            info.clone()
        };
        if let Some(observer) = self.observer.get() {
            observer(&snapshot);
        }
    }
}
