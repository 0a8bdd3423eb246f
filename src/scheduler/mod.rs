// src/scheduler/mod.rs

//! Priority worker-pool scheduler.
//!
//! - One FIFO [`TaskQueue`] per [`Level`].
//! - Each [`WorkerPool`] runs `size` async worker loops that drain the
//!   queues of the levels the pool is bound to, highest level first. Pool
//!   sizing, not preemption, keeps lower levels moving.
//! - Tasks run on tokio's blocking pool; a task suspends only at step
//!   boundaries.
//! - Paused tasks wait here for [`Scheduler::resume`]; periodic tasks wait
//!   here for `interval` after each run before being queued again.
//! - [`Scheduler::stop`] cancels everything that is not running (each task
//!   surfaces as `cancelled`) and waits for in-flight tasks.

pub mod events;
pub mod meta;
pub mod pool;
pub mod queue;

use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::model::ConfigFile;
use crate::errors::{BookflowError, Result};
use crate::task::{Answer, Task, TaskHandle, TaskId, TaskInfo, TaskState};
use crate::types::Level;

pub use events::SchedulerEvent;
pub use meta::meta_task;
pub use pool::{WorkerInfo, WorkerPool};
pub use queue::TaskQueue;

const EVENT_CAPACITY: usize = 1024;

/// State shared by the scheduler front-end, its workers and timers.
pub(crate) struct Shared {
    pools: Vec<WorkerPool>,
    wakers: Vec<Arc<Notify>>,
    queues: Mutex<BTreeMap<Level, TaskQueue>>,
    registry: Mutex<BTreeMap<TaskId, Arc<TaskHandle>>>,
    paused: Mutex<BTreeMap<TaskId, Task>>,
    delayed: Mutex<BTreeMap<TaskId, Task>>,
    workers: Mutex<BTreeMap<(usize, usize), WorkerInfo>>,
    running: AtomicUsize,
    events: broadcast::Sender<SchedulerEvent>,
    shutdown: watch::Sender<bool>,
    idle: Notify,
}

impl Shared {
    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn push(self: &Arc<Self>, mut task: Task) -> Result<TaskId> {
        let id = task.id();
        let level = task.level();

        if self.is_shutting_down() {
            debug!(task = %id, "scheduler stopping; cancelling submitted task");
            task.cancel_idle();
            return Err(BookflowError::Cancelled);
        }
        if !self.pools.iter().any(|p| p.serves(level) && p.size > 0) {
            return Err(BookflowError::ConfigError(format!(
                "no worker pool serves level '{level}'"
            )));
        }

        let handle = task.handle().clone();
        let events = self.events.clone();
        handle.set_observer(Arc::new(move |info: &TaskInfo| {
            let _ = events.send(SchedulerEvent::TaskChanged(info.clone()));
        }));

        let added = self.registry.lock().insert(id, handle.clone()).is_none();
        if added {
            self.emit(SchedulerEvent::TaskAdded(handle.info()));
        }

        self.queues
            .lock()
            .entry(level)
            .or_insert_with(|| TaskQueue::new(level))
            .push(task);
        self.wake(level);
        Ok(id)
    }

    fn wake(&self, level: Level) {
        for (pool, waker) in self.pools.iter().zip(&self.wakers) {
            if pool.serves(level) {
                waker.notify_one();
            }
        }
    }

    /// Next task for a worker serving `levels`. Counted as running before
    /// the queue lock is released so idleness checks never see a gap.
    fn pop_for(&self, levels: &[Level], pool: usize) -> Option<Task> {
        let mut queues = self.queues.lock();
        for level in levels {
            let Some(queue) = queues.get_mut(level) else {
                continue;
            };
            if let Some(task) = queue.pop() {
                self.running.fetch_add(1, Ordering::SeqCst);
                if !queue.is_empty() {
                    // Let a sibling pick up the rest.
                    self.wakers[pool].notify_one();
                }
                return Some(task);
            }
        }
        None
    }

    async fn run_task(self: &Arc<Self>, pool: usize, index: usize, mut task: Task) {
        let handle = task.handle().clone();
        self.set_worker(pool, index, Some(handle.id()));

        let joined = tokio::task::spawn_blocking(move || {
            task.run();
            task
        })
        .await;

        match joined {
            Ok(task) => self.settle(task),
            Err(e) => {
                error!(task = %handle.id(), error = %e, "task runner panicked");
                handle.update(|info| {
                    info.state = TaskState::Error;
                    info.error = Some(format!("task runner panicked: {e}"));
                });
                self.forget(handle.id());
            }
        }

        self.set_worker(pool, index, None);
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.idle.notify_waiters();
    }

    /// Decide where a task goes after a run.
    fn settle(self: &Arc<Self>, mut task: Task) {
        let id = task.id();
        let state = task.state();

        match state {
            TaskState::Paused if self.is_shutting_down() => {
                task.cancel_idle();
                self.forget(id);
            }
            TaskState::Paused => {
                self.paused.lock().insert(id, task);
            }
            TaskState::Done | TaskState::Error if !self.is_shutting_down() => {
                match task.interval() {
                    Some(interval) => self.delay(task, interval),
                    None => self.forget(id),
                }
            }
            _ => self.forget(id),
        }
    }

    /// Park a periodic task and queue it again `interval` from now.
    fn delay(self: &Arc<Self>, mut task: Task, interval: Duration) {
        let id = task.id();
        task.reset();
        self.delayed.lock().insert(id, task);
        debug!(task = %id, ?interval, "periodic task parked until next run");

        let shared = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let task = shared.delayed.lock().remove(&id);
                    if let Some(task) = task {
                        if let Err(e) = shared.push(task) {
                            debug!(task = %id, error = %e, "periodic task not re-queued");
                        }
                    }
                }
                _ = shutdown.wait_for(|stopping| *stopping) => {}
            }
        });
    }

    fn forget(&self, id: TaskId) {
        let handle = self.registry.lock().remove(&id);
        if let Some(handle) = handle {
            self.emit(SchedulerEvent::TaskRemoved(handle.info()));
        }
    }

    fn set_worker(&self, pool: usize, index: usize, task: Option<TaskId>) {
        let info = {
            let mut workers = self.workers.lock();
            let entry = workers.entry((pool, index)).or_insert_with(|| WorkerInfo {
                pool: self.pools[pool].name.clone(),
                index,
                levels: self.pools[pool].levels.clone(),
                task: None,
            });
            entry.task = task;
            entry.clone()
        };
        self.emit(SchedulerEvent::WorkerChanged(info));
    }

    fn is_idle(&self) -> bool {
        let queues = self.queues.lock();
        queues.values().all(TaskQueue::is_empty) && self.running.load(Ordering::SeqCst) == 0
    }

    /// Cancel a task that is not running. Returns `None` when it is not
    /// queued, paused or parked.
    fn cancel_waiting(&self, id: TaskId) -> Option<TaskState> {
        let queued = {
            let mut queues = self.queues.lock();
            queues.values_mut().find_map(|q| q.remove(id))
        };
        let paused = || self.paused.lock().remove(&id);
        let delayed = || self.delayed.lock().remove(&id);

        let mut task = queued.or_else(paused).or_else(delayed)?;
        let state = task.cancel_idle();
        self.forget(id);
        self.idle.notify_waiters();
        Some(state)
    }
}

/// Weak scheduling callback handed to meta-tasks.
///
/// Holding a `Submitter` does not keep the scheduler alive; once it is gone
/// (or stopping) submissions are cancelled.
#[derive(Clone)]
pub struct Submitter {
    shared: Weak<Shared>,
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl Submitter {
    pub fn submit(&self, mut task: Task) -> Result<TaskId> {
        match self.shared.upgrade() {
            Some(shared) => shared.push(task),
            None => {
                task.cancel_idle();
                Err(BookflowError::Cancelled)
            }
        }
    }
}

pub struct Scheduler {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pools", &self.shared.pools)
            .field("tasks", &self.shared.registry.lock().len())
            .field("running", &self.shared.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(pools: Vec<WorkerPool>) -> Result<Self> {
        if !pools.iter().any(|p| p.size > 0) {
            return Err(BookflowError::ConfigError(
                "scheduler needs at least one worker".to_string(),
            ));
        }

        let wakers = pools.iter().map(|_| Arc::new(Notify::new())).collect();
        let queues = Level::ALL
            .into_iter()
            .map(|level| (level, TaskQueue::new(level)))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                pools,
                wakers,
                queues: Mutex::new(queues),
                registry: Mutex::new(BTreeMap::new()),
                paused: Mutex::new(BTreeMap::new()),
                delayed: Mutex::new(BTreeMap::new()),
                workers: Mutex::new(BTreeMap::new()),
                running: AtomicUsize::new(0),
                events,
                shutdown,
                idle: Notify::new(),
            }),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::new(cfg.worker_pools())
    }

    /// Spawn the worker loops. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("scheduler already started");
            return;
        }

        for (pool_idx, pool) in self.shared.pools.iter().enumerate() {
            for index in 0..pool.size {
                self.shared.set_worker(pool_idx, index, None);
                handles.push(tokio::spawn(pool::worker_loop(
                    self.shared.clone(),
                    pool_idx,
                    index,
                )));
            }
        }
        info!(pools = self.shared.pools.len(), workers = handles.len(), "scheduler started");
    }

    /// Queue a task at its level.
    pub fn schedule(&self, task: Task) -> Result<TaskId> {
        self.shared.push(task)
    }

    /// Cancel a task. Waiting tasks end `cancelled` immediately; a running
    /// task is asked to stop and ends at its next step boundary.
    pub fn cancel(&self, id: TaskId) -> Result<TaskState> {
        if let Some(state) = self.shared.cancel_waiting(id) {
            info!(task = %id, "cancelled waiting task");
            return Ok(state);
        }

        let handle = self.shared.registry.lock().get(&id).cloned();
        match handle {
            Some(handle) => {
                info!(task = %id, "cancellation requested for running task");
                handle.request_cancel();
                Ok(handle.state())
            }
            None => Err(BookflowError::TaskNotFound(id.to_string())),
        }
    }

    /// Answer a paused task's prompt and queue it again; it resumes at the
    /// step that paused.
    pub fn resume(&self, id: TaskId, answer: Answer) -> Result<()> {
        let task = self.shared.paused.lock().remove(&id);
        let mut task = task.ok_or_else(|| {
            BookflowError::TaskNotFound(format!("{id} is not paused"))
        })?;

        if let Err(e) = task.supply_answer(answer) {
            self.shared.paused.lock().insert(id, task);
            return Err(e);
        }
        info!(task = %id, "resuming paused task");
        self.shared.push(task).map(|_| ())
    }

    pub fn get_all_tasks(&self) -> Vec<TaskInfo> {
        let registry = self.shared.registry.lock();
        registry.values().map(|h| h.info()).collect()
    }

    pub fn task(&self, id: TaskId) -> Option<TaskInfo> {
        self.shared.registry.lock().get(&id).map(|h| h.info())
    }

    pub fn get_all_workers(&self) -> Vec<WorkerInfo> {
        self.shared.workers.lock().values().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.events.subscribe()
    }

    pub fn submitter(&self) -> Submitter {
        Submitter {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// No queued and no running tasks. Paused and parked periodic tasks do
    /// not count.
    pub fn is_idle(&self) -> bool {
        self.shared.is_idle()
    }

    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.shared.idle.notified());
            notified.as_mut().enable();
            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel every waiting task and wait for in-flight ones to finish.
    pub async fn stop(&self) {
        info!("scheduler stopping");
        self.shared.shutdown.send_replace(true);

        let mut waiting: Vec<Task> = {
            let mut queues = self.shared.queues.lock();
            queues.values_mut().flat_map(TaskQueue::drain).collect()
        };
        waiting.extend(std::mem::take(&mut *self.shared.paused.lock()).into_values());
        waiting.extend(std::mem::take(&mut *self.shared.delayed.lock()).into_values());

        for mut task in waiting {
            let id = task.id();
            task.cancel_idle();
            self.shared.forget(id);
        }

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker ended abnormally");
            }
        }

        self.shared.idle.notify_waiters();
        info!("scheduler stopped");
    }
}
