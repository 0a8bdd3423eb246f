// src/scheduler/pool.rs

//! Worker pools and the worker loop.

use std::sync::Arc;

use tracing::{debug, info};

use crate::scheduler::Shared;
use crate::task::TaskId;
use crate::types::Level;

/// A named concurrency budget bound to one or more priority levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPool {
    pub name: String,
    pub size: usize,
    pub levels: Vec<Level>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize, levels: Vec<Level>) -> Self {
        Self {
            name: name.into(),
            size,
            levels,
        }
    }

    pub fn serves(&self, level: Level) -> bool {
        self.levels.contains(&level)
    }

    /// Levels this pool drains, highest priority first.
    pub(crate) fn levels_by_priority(&self) -> Vec<Level> {
        Level::ALL
            .into_iter()
            .filter(|level| self.serves(*level))
            .collect()
    }
}

/// Snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub pool: String,
    pub index: usize,
    pub levels: Vec<Level>,
    /// Task being run, if any.
    pub task: Option<TaskId>,
}

impl WorkerInfo {
    pub fn name(&self) -> String {
        format!("{}-{}", self.pool, self.index)
    }

    pub fn is_busy(&self) -> bool {
        self.task.is_some()
    }
}

/// Serve the queues of `pool` until shutdown.
///
/// Each task runs to a pause or terminal state on tokio's blocking pool; the
/// worker only picks up new work once it returns.
pub(crate) async fn worker_loop(shared: Arc<Shared>, pool: usize, index: usize) {
    let mut shutdown = shared.shutdown.subscribe();
    let waker = shared.wakers[pool].clone();
    let levels = shared.pools[pool].levels_by_priority();
    let name = format!("{}-{}", shared.pools[pool].name, index);

    info!(worker = %name, ?levels, "worker started");

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let Some(task) = shared.pop_for(&levels, pool) else {
            tokio::select! {
                _ = waker.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        };

        debug!(worker = %name, task = %task.id(), name = %task.name(), "picked up task");
        shared.run_task(pool, index, task).await;
    }

    info!(worker = %name, "worker stopped");
}
