// src/scheduler/events.rs

use crate::scheduler::pool::WorkerInfo;
use crate::task::TaskInfo;

/// Observer notifications published by the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A task entered the scheduler (first submission only).
    TaskAdded(TaskInfo),
    /// A task left the scheduler for good.
    TaskRemoved(TaskInfo),
    /// State, progress or prompt of a known task changed.
    TaskChanged(TaskInfo),
    WorkerChanged(WorkerInfo),
}

impl SchedulerEvent {
    pub fn task(&self) -> Option<&TaskInfo> {
        match self {
            SchedulerEvent::TaskAdded(info)
            | SchedulerEvent::TaskRemoved(info)
            | SchedulerEvent::TaskChanged(info) => Some(info),
            SchedulerEvent::WorkerChanged(_) => None,
        }
    }
}
