// src/scheduler/meta.rs

use tracing::{debug, warn};

use crate::errors::Result;
use crate::scheduler::Submitter;
use crate::task::{StepOutcome, Task, TaskBuilder, TaskContext};
use crate::types::Level;

/// Build a meta-task: a task whose single `fill_list` step computes a fresh
/// list of child tasks from live state and submits each one through
/// `submitter`, so children queue at their own level instead of running
/// inline.
///
/// Returns the builder so callers can add an interval or callbacks.
pub fn meta_task<F>(
    name: impl Into<String>,
    level: Level,
    submitter: Submitter,
    mut fill_list: F,
) -> TaskBuilder
where
    F: FnMut(&mut TaskContext) -> Result<Vec<Task>> + Send + 'static,
{
    Task::builder(name).level(level).atomic("fill_list", move |ctx| {
        let children = fill_list(ctx)?;
        let total = children.len();
        let mut queued = 0;

        for child in children {
            let name = child.name().to_string();
            match submitter.submit(child) {
                Ok(id) => {
                    debug!(child = %id, name = %name, "meta-task queued child");
                    queued += 1;
                }
                Err(e) => warn!(name = %name, error = %e, "meta-task could not queue child"),
            }
        }

        ctx.report(format!("queued {queued} of {total} tasks"));
        Ok(StepOutcome::Continue)
    })
}
