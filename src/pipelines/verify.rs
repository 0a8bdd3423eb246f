// src/pipelines/verify.rs

use std::sync::Arc;

use crate::book::{Event, SharedBook};
use crate::errors::BookflowError;
use crate::pipelines::Services;
use crate::task::{Step, StepOutcome, TaskBuilder};

/// Remote repub state observed by the poll step.
struct RepubState(i32);

pub(super) fn pipeline(
    builder: TaskBuilder,
    book: &SharedBook,
    services: &Arc<Services>,
) -> TaskBuilder {
    let ready = services.config.remote.ready_repub_state;
    let retry = services.config.retry_policy();
    let remote = services.remote.clone();

    let poll = book.clone();
    let verify = book.clone();

    builder
        .step(Step::retrying("poll repub state", retry, move |ctx| {
            let identifier = poll.lock().identifier().map(str::to_string).ok_or_else(|| {
                BookflowError::Precondition("book has no archive identifier".to_string())
            })?;
            let state = remote.repub_state(&identifier)?;
            ctx.report(format!("repub state {state} (ready at {ready})"));
            ctx.insert(RepubState(state));
            Ok(StepOutcome::Continue)
        }))
        .atomic("verify", move |ctx| {
            // Not ready yet: the next orchestrator pass polls again.
            let Some(RepubState(state)) = ctx.get::<RepubState>() else {
                return Ok(StepOutcome::Continue);
            };
            if *state >= ready {
                verify.lock().transition(Event::Verify)?;
            }
            Ok(StepOutcome::Continue)
        })
}
