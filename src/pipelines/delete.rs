// src/pipelines/delete.rs

use std::sync::Arc;

use crate::book::{Event, SharedBook, Status};
use crate::pipelines::Services;
use crate::task::{StepOutcome, TaskBuilder};

pub(super) fn pipeline(
    builder: TaskBuilder,
    book: &SharedBook,
    services: &Arc<Services>,
) -> TaskBuilder {
    let library = services.library.clone();
    let mark = book.clone();
    let remove = book.clone();

    builder
        .atomic("mark deleted", move |_ctx| {
            let mut book = mark.lock();
            if book.status() != Status::Deleted {
                book.transition(Event::Delete)?;
            }
            Ok(StepOutcome::Continue)
        })
        .atomic("remove from library", move |ctx| {
            let uuid = remove.lock().uuid();
            library.delete_book(&uuid)?;
            ctx.report(format!("book {uuid} removed"));
            Ok(StepOutcome::Continue)
        })
}
