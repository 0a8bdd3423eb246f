// src/pipelines/download.rs

use std::sync::Arc;

use tracing::{debug, info};

use crate::book::{BookLockGuard, Event, SharedBook, Status};
use crate::errors::BookflowError;
use crate::library::BookFilter;
use crate::pipelines::{build, PipelineKind, Services};
use crate::scheduler::{meta_task, Submitter};
use crate::task::{Step, StepOutcome, TaskBuilder};
use crate::types::Level;

pub(super) fn pipeline(
    builder: TaskBuilder,
    book: &SharedBook,
    services: &Arc<Services>,
) -> TaskBuilder {
    let retry = services.config.retry_policy();
    let remote_item = services.remote.clone();
    let remote_files = services.remote.clone();

    let fetch = book.clone();
    let download = book.clone();
    let reload = book.clone();
    let finish = book.clone();

    builder
        .step(Step::retrying("fetch remote item", retry, move |ctx| {
            let identifier = fetch.lock().identifier().map(str::to_string).ok_or_else(|| {
                BookflowError::Precondition("book has no archive identifier".to_string())
            })?;
            let item = remote_item.get_item(&identifier)?;
            if !item.exists {
                return Err(BookflowError::Precondition(format!(
                    "{identifier} does not exist remotely"
                )));
            }
            ctx.report(format!("remote item {identifier} found"));
            Ok(StepOutcome::Continue)
        }))
        .step(Step::retrying("download files", retry, move |ctx| {
            let (identifier, fs, dir) = {
                let book = download.lock();
                let identifier = book.identifier().map(str::to_string).ok_or_else(|| {
                    BookflowError::Precondition("book has no archive identifier".to_string())
                })?;
                (identifier, book.fs().clone(), book.dir().to_path_buf())
            };
            remote_files.download(&identifier, &dir, fs.as_ref())?;
            ctx.report(format!("downloaded {identifier}"));
            Ok(StepOutcome::Continue)
        }))
        .atomic("reload scandata", move |ctx| {
            let mut book = reload.lock();
            book.reload_scandata()?;
            ctx.report(format!("{} leaves", book.scandata().leaf_count()));
            Ok(StepOutcome::Continue)
        })
        .atomic("finish", move |_ctx| {
            finish.lock().transition(Event::DownloadDone)?;
            Ok(StepOutcome::Continue)
        })
}

/// Meta-task registering every item the archive wants downloaded as a
/// `download_incomplete` book and queueing its download.
pub fn download_sync_task(services: &Arc<Services>, submitter: Submitter) -> TaskBuilder {
    let services = services.clone();

    meta_task("download_sync", Level::Low, submitter, move |ctx| {
        let pending = services.remote.pending_downloads()?;
        let mut children = Vec::new();

        for identifier in pending {
            let known = services
                .library
                .get_books(&BookFilter::Identifier(identifier.clone()));
            if !known.is_empty() {
                continue;
            }

            let book = services
                .library
                .new_book(Some(&identifier), Status::DownloadIncomplete, None)?;
            info!(identifier = %identifier, "registered pending download");

            // The library listener may have grabbed the book already.
            match BookLockGuard::acquire(&book, "download_sync") {
                Ok(guard) => {
                    children.push(build(PipelineKind::Download, &book, Some(guard), &services));
                }
                Err(e) => debug!(identifier = %identifier, error = %e, "download already in hand"),
            }
        }

        ctx.report(format!("{} new downloads", children.len()));
        Ok(children)
    })
}
