// src/orchestrator/guards.rs

//! Guarded-transition layer.
//!
//! Checked in table order; the first guard that returns an event wins and
//! nothing else is considered for the pass. Do not reorder: each entry
//! assumes the ones above it did not fire.

use crate::book::{Book, Event, Status};
use crate::config::model::ConfigFile;
use crate::orchestrator::BookFacts;

pub type GuardFn = fn(&Book, &BookFacts, &ConfigFile) -> Option<Event>;

#[derive(Debug, Clone, Copy)]
pub struct Guard {
    pub name: &'static str,
    pub check: GuardFn,
}

pub const GUARDS: &[Guard] = &[
    Guard {
        name: "can_begin_packaging",
        check: can_begin_packaging,
    },
    Guard {
        name: "can_queue_for_upload",
        check: can_queue_for_upload,
    },
    Guard {
        name: "can_retry_upload",
        check: can_retry_upload,
    },
    Guard {
        name: "can_start_upload_corrections",
        check: can_start_upload_corrections,
    },
    Guard {
        name: "can_retry_corrections_upload",
        check: can_retry_corrections_upload,
    },
    Guard {
        name: "can_retry_download",
        check: can_retry_download,
    },
    Guard {
        name: "can_queue_delete",
        check: can_queue_delete,
    },
];

/// `event` if `cond` holds and the edge exists from the book's status.
fn fire(book: &Book, cond: bool, event: Event) -> Option<Event> {
    (cond && book.can(event)).then_some(event)
}

fn can_begin_packaging(book: &Book, facts: &BookFacts, _cfg: &ConfigFile) -> Option<Event> {
    fire(
        book,
        book.status() == Status::ProcessingQueued && facts.metadata_complete,
        Event::BeginPackaging,
    )
}

fn can_queue_for_upload(book: &Book, _facts: &BookFacts, cfg: &ConfigFile) -> Option<Event> {
    fire(
        book,
        book.status() == Status::PackagingCompleted
            && (book.force_upload() || cfg.orchestrator.auto_upload),
        Event::QueueUpload,
    )
}

fn can_retry_upload(book: &Book, _facts: &BookFacts, _cfg: &ConfigFile) -> Option<Event> {
    fire(
        book,
        book.status() == Status::UploadFailed && book.force_upload(),
        Event::RetryUpload,
    )
}

fn can_start_upload_corrections(
    book: &Book,
    _facts: &BookFacts,
    cfg: &ConfigFile,
) -> Option<Event> {
    fire(
        book,
        book.status() == Status::Corrected
            && (book.force_upload() || cfg.orchestrator.auto_upload),
        Event::QueueCorrectionsUpload,
    )
}

fn can_retry_corrections_upload(
    book: &Book,
    _facts: &BookFacts,
    _cfg: &ConfigFile,
) -> Option<Event> {
    fire(
        book,
        book.status() == Status::CorrectionsUploadFailed && book.force_upload(),
        Event::RetryCorrectionsUpload,
    )
}

fn can_retry_download(book: &Book, _facts: &BookFacts, _cfg: &ConfigFile) -> Option<Event> {
    fire(
        book,
        book.status() == Status::DownloadFailed && book.force_upload(),
        Event::RetryDownload,
    )
}

fn can_queue_delete(book: &Book, _facts: &BookFacts, cfg: &ConfigFile) -> Option<Event> {
    let status = book.status();
    let forced = book.force_delete()
        && !status.is_busy()
        && !status.is_terminal()
        && status != Status::DeleteQueued;
    let finished = matches!(status, Status::Verified | Status::CorrectionsUploaded)
        && cfg.orchestrator.delete_after_upload;

    fire(book, forced || finished, Event::QueueDelete)
}
