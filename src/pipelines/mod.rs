// src/pipelines/mod.rs

//! Concrete book pipelines.
//!
//! Every pipeline:
//! - holds the book's advisory lock for its whole lifetime (taken by the
//!   orchestrator before queueing, or on first run);
//! - records the error on the book when it ends `error` or
//!   `cancelled_with_error`;
//! - releases the lock only after that has happened.
//!
//! Steps hold the book mutex only for short in-memory work, never across
//! image or remote calls.

mod blur;
mod delete;
mod download;
mod package;
mod upload;
mod verify;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::book::{BookLockGuard, SharedBook};
use crate::config::model::ConfigFile;
use crate::errors::BookflowError;
use crate::imaging::ImageProcessor;
use crate::library::Library;
use crate::remote::RemoteArchive;
use crate::task::{Task, TaskReport};
use crate::types::Level;

pub use download::download_sync_task;
pub use package::CONFIRM_PAGE_NUMBERS;

/// Everything a pipeline may talk to besides its book.
#[derive(Debug, Clone)]
pub struct Services {
    pub config: Arc<ConfigFile>,
    pub library: Arc<dyn Library>,
    pub remote: Arc<dyn RemoteArchive>,
    pub images: Arc<dyn ImageProcessor>,
}

impl Services {
    pub fn new(
        config: Arc<ConfigFile>,
        library: Arc<dyn Library>,
        remote: Arc<dyn RemoteArchive>,
        images: Arc<dyn ImageProcessor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            library,
            remote,
            images,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Package,
    BlurDetect,
    Upload,
    UploadCorrections,
    VerifyUpload,
    Download,
    Delete,
}

impl PipelineKind {
    pub fn level(self) -> Level {
        match self {
            PipelineKind::Upload | PipelineKind::UploadCorrections => Level::High,
            PipelineKind::Package | PipelineKind::Download => Level::Medium,
            PipelineKind::BlurDetect | PipelineKind::VerifyUpload | PipelineKind::Delete => {
                Level::Low
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::Package => "package",
            PipelineKind::BlurDetect => "blur_detect",
            PipelineKind::Upload => "upload",
            PipelineKind::UploadCorrections => "upload_corrections",
            PipelineKind::VerifyUpload => "verify_upload",
            PipelineKind::Download => "download",
            PipelineKind::Delete => "delete",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the task for `kind` on `book`.
///
/// Pass the guard when the lock was already taken; otherwise the task takes
/// it when it first runs. Must not be called while holding the book mutex.
pub fn build(
    kind: PipelineKind,
    book: &SharedBook,
    guard: Option<BookLockGuard>,
    services: &Arc<Services>,
) -> Task {
    let builder = Task::builder(kind.as_str()).level(kind.level());
    let builder = match guard {
        Some(guard) => builder.lock(guard),
        None => builder.book(book.clone()),
    };

    let builder = match kind {
        PipelineKind::Package => package::pipeline(builder, book, services),
        PipelineKind::BlurDetect => blur::pipeline(builder, book, services),
        PipelineKind::Upload => upload::pipeline(builder, book, services, false),
        PipelineKind::UploadCorrections => upload::pipeline(builder, book, services, true),
        PipelineKind::VerifyUpload => verify::pipeline(builder, book, services),
        PipelineKind::Download => download::pipeline(builder, book, services),
        PipelineKind::Delete => delete::pipeline(builder, book, services),
    };

    builder.on_end(record_failure(book.clone())).build()
}

/// `on_end` callback putting a failed pipeline's error on its book.
///
/// A `Locked` failure means the task never owned the book, so the book is
/// left alone.
fn record_failure(book: SharedBook) -> impl FnMut(&TaskReport) + Send + 'static {
    move |report| {
        if !report.state.is_failure() {
            return;
        }
        match report.error.as_deref() {
            Some(BookflowError::Locked { .. }) => {
                debug!(task = %report.id, "pipeline never held the book; not recording error");
            }
            Some(err) => book.lock().raise_exception(err),
            None => book.lock().raise_exception(&BookflowError::Cancelled),
        }
    }
}
