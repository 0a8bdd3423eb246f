// src/book/status.rs

//! Book status machine: a closed set of states and a static
//! `(Status, Event) -> Status` transition table.

use std::fmt;
use std::str::FromStr;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

use crate::errors::{BookflowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    UuidAssigned,
    Scribing,
    ProcessingQueued,
    PackagingStarted,
    PackagingFailed,
    BlurDetecting,
    PackagingCompleted,
    UploadQueued,
    UploadStarted,
    UploadFailed,
    Uploaded,
    Verified,
    DownloadIncomplete,
    DownloadFailed,
    Downloaded,
    CorrectionsInProgress,
    Corrected,
    CorrectionsUploadQueued,
    CorrectionsUploading,
    CorrectionsUploadFailed,
    CorrectionsUploaded,
    Rejected,
    DeleteQueued,
    Deleted,
}

impl Status {
    pub const ALL: [Status; 24] = [
        Status::UuidAssigned,
        Status::Scribing,
        Status::ProcessingQueued,
        Status::PackagingStarted,
        Status::PackagingFailed,
        Status::BlurDetecting,
        Status::PackagingCompleted,
        Status::UploadQueued,
        Status::UploadStarted,
        Status::UploadFailed,
        Status::Uploaded,
        Status::Verified,
        Status::DownloadIncomplete,
        Status::DownloadFailed,
        Status::Downloaded,
        Status::CorrectionsInProgress,
        Status::Corrected,
        Status::CorrectionsUploadQueued,
        Status::CorrectionsUploading,
        Status::CorrectionsUploadFailed,
        Status::CorrectionsUploaded,
        Status::Rejected,
        Status::DeleteQueued,
        Status::Deleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::UuidAssigned => "uuid_assigned",
            Status::Scribing => "scribing",
            Status::ProcessingQueued => "processing_queued",
            Status::PackagingStarted => "packaging_started",
            Status::PackagingFailed => "packaging_failed",
            Status::BlurDetecting => "blur_detecting",
            Status::PackagingCompleted => "packaging_completed",
            Status::UploadQueued => "upload_queued",
            Status::UploadStarted => "upload_started",
            Status::UploadFailed => "upload_failed",
            Status::Uploaded => "uploaded",
            Status::Verified => "verified",
            Status::DownloadIncomplete => "download_incomplete",
            Status::DownloadFailed => "download_failed",
            Status::Downloaded => "downloaded",
            Status::CorrectionsInProgress => "corrections_in_progress",
            Status::Corrected => "corrected",
            Status::CorrectionsUploadQueued => "corrections_upload_queued",
            Status::CorrectionsUploading => "corrections_uploading",
            Status::CorrectionsUploadFailed => "corrections_upload_failed",
            Status::CorrectionsUploaded => "corrections_uploaded",
            Status::Rejected => "rejected",
            Status::DeleteQueued => "delete_queued",
            Status::Deleted => "deleted",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Status::Deleted
    }

    /// States a failed operation lands in; only retry edges leave them.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Status::PackagingFailed
                | Status::UploadFailed
                | Status::DownloadFailed
                | Status::CorrectionsUploadFailed
        )
    }

    /// States owned by a running pipeline; operators must not force these.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Status::PackagingStarted
                | Status::BlurDetecting
                | Status::UploadQueued
                | Status::UploadStarted
                | Status::DownloadIncomplete
                | Status::CorrectionsUploadQueued
                | Status::CorrectionsUploading
                | Status::DeleteQueued
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown book status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    StartScribing,
    QueueProcessing,
    BeginPackaging,
    PackagingDone,
    BlurDetectionDone,
    QueueUpload,
    StartUpload,
    UploadDone,
    Verify,
    DownloadDone,
    StartCorrections,
    FinishCorrections,
    QueueCorrectionsUpload,
    StartCorrectionsUpload,
    CorrectionsUploadDone,
    RetryPackaging,
    RetryUpload,
    RetryDownload,
    RetryCorrectionsUpload,
    Fail,
    Reject,
    QueueDelete,
    Delete,
}

impl Event {
    /// Retry edges are the only ones allowed to lead back up the graph.
    pub fn is_retry(self) -> bool {
        matches!(
            self,
            Event::RetryPackaging
                | Event::RetryUpload
                | Event::RetryDownload
                | Event::RetryCorrectionsUpload
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Event::StartScribing => "start_scribing",
            Event::QueueProcessing => "queue_processing",
            Event::BeginPackaging => "begin_packaging",
            Event::PackagingDone => "packaging_done",
            Event::BlurDetectionDone => "blur_detection_done",
            Event::QueueUpload => "queue_upload",
            Event::StartUpload => "start_upload",
            Event::UploadDone => "upload_done",
            Event::Verify => "verify",
            Event::DownloadDone => "download_done",
            Event::StartCorrections => "start_corrections",
            Event::FinishCorrections => "finish_corrections",
            Event::QueueCorrectionsUpload => "queue_corrections_upload",
            Event::StartCorrectionsUpload => "start_corrections_upload",
            Event::CorrectionsUploadDone => "corrections_upload_done",
            Event::RetryPackaging => "retry_packaging",
            Event::RetryUpload => "retry_upload",
            Event::RetryDownload => "retry_download",
            Event::RetryCorrectionsUpload => "retry_corrections_upload",
            Event::Fail => "fail",
            Event::Reject => "reject",
            Event::QueueDelete => "queue_delete",
            Event::Delete => "delete",
        };
        f.write_str(name)
    }
}

use Event as E;
use Status as S;

/// Every legal edge. Lookups are linear; the table is tiny.
pub const TRANSITIONS: &[(Status, Event, Status)] = &[
    // Scanning.
    (S::UuidAssigned, E::StartScribing, S::Scribing),
    (S::Scribing, E::QueueProcessing, S::ProcessingQueued),
    (S::ProcessingQueued, E::BeginPackaging, S::PackagingStarted),
    (S::PackagingStarted, E::PackagingDone, S::BlurDetecting),
    (S::PackagingStarted, E::Fail, S::PackagingFailed),
    (S::BlurDetecting, E::BlurDetectionDone, S::PackagingCompleted),
    (S::BlurDetecting, E::Fail, S::PackagingFailed),
    (S::PackagingFailed, E::RetryPackaging, S::ProcessingQueued),
    // Upload.
    (S::PackagingCompleted, E::QueueUpload, S::UploadQueued),
    (S::UploadQueued, E::StartUpload, S::UploadStarted),
    (S::UploadQueued, E::Fail, S::UploadFailed),
    (S::UploadStarted, E::UploadDone, S::Uploaded),
    (S::UploadStarted, E::Fail, S::UploadFailed),
    (S::UploadFailed, E::RetryUpload, S::UploadQueued),
    (S::Uploaded, E::Verify, S::Verified),
    // Download and corrections.
    (S::DownloadIncomplete, E::DownloadDone, S::Downloaded),
    (S::DownloadIncomplete, E::Fail, S::DownloadFailed),
    (S::DownloadFailed, E::RetryDownload, S::DownloadIncomplete),
    (S::Downloaded, E::StartCorrections, S::CorrectionsInProgress),
    (S::CorrectionsInProgress, E::FinishCorrections, S::Corrected),
    (S::Corrected, E::QueueCorrectionsUpload, S::CorrectionsUploadQueued),
    (S::CorrectionsUploadQueued, E::StartCorrectionsUpload, S::CorrectionsUploading),
    (S::CorrectionsUploadQueued, E::Fail, S::CorrectionsUploadFailed),
    (S::CorrectionsUploading, E::CorrectionsUploadDone, S::CorrectionsUploaded),
    (S::CorrectionsUploading, E::Fail, S::CorrectionsUploadFailed),
    (S::CorrectionsUploadFailed, E::RetryCorrectionsUpload, S::CorrectionsUploadQueued),
    // Rejection.
    (S::Scribing, E::Reject, S::Rejected),
    (S::ProcessingQueued, E::Reject, S::Rejected),
    (S::PackagingFailed, E::Reject, S::Rejected),
    (S::PackagingCompleted, E::Reject, S::Rejected),
    (S::Downloaded, E::Reject, S::Rejected),
    (S::CorrectionsInProgress, E::Reject, S::Rejected),
    // Deletion: every idle, non-terminal state may be queued for delete.
    (S::UuidAssigned, E::QueueDelete, S::DeleteQueued),
    (S::Scribing, E::QueueDelete, S::DeleteQueued),
    (S::ProcessingQueued, E::QueueDelete, S::DeleteQueued),
    (S::PackagingFailed, E::QueueDelete, S::DeleteQueued),
    (S::PackagingCompleted, E::QueueDelete, S::DeleteQueued),
    (S::UploadFailed, E::QueueDelete, S::DeleteQueued),
    (S::Uploaded, E::QueueDelete, S::DeleteQueued),
    (S::Verified, E::QueueDelete, S::DeleteQueued),
    (S::DownloadFailed, E::QueueDelete, S::DeleteQueued),
    (S::Downloaded, E::QueueDelete, S::DeleteQueued),
    (S::CorrectionsInProgress, E::QueueDelete, S::DeleteQueued),
    (S::Corrected, E::QueueDelete, S::DeleteQueued),
    (S::CorrectionsUploadFailed, E::QueueDelete, S::DeleteQueued),
    (S::CorrectionsUploaded, E::QueueDelete, S::DeleteQueued),
    (S::Rejected, E::QueueDelete, S::DeleteQueued),
    (S::DeleteQueued, E::Delete, S::Deleted),
];

/// Target of `event` from `from`, if the edge exists.
pub fn transition(from: Status, event: Event) -> Option<Status> {
    TRANSITIONS
        .iter()
        .find(|(f, e, _)| *f == from && *e == event)
        .map(|(_, _, to)| *to)
}

/// Like [`transition`], but a missing edge is an error.
pub fn next_status(from: Status, event: Event) -> Result<Status> {
    transition(from, event).ok_or(BookflowError::InvalidTransition { from, event })
}

/// Events that are legal from `from`, in table order.
pub fn events_from(from: Status) -> impl Iterator<Item = Event> {
    TRANSITIONS
        .iter()
        .filter(move |(f, _, _)| *f == from)
        .map(|(_, e, _)| *e)
}

/// Check that the table, minus retry edges, has no cycles and that no
/// `(Status, Event)` pair appears twice.
pub fn check_monotonic() -> Result<()> {
    let mut graph: DiGraphMap<Status, ()> = DiGraphMap::new();

    for status in Status::ALL {
        graph.add_node(status);
    }

    for (i, (from, event, to)) in TRANSITIONS.iter().enumerate() {
        if TRANSITIONS[..i]
            .iter()
            .any(|(f, e, _)| f == from && e == event)
        {
            return Err(BookflowError::ConfigError(format!(
                "duplicate transition: {event} from {from}"
            )));
        }
        if !event.is_retry() {
            graph.add_edge(*from, *to, ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(BookflowError::ConfigError(format!(
            "status graph has a non-retry cycle through '{}'",
            cycle.node_id()
        ))),
    }
}
