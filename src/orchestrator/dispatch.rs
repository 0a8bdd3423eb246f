// src/orchestrator/dispatch.rs

//! Status-dispatch layer: which pipeline a status calls for when no guard
//! fired.

use crate::book::{Book, Status, UploadLockState};
use crate::orchestrator::BookFacts;
use crate::pipelines::PipelineKind;

pub fn dispatch(book: &Book, facts: &BookFacts) -> Option<PipelineKind> {
    match book.status() {
        Status::PackagingStarted => Some(PipelineKind::Package),
        Status::BlurDetecting => Some(PipelineKind::BlurDetect),
        Status::UploadQueued => Some(PipelineKind::Upload),
        Status::UploadStarted => resume_unless_in_flight(facts, PipelineKind::Upload),
        Status::Uploaded => Some(PipelineKind::VerifyUpload),
        Status::DownloadIncomplete => Some(PipelineKind::Download),
        Status::CorrectionsUploadQueued => Some(PipelineKind::UploadCorrections),
        Status::CorrectionsUploading => {
            resume_unless_in_flight(facts, PipelineKind::UploadCorrections)
        }
        // Still registered after `Deleted`: the storage removal failed.
        Status::DeleteQueued | Status::Deleted => Some(PipelineKind::Delete),
        _ => None,
    }
}

/// An upload whose lock file is gone or names a dead process is resumed;
/// one this process is still running is left alone.
fn resume_unless_in_flight(facts: &BookFacts, kind: PipelineKind) -> Option<PipelineKind> {
    match facts.upload_lock {
        UploadLockState::Held => None,
        UploadLockState::Absent | UploadLockState::Stale(_) => Some(kind),
    }
}
