// src/pipelines/upload.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::book::files::{HISTORY_FILE, TIME_LOG_FILE, UPLOAD_LOCK_FILE};
use crate::book::{Event, SharedBook, Status, UploadLockState};
use crate::errors::{BookflowError, Result};
use crate::fs::FileSystem;
use crate::pipelines::Services;
use crate::remote::UploadFile;
use crate::task::{Step, StepOutcome, TaskBuilder, TaskContext, TaskState};

/// Archive identifier resolved by the remote check, used by later steps.
struct RemoteId(String);

#[derive(Clone, Copy)]
struct Stage {
    queued: Status,
    start: Event,
    done: Event,
}

impl Stage {
    fn new(corrections: bool) -> Self {
        if corrections {
            Self {
                queued: Status::CorrectionsUploadQueued,
                start: Event::StartCorrectionsUpload,
                done: Event::CorrectionsUploadDone,
            }
        } else {
            Self {
                queued: Status::UploadQueued,
                start: Event::StartUpload,
                done: Event::UploadDone,
            }
        }
    }
}

pub(super) fn pipeline(
    builder: TaskBuilder,
    book: &SharedBook,
    services: &Arc<Services>,
    corrections: bool,
) -> TaskBuilder {
    let stage = Stage::new(corrections);
    let retry = services.config.retry_policy();

    let stale = book.clone();
    let check = book.clone();
    let begin = book.clone();
    let meta = book.clone();
    let files = book.clone();
    let finish = book.clone();
    let cleanup = book.clone();

    let remote_check = services.remote.clone();
    let remote_meta = services.remote.clone();
    let remote_files = services.remote.clone();

    builder
        .atomic("clear stale upload lock", move |_ctx| {
            let book = stale.lock();
            match book.upload_lock_state()? {
                UploadLockState::Stale(pid) => {
                    warn!(parent: book.span(), pid = %pid, "removing stale upload lock");
                    book.clear_upload_lock()?;
                }
                UploadLockState::Held => {
                    debug!(parent: book.span(), "resuming upload started by this process");
                }
                UploadLockState::Absent => {}
            }
            Ok(StepOutcome::Continue)
        })
        .step(Step::retrying("check remote item", retry, move |ctx| {
            let identifier = check.lock().identifier().map(str::to_string).ok_or_else(|| {
                BookflowError::Precondition("book has no archive identifier".to_string())
            })?;

            let item = remote_check.get_item(&identifier)?;
            if corrections && !item.exists {
                return Err(BookflowError::Precondition(format!(
                    "{identifier} does not exist remotely; nothing to correct"
                )));
            }
            if item.outstanding_tasks > 0 {
                return Err(BookflowError::Precondition(format!(
                    "{identifier} has {} outstanding catalog tasks",
                    item.outstanding_tasks
                )));
            }

            ctx.report(format!("remote item {identifier} ready"));
            ctx.insert(RemoteId(identifier));
            Ok(StepOutcome::Continue)
        }))
        .atomic("begin upload", move |_ctx| {
            let mut book = begin.lock();
            book.write_upload_lock()?;
            if book.status() == stage.queued {
                book.transition(stage.start)?;
            }
            Ok(StepOutcome::Continue)
        })
        .step(Step::retrying("modify metadata", retry, move |ctx| {
            let identifier = remote_id(ctx)?;
            let metadata = meta.lock().metadata().clone();
            remote_meta.modify_metadata(&identifier, &metadata)?;
            Ok(StepOutcome::Continue)
        }))
        .step(Step::retrying("upload files", retry, move |ctx| {
            let identifier = remote_id(ctx)?;
            let (fs, dir) = {
                let book = files.lock();
                (book.fs().clone(), book.dir().to_path_buf())
            };

            let upload = collect_files(fs.as_ref(), &dir)?;
            let bytes: u64 = upload.iter().map(|f| f.size).sum();
            ctx.report(format!("uploading {} files ({bytes} bytes)", upload.len()));
            remote_files.upload_files(&identifier, &upload)?;
            Ok(StepOutcome::Continue)
        }))
        .atomic("finish", move |_ctx| {
            let mut book = finish.lock();
            book.clear_upload_lock()?;
            book.transition(stage.done)?;
            Ok(StepOutcome::Continue)
        })
        .on_end(move |report| {
            // A `done` upload cleared the lock itself; a `Locked` one never wrote it.
            if report.state == TaskState::Done
                || matches!(report.error.as_deref(), Some(BookflowError::Locked { .. }))
            {
                return;
            }
            let book = cleanup.lock();
            if let Err(e) = book.clear_upload_lock() {
                warn!(parent: book.span(), task = %report.id, error = %e, "could not remove upload lock");
            }
        })
}

fn remote_id(ctx: &TaskContext) -> Result<String> {
    ctx.get::<RemoteId>()
        .map(|id| id.0.clone())
        .ok_or_else(|| BookflowError::Integrity("remote identifier not resolved".to_string()))
}

/// Every uploadable file under `dir`, with its blake3 digest.
fn collect_files(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<UploadFile>> {
    let mut paths = Vec::new();
    walk(fs, dir, &mut paths)?;

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .strip_prefix(dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        if is_local_only(&name) {
            continue;
        }
        let contents = fs.read(&path)?;
        files.push(UploadFile {
            name,
            size: contents.len() as u64,
            blake3: blake3::hash(&contents).to_hex().to_string(),
            path,
        });
    }
    Ok(files)
}

fn walk(fs: &dyn FileSystem, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        if fs.is_dir(&entry) {
            walk(fs, &entry, out)?;
        } else if fs.is_file(&entry) {
            out.push(entry);
        }
    }
    Ok(())
}

/// Station bookkeeping that never leaves the machine.
fn is_local_only(name: &str) -> bool {
    name == UPLOAD_LOCK_FILE
        || name == HISTORY_FILE
        || name == TIME_LOG_FILE
        || name.ends_with(".lock")
        || name.ends_with(".tmp")
}
