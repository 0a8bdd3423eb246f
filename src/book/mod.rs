// src/book/mod.rs

//! The book entity.
//!
//! A [`Book`] is one physical book on its way through the digitization
//! lifecycle. Its status only changes through [`Book::transition`] (or
//! [`Book::raise_exception`], which applies the `Fail` edge), and every
//! change is appended to `history.log` so the status survives restarts.
//!
//! Books are shared between the orchestrator and running pipelines as
//! [`SharedBook`]. The mutex only guards in-memory state; the advisory
//! lock ([`Book::set_lock`] / [`BookLockGuard`]) is what keeps two
//! pipelines off the same book.

pub mod files;
pub mod lock;
pub mod status;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::Regex;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use crate::errors::{BookflowError, Result};
use crate::fs::FileSystem;
use crate::library::LibraryEvent;
use crate::scandata::ScanData;

pub use files::{HistoryEntry, UploadLockState};
pub use lock::BookLockGuard;
pub use status::{Event, Status};

use files::MetadataFile;

pub type SharedBook = Arc<Mutex<Book>>;

static NON_SLUG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").ok());

pub struct Book {
    uuid: Uuid,
    identifier: Option<String>,
    status: Status,
    error: Option<String>,
    force_upload: bool,
    force_delete: bool,
    lock: Option<String>,
    metadata: BTreeMap<String, String>,
    scandata: ScanData,
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    last_updated: Option<OffsetDateTime>,
    span: Span,
    events: Option<broadcast::Sender<LibraryEvent>>,
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("uuid", &self.uuid)
            .field("identifier", &self.identifier)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("lock", &self.lock)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl Book {
    /// Create a new book directory and record its initial status.
    pub fn create(
        fs: Arc<dyn FileSystem>,
        dir: PathBuf,
        uuid: Uuid,
        status: Status,
        error: Option<String>,
    ) -> Result<Self> {
        fs.create_dir_all(&dir)?;

        let book = Self {
            uuid,
            identifier: None,
            status,
            error,
            force_upload: false,
            force_delete: false,
            lock: None,
            metadata: BTreeMap::new(),
            scandata: ScanData::new(),
            span: book_span(uuid),
            dir,
            fs,
            last_updated: None,
            events: None,
        };

        files::append_history(
            book.fs.as_ref(),
            &book.dir,
            &HistoryEntry {
                at: OffsetDateTime::now_utc(),
                from: None,
                to: status,
                error: book.error.clone(),
            },
        )?;
        info!(parent: &book.span, status = %status, "book created");
        Ok(book)
    }

    /// Open an existing book directory. The directory name is the uuid.
    pub fn open(fs: Arc<dyn FileSystem>, dir: PathBuf) -> Result<Self> {
        let uuid = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| Uuid::parse_str(n).ok())
            .ok_or_else(|| {
                BookflowError::Integrity(format!("{:?} is not a book directory", dir))
            })?;

        let history = files::read_history(fs.as_ref(), &dir)?;
        let (status, error) = history
            .last()
            .map(|entry| (entry.to, entry.error.clone()))
            .unwrap_or((Status::UuidAssigned, None));

        let meta = files::read_metadata(fs.as_ref(), &dir)?;
        let identifier = files::read_identifier(fs.as_ref(), &dir)?;
        let scandata = ScanData::load(fs.as_ref(), &dir)?;

        let span = book_span(uuid);
        debug!(parent: &span, status = %status, leaves = scandata.leaf_count(), "book opened");

        Ok(Self {
            uuid,
            identifier,
            status,
            error,
            force_upload: meta.force_upload,
            force_delete: meta.force_delete,
            lock: None,
            metadata: meta.metadata,
            scandata,
            dir,
            fs,
            last_updated: None,
            span,
            events: None,
        })
    }

    /// Route status-change notifications to a library's subscribers.
    pub(crate) fn attach_events(&mut self, events: broadcast::Sender<LibraryEvent>) {
        self.events = Some(events);
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn force_upload(&self) -> bool {
        self.force_upload
    }

    pub fn force_delete(&self) -> bool {
        self.force_delete
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        self.last_updated
    }

    pub fn touch(&mut self) {
        self.last_updated = Some(OffsetDateTime::now_utc());
    }

    // ---------------------------------------------------------------------
    // Status machine
    // ---------------------------------------------------------------------

    /// Whether `event` is a legal edge from the current status.
    pub fn can(&self, event: Event) -> bool {
        status::transition(self.status, event).is_some()
    }

    /// Apply `event`, persist it to the history log and notify subscribers.
    ///
    /// Every edge except `Fail` clears the error slot. Retry edges also
    /// clear `force_upload`, which doubles as the operator's retry request.
    pub fn transition(&mut self, event: Event) -> Result<Status> {
        let to = status::next_status(self.status, event)?;

        if event != Event::Fail {
            self.error = None;
        }
        if event.is_retry() && self.force_upload {
            self.force_upload = false;
            self.save_metadata()?;
        }

        self.record(to)?;
        info!(parent: &self.span, event = %event, status = %to, "transition");
        Ok(to)
    }

    /// Record `err` on the book and move to the error-adjacent state when
    /// the current status has a `Fail` edge.
    pub fn raise_exception(&mut self, err: &BookflowError) {
        let message = err.to_string();
        warn!(parent: &self.span, status = %self.status, error = %message, "book error");
        self.error = Some(message);

        let to = status::transition(self.status, Event::Fail).unwrap_or(self.status);
        if let Err(e) = self.record(to) {
            warn!(parent: &self.span, error = %e, "failed to persist book error");
        }
    }

    /// Clear a recorded error without changing status.
    pub fn clear_error(&mut self) -> Result<()> {
        if self.error.take().is_some() {
            self.record(self.status)?;
        }
        Ok(())
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        files::read_history(self.fs.as_ref(), &self.dir)
    }

    fn record(&mut self, to: Status) -> Result<()> {
        let from = self.status;
        files::append_history(
            self.fs.as_ref(),
            &self.dir,
            &HistoryEntry {
                at: OffsetDateTime::now_utc(),
                from: Some(from),
                to,
                error: self.error.clone(),
            },
        )?;
        self.status = to;

        if from != to {
            if let Some(events) = &self.events {
                // No receivers is fine.
                let _ = events.send(LibraryEvent::StatusChanged {
                    uuid: self.uuid,
                    from,
                    to,
                });
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Advisory lock
    // ---------------------------------------------------------------------

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn lock_holder(&self) -> Option<&str> {
        self.lock.as_deref()
    }

    /// Take the advisory lock for `holder`.
    pub fn set_lock(&mut self, holder: &str) -> Result<()> {
        match &self.lock {
            Some(current) => Err(BookflowError::Locked {
                book: self.uuid,
                holder: current.clone(),
            }),
            None => {
                self.lock = Some(holder.to_string());
                debug!(parent: &self.span, holder, "lock taken");
                Ok(())
            }
        }
    }

    /// Release the advisory lock if `holder` owns it.
    pub fn release_lock(&mut self, holder: &str) -> bool {
        if self.lock.as_deref() == Some(holder) {
            self.lock = None;
            debug!(parent: &self.span, holder, "lock released");
            true
        } else {
            false
        }
    }

    // ---------------------------------------------------------------------
    // Metadata, identifier, flags
    // ---------------------------------------------------------------------

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.metadata.insert(key.into(), value.into());
        self.save_metadata()
    }

    /// Required fields that are missing or blank.
    pub fn missing_metadata(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|key| self.metadata.get(*key).is_none_or(|v| v.trim().is_empty()))
            .cloned()
            .collect()
    }

    pub fn metadata_complete(&self, required: &[String]) -> bool {
        self.missing_metadata(required).is_empty()
    }

    pub fn set_force_upload(&mut self, force: bool) -> Result<()> {
        self.force_upload = force;
        self.save_metadata()
    }

    pub fn set_force_delete(&mut self, force: bool) -> Result<()> {
        self.force_delete = force;
        self.save_metadata()
    }

    fn save_metadata(&self) -> Result<()> {
        files::write_metadata(
            self.fs.as_ref(),
            &self.dir,
            &MetadataFile {
                metadata: self.metadata.clone(),
                force_upload: self.force_upload,
                force_delete: self.force_delete,
            },
        )
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) -> Result<()> {
        let identifier = identifier.into();
        self.fs.write(
            &self.dir.join(files::IDENTIFIER_FILE),
            format!("{identifier}\n").as_bytes(),
        )?;
        info!(parent: &self.span, identifier = %identifier, "identifier assigned");
        self.identifier = Some(identifier);
        Ok(())
    }

    /// Return the archival identifier, deriving and persisting one from the
    /// title when none has been assigned yet.
    pub fn ensure_identifier(&mut self) -> Result<String> {
        if let Some(id) = &self.identifier {
            return Ok(id.clone());
        }
        let title = self.metadata.get("title").map(String::as_str).unwrap_or("");
        let id = derive_identifier(title, self.uuid);
        self.set_identifier(id.clone())?;
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // ScanData and per-book files
    // ---------------------------------------------------------------------

    pub fn scandata(&self) -> &ScanData {
        &self.scandata
    }

    pub fn scandata_mut(&mut self) -> &mut ScanData {
        &mut self.scandata
    }

    pub fn save_scandata(&self) -> Result<()> {
        self.scandata.save(self.fs.as_ref(), &self.dir)
    }

    /// Replace the in-memory ledger with what is on disk. Subscribers are
    /// not carried over.
    pub fn reload_scandata(&mut self) -> Result<()> {
        self.scandata = ScanData::load(self.fs.as_ref(), &self.dir)?;
        Ok(())
    }

    pub fn upload_lock_state(&self) -> Result<UploadLockState> {
        files::read_upload_lock(self.fs.as_ref(), &self.dir)
    }

    /// Mark an upload in flight from this process.
    pub fn write_upload_lock(&self) -> Result<()> {
        let pid = std::process::id().to_string();
        self.fs
            .write(&self.dir.join(files::UPLOAD_LOCK_FILE), pid.as_bytes())?;
        Ok(())
    }

    pub fn clear_upload_lock(&self) -> Result<()> {
        let path = self.dir.join(files::UPLOAD_LOCK_FILE);
        if self.fs.exists(&path) {
            self.fs.remove_file(&path)?;
        }
        Ok(())
    }

    pub fn active_time(&self) -> Result<f64> {
        files::read_time_log(self.fs.as_ref(), &self.dir)
    }

    /// Add an editing session's duration to `time.log`; returns the new total.
    pub fn add_active_time(&self, seconds: f64) -> Result<f64> {
        let total = self.active_time()? + seconds;
        self.fs
            .write(&self.dir.join(files::TIME_LOG_FILE), total.to_string().as_bytes())?;
        Ok(total)
    }

    /// Remove the book's directory.
    pub fn delete_storage(&self) -> Result<()> {
        if self.fs.is_dir(&self.dir) {
            self.fs.remove_dir_all(&self.dir)?;
        }
        info!(parent: &self.span, dir = ?self.dir, "book storage deleted");
        Ok(())
    }
}

/// Lowercase slug of `title` followed by the first 8 hex digits of `uuid`.
pub fn derive_identifier(title: &str, uuid: Uuid) -> String {
    let lowered = title.to_lowercase();
    let slug = match NON_SLUG.as_ref() {
        Some(re) => re.replace_all(&lowered, "_").into_owned(),
        None => String::new(),
    };
    let slug: String = slug.trim_matches('_').chars().take(48).collect();
    let short = &uuid.simple().to_string()[..8];

    if slug.is_empty() {
        format!("book_{short}")
    } else {
        format!("{}_{short}", slug.trim_end_matches('_'))
    }
}

fn book_span(uuid: Uuid) -> Span {
    tracing::info_span!("book", uuid = %uuid)
}
