#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use bookflow::errors::{BookflowError, Result};
use bookflow::fs::FileSystem;
use bookflow::fs::mock::MockFileSystem;
use bookflow::imaging::ImageProcessor;
use bookflow::remote::{RemoteArchive, RemoteItem, UploadFile};
use bookflow::task::TaskHandle;

/// One call received by [`FakeArchive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveCall {
    GetItem(String),
    ModifyMetadata(String),
    UploadFiles(String, Vec<String>),
    RepubState(String),
    PendingDownloads,
    Download(String),
}

#[derive(Debug, Default)]
struct ArchiveState {
    items: BTreeMap<String, RemoteItem>,
    metadata: BTreeMap<String, BTreeMap<String, String>>,
    uploads: BTreeMap<String, Vec<UploadFile>>,
    downloads: BTreeMap<String, Vec<(String, Vec<u8>)>>,
    pending: Vec<String>,
    repub_state: i32,
    transient_failures: u32,
    cancel_on_metadata: Option<Arc<TaskHandle>>,
    calls: Vec<ArchiveCall>,
}

/// In-memory archive that records every call.
///
/// - `fail_next(n)` makes the next `n` fallible calls return a transient
///   error, to exercise step retries.
/// - Uploading or modifying metadata creates the item.
/// - `cancel_on_metadata(handle)` asks that task to cancel while the next
///   metadata update is in flight.
#[derive(Debug, Default)]
pub struct FakeArchive {
    state: Mutex<ArchiveState>,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, identifier: &str, outstanding_tasks: u32) -> Self {
        self.state.lock().items.insert(
            identifier.to_string(),
            RemoteItem {
                identifier: identifier.to_string(),
                exists: true,
                outstanding_tasks,
                repub_state: None,
            },
        );
        self
    }

    /// Offer `identifier` for download with the given `(name, contents)` files.
    pub fn with_pending_download(self, identifier: &str, files: &[(&str, &str)]) -> Self {
        {
            let mut state = self.state.lock();
            state.pending.push(identifier.to_string());
            state.downloads.insert(
                identifier.to_string(),
                files
                    .iter()
                    .map(|(name, contents)| (name.to_string(), contents.as_bytes().to_vec()))
                    .collect(),
            );
        }
        self.with_item(identifier, 0)
    }

    pub fn set_repub_state(&self, state: i32) {
        self.state.lock().repub_state = state;
    }

    pub fn set_outstanding_tasks(&self, identifier: &str, outstanding: u32) {
        if let Some(item) = self.state.lock().items.get_mut(identifier) {
            item.outstanding_tasks = outstanding;
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.state.lock().transient_failures = n;
    }

    pub fn cancel_on_metadata(&self, handle: Arc<TaskHandle>) {
        self.state.lock().cancel_on_metadata = Some(handle);
    }

    pub fn calls(&self) -> Vec<ArchiveCall> {
        self.state.lock().calls.clone()
    }

    pub fn uploaded(&self, identifier: &str) -> Vec<UploadFile> {
        self.state
            .lock()
            .uploads
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }

    pub fn metadata(&self, identifier: &str) -> Option<BTreeMap<String, String>> {
        self.state.lock().metadata.get(identifier).cloned()
    }

    fn record(&self, call: ArchiveCall) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(BookflowError::Transient("archive unavailable".to_string()));
        }
        Ok(())
    }

    fn create_item(state: &mut ArchiveState, identifier: &str) {
        state
            .items
            .entry(identifier.to_string())
            .or_insert_with(|| RemoteItem {
                identifier: identifier.to_string(),
                exists: true,
                outstanding_tasks: 0,
                repub_state: None,
            });
    }
}

impl RemoteArchive for FakeArchive {
    fn get_item(&self, identifier: &str) -> Result<RemoteItem> {
        self.record(ArchiveCall::GetItem(identifier.to_string()))?;
        let state = self.state.lock();
        Ok(state.items.get(identifier).cloned().unwrap_or_else(|| RemoteItem {
            identifier: identifier.to_string(),
            ..RemoteItem::default()
        }))
    }

    fn modify_metadata(&self, identifier: &str, metadata: &BTreeMap<String, String>) -> Result<()> {
        self.record(ArchiveCall::ModifyMetadata(identifier.to_string()))?;
        let mut state = self.state.lock();
        if let Some(handle) = state.cancel_on_metadata.take() {
            handle.request_cancel();
        }
        Self::create_item(&mut state, identifier);
        state
            .metadata
            .insert(identifier.to_string(), metadata.clone());
        Ok(())
    }

    fn upload_files(&self, identifier: &str, files: &[UploadFile]) -> Result<()> {
        let names = files.iter().map(|f| f.name.clone()).collect();
        self.record(ArchiveCall::UploadFiles(identifier.to_string(), names))?;
        let mut state = self.state.lock();
        Self::create_item(&mut state, identifier);
        state
            .uploads
            .insert(identifier.to_string(), files.to_vec());
        Ok(())
    }

    fn repub_state(&self, identifier: &str) -> Result<i32> {
        self.record(ArchiveCall::RepubState(identifier.to_string()))?;
        Ok(self.state.lock().repub_state)
    }

    fn pending_downloads(&self) -> Result<Vec<String>> {
        self.record(ArchiveCall::PendingDownloads)?;
        Ok(self.state.lock().pending.clone())
    }

    fn download(&self, identifier: &str, dest: &Path, fs: &dyn FileSystem) -> Result<()> {
        self.record(ArchiveCall::Download(identifier.to_string()))?;
        let files = self
            .state
            .lock()
            .downloads
            .get(identifier)
            .cloned()
            .unwrap_or_default();
        for (name, contents) in files {
            fs.write(&dest.join(name), &contents)?;
        }
        Ok(())
    }
}

/// Image processor with scripted blur scores.
#[derive(Debug, Default)]
pub struct FakeImages {
    scores: Mutex<BTreeMap<u32, f64>>,
    compressed: Mutex<Vec<u32>>,
}

impl FakeImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `score` for `leaf`; unscripted leaves score `0.0`.
    pub fn with_blur(self, leaf: u32, score: f64) -> Self {
        self.scores.lock().insert(leaf, score);
        self
    }

    pub fn compressed(&self) -> Vec<u32> {
        self.compressed.lock().clone()
    }
}

impl ImageProcessor for FakeImages {
    fn compress(&self, _book_dir: &Path, leaf: u32) -> Result<()> {
        self.compressed.lock().push(leaf);
        Ok(())
    }

    fn blur_score(&self, _book_dir: &Path, leaf: u32) -> Result<f64> {
        Ok(self.scores.lock().get(&leaf).copied().unwrap_or(0.0))
    }
}

/// In-memory filesystem whose `remove_dir_all` fails while `fail_removals`
/// is set. Everything else goes to the wrapped [`MockFileSystem`].
#[derive(Debug, Default)]
pub struct StuckRemovalFs {
    inner: MockFileSystem,
    fail_removals: AtomicBool,
}

impl StuckRemovalFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }
}

impl FileSystem for StuckRemovalFs {
    fn read_to_string(&self, path: &Path) -> anyhow::Result<String> {
        self.inner.read_to_string(path)
    }

    fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        self.inner.read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        self.inner.write(path, contents)
    }

    fn write_exclusive(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        self.inner.write_exclusive(path, contents)
    }

    fn append(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        self.inner.append(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            anyhow::bail!("removing {:?}: device or resource busy", path);
        }
        self.inner.remove_dir_all(path)
    }
}
