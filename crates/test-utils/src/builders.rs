#![allow(dead_code)]

use std::sync::Arc;

use bookflow::book::{SharedBook, Status};
use bookflow::config::{ConfigFile, PoolConfig, RawConfigFile};
use bookflow::fs::mock::MockFileSystem;
use bookflow::library::{DirLibrary, Library};
use bookflow::scandata::{PageType, ScanData};
use bookflow::types::{Level, Side};

/// Library root used by [`mock_library`].
pub const LIBRARY_ROOT: &str = "/library";

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        // Tests should not sit through real backoff.
        config.retry.backoff_ms = 1;
        Self { config }
    }

    pub fn workers(mut self, high: usize, medium: usize, low: usize) -> Self {
        self.config.scheduler.high_workers = high;
        self.config.scheduler.medium_workers = medium;
        self.config.scheduler.low_workers = low;
        self
    }

    pub fn pool(mut self, name: &str, workers: usize, levels: &[Level]) -> Self {
        self.config.scheduler.pool.push(PoolConfig {
            name: name.to_string(),
            workers,
            levels: levels.to_vec(),
        });
        self
    }

    pub fn auto_upload(mut self, val: bool) -> Self {
        self.config.orchestrator.auto_upload = val;
        self
    }

    pub fn delete_after_upload(mut self, val: bool) -> Self {
        self.config.orchestrator.delete_after_upload = val;
        self
    }

    pub fn required_metadata(mut self, keys: &[&str]) -> Self {
        self.config.orchestrator.required_metadata = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self.config.retry.backoff_ms = backoff_ms;
        self
    }

    pub fn ready_repub_state(mut self, state: i32) -> Self {
        self.config.remote.ready_repub_state = state;
        self
    }

    pub fn blur_threshold(mut self, threshold: f64) -> Self {
        self.config.packaging.blur_threshold = threshold;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn build_arc(self) -> Arc<ConfigFile> {
        Arc::new(self.build())
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ScanData` ledgers.
pub struct ScanDataBuilder {
    scandata: ScanData,
}

impl ScanDataBuilder {
    pub fn new() -> Self {
        Self {
            scandata: ScanData::new(),
        }
    }

    /// Append `n` LEFT/RIGHT spreads of `Normal` leaves.
    pub fn spreads(mut self, n: u32) -> Self {
        for _ in 0..n {
            self.scandata.append_spread(Some(1_700_000_000));
        }
        self
    }

    /// Append `n` single `Normal` leaves, alternating sides.
    pub fn leaves(mut self, n: u32) -> Self {
        for i in 0..n {
            let side = if i % 2 == 0 { Side::Left } else { Side::Right };
            self.scandata.append_leaf(side, PageType::Normal, None);
        }
        self
    }

    pub fn page_type(mut self, leaf: u32, page_type: PageType) -> Self {
        self.scandata
            .set_page_type(leaf, page_type)
            .expect("page type on existing leaf");
        self
    }

    pub fn note(mut self, leaf: u32, note: &str) -> Self {
        self.scandata
            .set_note(leaf, Some(note.to_string()))
            .expect("note on existing leaf");
        self
    }

    pub fn assert(mut self, leaf: u32, page: u32) -> Self {
        self.scandata
            .assert_page_number(leaf, page)
            .expect("assertion on existing leaf");
        self
    }

    pub fn build(self) -> ScanData {
        self.scandata
    }
}

impl Default for ScanDataBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A `DirLibrary` over an in-memory filesystem rooted at [`LIBRARY_ROOT`].
pub fn mock_library() -> (Arc<MockFileSystem>, Arc<DirLibrary>) {
    let fs = Arc::new(MockFileSystem::new());
    let library =
        DirLibrary::open(LIBRARY_ROOT, fs.clone()).expect("open in-memory library");
    (fs, Arc::new(library))
}

/// Register a book in `status` with the given metadata.
pub fn new_book(library: &dyn Library, status: Status, metadata: &[(&str, &str)]) -> SharedBook {
    let book = library.new_book(None, status, None).expect("new book");
    {
        let mut guard = book.lock();
        for (key, value) in metadata {
            guard.set_metadata(*key, *value).expect("set metadata");
        }
    }
    book
}

/// Register a book whose ledger holds `scandata` (saved to disk).
pub fn new_book_with_scandata(
    library: &dyn Library,
    status: Status,
    metadata: &[(&str, &str)],
    scandata: ScanData,
) -> SharedBook {
    let book = new_book(library, status, metadata);
    {
        let mut guard = book.lock();
        *guard.scandata_mut() = scandata;
        guard.save_scandata().expect("save scandata");
    }
    book
}
