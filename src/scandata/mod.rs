// src/scandata/mod.rs

//! ScanData: the durable per-book page ledger.
//!
//! - [`model`] is the serialised shape of `scandata.json`.
//! - [`index`] is the derived page-type / note index and its change reports.
//! - [`edit`] holds the mutators (capture, insert, delete, per-leaf edits).
//! - [`pagenums`] interpolates page numbers from operator assertions.
//!
//! ScanData is not internally synchronised. Callers serialise access through
//! the owning book's advisory lock.

pub mod edit;
pub mod index;
pub mod model;
pub mod pagenums;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::{BookflowError, Result};
use crate::fs::FileSystem;

pub use index::{ChangeReport, IndexKey, LeafIndex};
pub use model::{
    Assertion, BookData, LeafData, PageNumData, PageNumber, PageNumberKind, PageType,
};
pub use pagenums::PageNumberSummary;

use model::ScanDataFile;

pub const SCANDATA_FILE: &str = "scandata.json";

type Subscriber = Box<dyn Fn(&ChangeReport) + Send + Sync>;

pub struct ScanData {
    book_data: BookData,
    page_data: BTreeMap<u32, LeafData>,
    index: LeafIndex,
    subscribers: Vec<Subscriber>,
}

impl fmt::Debug for ScanData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanData")
            .field("leaves", &self.page_data.len())
            .field("assertions", &self.book_data.page_num_data.assertions.len())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl Default for ScanData {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanData {
    pub fn new() -> Self {
        Self {
            book_data: BookData::default(),
            page_data: BTreeMap::new(),
            index: LeafIndex::new(),
            subscribers: Vec::new(),
        }
    }

    /// Parse a `scandata.json` document and rebuild the index.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut file: ScanDataFile = serde_json::from_str(text)
            .map_err(|e| BookflowError::Integrity(format!("malformed scandata: {e}")))?;

        check_contiguous(&file.page_data)?;
        file.book_data.page_num_data.assertions.sort();
        file.book_data
            .page_num_data
            .assertions
            .dedup_by_key(|a| a.leaf_num);

        let index = LeafIndex::build(&file.page_data);
        Ok(Self {
            book_data: file.book_data,
            page_data: file.page_data,
            index,
            subscribers: Vec::new(),
        })
    }

    /// Pretty-printed JSON with leaves in ascending order.
    pub fn to_json(&self) -> Result<String> {
        // Borrowing serialiser mirrors `ScanDataFile` without cloning leaves.
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct View<'a> {
            book_data: &'a BookData,
            page_data: &'a BTreeMap<u32, LeafData>,
        }

        let mut text = serde_json::to_string_pretty(&View {
            book_data: &self.book_data,
            page_data: &self.page_data,
        })?;
        text.push('\n');
        Ok(text)
    }

    /// Load `scandata.json` from a book directory. A missing file is an
    /// empty ledger.
    pub fn load(fs: &dyn FileSystem, dir: &Path) -> Result<Self> {
        let path = dir.join(SCANDATA_FILE);
        if !fs.exists(&path) {
            debug!(path = ?path, "no scandata yet; starting empty");
            return Ok(Self::new());
        }
        let text = fs.read_to_string(&path)?;
        Self::from_json(&text)
    }

    /// Persist to `scandata.json` under an exclusive file lock.
    pub fn save(&self, fs: &dyn FileSystem, dir: &Path) -> Result<()> {
        let path = dir.join(SCANDATA_FILE);
        let text = self.to_json()?;
        fs.write_exclusive(&path, text.as_bytes())?;
        debug!(path = ?path, leaves = self.page_data.len(), "saved scandata");
        Ok(())
    }

    /// Register an observer for change reports.
    ///
    /// Each logical operation produces at most one report.
    pub fn subscribe(&mut self, subscriber: impl Fn(&ChangeReport) + Send + Sync + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub(crate) fn publish(&self, report: ChangeReport) {
        if report.is_empty() {
            return;
        }
        for subscriber in &self.subscribers {
            subscriber(&report);
        }
    }

    pub fn book_data(&self) -> &BookData {
        &self.book_data
    }

    pub fn book_field(&self, key: &str) -> Option<&Value> {
        self.book_data.extra.get(key)
    }

    /// Set a free-form `bookData` attribute.
    pub fn set_book_field(&mut self, key: impl Into<String>, value: Value) {
        self.book_data.extra.insert(key.into(), value);
    }

    pub fn set_default_ppi(&mut self, ppi: Option<u32>) {
        self.book_data.ppi = ppi;
    }

    pub fn page_data(&self) -> &BTreeMap<u32, LeafData> {
        &self.page_data
    }

    pub fn leaf(&self, leaf: u32) -> Option<&LeafData> {
        self.page_data.get(&leaf)
    }

    pub fn page_type(&self, leaf: u32) -> Option<PageType> {
        self.page_data.get(&leaf).map(|d| d.page_type)
    }

    pub fn page_number(&self, leaf: u32) -> Option<PageNumber> {
        self.page_data.get(&leaf).and_then(|d| d.page_number)
    }

    pub fn leaf_count(&self) -> u32 {
        self.page_data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.page_data.is_empty()
    }

    pub fn max_leaf_number(&self) -> Option<u32> {
        self.page_data.keys().next_back().copied()
    }

    pub fn index(&self) -> &LeafIndex {
        &self.index
    }

    pub fn leaves_of(&self, key: impl Into<IndexKey>) -> Vec<u32> {
        self.index.leaves(key).collect()
    }

    pub fn next_leaf(&self, key: impl Into<IndexKey>, from: u32) -> Option<u32> {
        self.index.next_leaf(key, from)
    }

    pub fn prev_leaf(&self, key: impl Into<IndexKey>, from: u32) -> Option<u32> {
        self.index.prev_leaf(key, from)
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.book_data.page_num_data.assertions
    }

    /// Index rebuilt from scratch; equal to [`Self::index`] whenever the
    /// incremental maintenance is correct.
    pub fn rebuilt_index(&self) -> LeafIndex {
        LeafIndex::build(&self.page_data)
    }
}

fn check_contiguous(page_data: &BTreeMap<u32, LeafData>) -> Result<()> {
    for (expected, leaf) in page_data.keys().enumerate() {
        if *leaf != expected as u32 {
            return Err(BookflowError::Integrity(format!(
                "leaf numbers are not contiguous: expected {expected}, found {leaf}"
            )));
        }
    }
    Ok(())
}
