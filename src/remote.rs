// src/remote.rs

//! Remote archive collaborator.
//!
//! The wire protocol is somebody else's problem: pipelines only need
//! success/failure, an item's outstanding catalog work, and the numeric
//! repub state. Implementations should report network trouble as
//! [`BookflowError::Transient`] so steps retry it, and wrong remote state as
//! [`BookflowError::Precondition`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{BookflowError, Result};
use crate::fs::FileSystem;

/// What the archive knows about an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteItem {
    pub identifier: String,
    pub exists: bool,
    /// Catalog tasks still queued or running for the item.
    pub outstanding_tasks: u32,
    pub repub_state: Option<i32>,
}

/// One file handed to [`RemoteArchive::upload_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Hex blake3 digest of the contents.
    pub blake3: String,
}

pub trait RemoteArchive: Send + Sync + fmt::Debug {
    fn get_item(&self, identifier: &str) -> Result<RemoteItem>;

    fn modify_metadata(&self, identifier: &str, metadata: &BTreeMap<String, String>) -> Result<()>;

    fn upload_files(&self, identifier: &str, files: &[UploadFile]) -> Result<()>;

    fn repub_state(&self, identifier: &str) -> Result<i32>;

    /// Identifiers the archive wants this station to download.
    fn pending_downloads(&self) -> Result<Vec<String>>;

    /// Fetch an item's files into `dest`.
    fn download(&self, identifier: &str, dest: &Path, fs: &dyn FileSystem) -> Result<()>;
}

/// Stand-in used when no archive is configured: every call is a
/// precondition failure, except that there is never anything to download.
#[derive(Debug, Clone, Default)]
pub struct OfflineArchive;

impl OfflineArchive {
    fn offline<T>(&self, what: &str) -> Result<T> {
        Err(BookflowError::Precondition(format!(
            "no remote archive configured ({what})"
        )))
    }
}

impl RemoteArchive for OfflineArchive {
    fn get_item(&self, _identifier: &str) -> Result<RemoteItem> {
        self.offline("get item")
    }

    fn modify_metadata(&self, _identifier: &str, _metadata: &BTreeMap<String, String>) -> Result<()> {
        self.offline("modify metadata")
    }

    fn upload_files(&self, _identifier: &str, _files: &[UploadFile]) -> Result<()> {
        self.offline("upload files")
    }

    fn repub_state(&self, _identifier: &str) -> Result<i32> {
        self.offline("repub state")
    }

    fn pending_downloads(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn download(&self, _identifier: &str, _dest: &Path, _fs: &dyn FileSystem) -> Result<()> {
        self.offline("download")
    }
}
