// src/book/files.rs

//! Small per-book files living next to `scandata.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::book::status::Status;
use crate::errors::{BookflowError, Result};
use crate::fs::FileSystem;

pub const IDENTIFIER_FILE: &str = "identifier.txt";
pub const UPLOAD_LOCK_FILE: &str = "upload_lock";
pub const TIME_LOG_FILE: &str = "time.log";
pub const HISTORY_FILE: &str = "history.log";
pub const METADATA_FILE: &str = "metadata.json";

/// One line of `history.log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub from: Option<Status>,
    pub to: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFile {
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub force_upload: bool,
    #[serde(default)]
    pub force_delete: bool,
}

/// What the `upload_lock` file says about an in-flight upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadLockState {
    Absent,
    /// Written by this process.
    Held,
    /// Left behind by another (presumably dead) process.
    Stale(String),
}

pub fn read_history(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<HistoryEntry>> {
    let path = dir.join(HISTORY_FILE);
    if !fs.exists(&path) {
        return Ok(Vec::new());
    }

    let text = fs.read_to_string(&path)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                BookflowError::Integrity(format!("{:?} line {}: {e}", path, n + 1))
            })
        })
        .collect()
}

pub fn append_history(fs: &dyn FileSystem, dir: &Path, entry: &HistoryEntry) -> Result<()> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    fs.append(&dir.join(HISTORY_FILE), line.as_bytes())?;
    Ok(())
}

pub fn read_metadata(fs: &dyn FileSystem, dir: &Path) -> Result<MetadataFile> {
    let path = dir.join(METADATA_FILE);
    if !fs.exists(&path) {
        return Ok(MetadataFile::default());
    }
    let text = fs.read_to_string(&path)?;
    serde_json::from_str(&text)
        .map_err(|e| BookflowError::Integrity(format!("malformed {:?}: {e}", path)))
}

pub fn write_metadata(fs: &dyn FileSystem, dir: &Path, file: &MetadataFile) -> Result<()> {
    let text = serde_json::to_string_pretty(file)?;
    fs.write_exclusive(&dir.join(METADATA_FILE), text.as_bytes())?;
    Ok(())
}

pub fn read_identifier(fs: &dyn FileSystem, dir: &Path) -> Result<Option<String>> {
    let path = dir.join(IDENTIFIER_FILE);
    if !fs.exists(&path) {
        return Ok(None);
    }
    let text = fs.read_to_string(&path)?;
    let id = text.trim();
    Ok((!id.is_empty()).then(|| id.to_string()))
}

/// Cumulative active-editing seconds; a missing file is zero.
pub fn read_time_log(fs: &dyn FileSystem, dir: &Path) -> Result<f64> {
    let path = dir.join(TIME_LOG_FILE);
    if !fs.exists(&path) {
        return Ok(0.0);
    }
    let text = fs.read_to_string(&path)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(0.0);
    }
    text.parse::<f64>()
        .map_err(|e| BookflowError::Integrity(format!("malformed {:?}: {e}", path)))
}

pub fn read_upload_lock(fs: &dyn FileSystem, dir: &Path) -> Result<UploadLockState> {
    let path = dir.join(UPLOAD_LOCK_FILE);
    if !fs.exists(&path) {
        return Ok(UploadLockState::Absent);
    }
    let text = fs.read_to_string(&path)?;
    let pid = text.trim();
    if pid == std::process::id().to_string() {
        Ok(UploadLockState::Held)
    } else {
        Ok(UploadLockState::Stale(pid.to_string()))
    }
}
