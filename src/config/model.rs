// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::scheduler::WorkerPool;
use crate::task::RetryPolicy;
use crate::types::Level;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// high_workers = 2
/// medium_workers = 2
/// low_workers = 1
///
/// [orchestrator]
/// interval_secs = 30
/// auto_upload = false
/// required_metadata = ["title"]
///
/// [retry]
/// max_attempts = 3
/// backoff_ms = 500
/// ```
///
/// All sections are optional and have reasonable defaults. Use
/// [`ConfigFile::try_from`] to get a validated configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub packaging: PackagingSection,

    #[serde(default)]
    pub library: LibrarySection,
}

/// Validated configuration.
///
/// Built once at startup and shared by reference (usually as
/// `Arc<ConfigFile>`) with the scheduler, orchestrator and pipelines.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub orchestrator: OrchestratorSection,
    pub retry: RetrySection,
    pub remote: RemoteSection,
    pub packaging: PackagingSection,
    pub library: LibrarySection,
}

impl ConfigFile {
    /// Build a `ConfigFile` from a raw one without running validation.
    ///
    /// Only [`TryFrom<RawConfigFile>`] should call this.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            scheduler: raw.scheduler,
            orchestrator: raw.orchestrator,
            retry: raw.retry,
            remote: raw.remote,
            packaging: raw.packaging,
            library: raw.library,
        }
    }

    /// Worker pools to start, either the explicit `[[scheduler.pool]]`
    /// entries or one pool per level sized by `*_workers`.
    pub fn worker_pools(&self) -> Vec<WorkerPool> {
        if !self.scheduler.pool.is_empty() {
            return self
                .scheduler
                .pool
                .iter()
                .map(|p| WorkerPool::new(p.name.clone(), p.workers, p.levels.clone()))
                .collect();
        }

        vec![
            WorkerPool::new("high", self.scheduler.high_workers, vec![Level::High]),
            WorkerPool::new("medium", self.scheduler.medium_workers, vec![Level::Medium]),
            WorkerPool::new("low", self.scheduler.low_workers, vec![Level::Low]),
        ]
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff: Duration::from_millis(self.retry.backoff_ms),
        }
    }

    pub fn move_along_interval(&self) -> Duration {
        Duration::from_secs(self.orchestrator.interval_secs)
    }

    pub fn download_sync_interval(&self) -> Duration {
        Duration::from_secs(self.orchestrator.download_sync_secs)
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_high_workers")]
    pub high_workers: usize,

    #[serde(default = "default_medium_workers")]
    pub medium_workers: usize,

    #[serde(default = "default_low_workers")]
    pub low_workers: usize,

    /// Explicit pools. When present they replace the per-level defaults.
    #[serde(default)]
    pub pool: Vec<PoolConfig>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            high_workers: default_high_workers(),
            medium_workers: default_medium_workers(),
            low_workers: default_low_workers(),
            pool: Vec::new(),
        }
    }
}

/// `[[scheduler.pool]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub workers: usize,
    pub levels: Vec<Level>,
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// Seconds between the end of one move-along pass and the next.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds between remote download enumerations.
    #[serde(default = "default_download_sync_secs")]
    pub download_sync_secs: u64,

    /// Queue packaged books for upload without waiting for `force_upload`.
    #[serde(default)]
    pub auto_upload: bool,

    /// Queue verified / corrected books for deletion once uploaded.
    #[serde(default)]
    pub delete_after_upload: bool,

    /// Metadata keys that must be non-empty before packaging may begin.
    #[serde(default = "default_required_metadata")]
    pub required_metadata: Vec<String>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            download_sync_secs: default_download_sync_secs(),
            auto_upload: false,
            delete_after_upload: false,
            required_metadata: default_required_metadata(),
        }
    }
}

/// `[retry]` section, applied to steps that talk to the remote archive.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// `[remote]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    /// Repub state at which an uploaded item counts as processed.
    #[serde(default = "default_ready_repub_state")]
    pub ready_repub_state: i32,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            ready_repub_state: default_ready_repub_state(),
        }
    }
}

/// `[packaging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PackagingSection {
    /// Blur score above which a leaf is reported as blurry.
    #[serde(default = "default_blur_threshold")]
    pub blur_threshold: f64,
}

impl Default for PackagingSection {
    fn default() -> Self {
        Self {
            blur_threshold: default_blur_threshold(),
        }
    }
}

/// `[library]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LibrarySection {
    #[serde(default = "default_library_path")]
    pub path: PathBuf,
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            path: default_library_path(),
        }
    }
}

fn default_high_workers() -> usize {
    2
}

fn default_medium_workers() -> usize {
    2
}

fn default_low_workers() -> usize {
    1
}

fn default_interval_secs() -> u64 {
    30
}

fn default_download_sync_secs() -> u64 {
    600
}

fn default_required_metadata() -> Vec<String> {
    vec!["title".to_string()]
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_ready_repub_state() -> i32 {
    4
}

fn default_blur_threshold() -> f64 {
    0.5
}

fn default_library_path() -> PathBuf {
    PathBuf::from("books")
}
