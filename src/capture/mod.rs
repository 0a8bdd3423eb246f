// src/capture/mod.rs

//! Camera capture plumbing.
//!
//! One [`CameraWorker`] per physical input, each a producer/consumer pair:
//! callers queue [`CaptureRequest`]s on a bounded channel, a dedicated
//! blocking thread drains it through the [`CameraDriver`], and every
//! request is answered with a [`CaptureReport`] on its own oneshot.
//! [`Cameras`] routes requests to the worker for their side.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{BookflowError, Result};
use crate::types::Side;

/// Driver for one physical camera. Calls block until the image is on disk.
pub trait CameraDriver: Send + 'static {
    fn capture(&mut self, request: &CaptureRequest) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub side: Side,
    pub leaf: u32,
    pub destination: PathBuf,
}

impl CaptureRequest {
    /// Request for `leaf` written as `<dir>/<leaf:04>.jpg`.
    pub fn new(side: Side, leaf: u32, dir: &Path) -> Self {
        Self {
            side,
            leaf,
            destination: dir.join(format!("{leaf:04}.jpg")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Time spent waiting in the worker's queue.
    pub queued: Duration,
    /// Time spent in the driver.
    pub capture: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub side: Side,
    pub leaf: u32,
    pub error: Option<String>,
    pub stats: CaptureStats,
}

impl CaptureReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

struct Job {
    request: CaptureRequest,
    submitted: Instant,
    reply: oneshot::Sender<CaptureReport>,
}

pub struct CameraWorker {
    side: Side,
    tx: mpsc::Sender<Job>,
    handle: JoinHandle<()>,
}

impl fmt::Debug for CameraWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraWorker")
            .field("side", &self.side)
            .field("queued", &(self.tx.max_capacity() - self.tx.capacity()))
            .finish()
    }
}

impl CameraWorker {
    /// Start the worker thread. At most `capacity` requests wait in its
    /// queue; further submissions wait for room.
    pub fn spawn<D: CameraDriver>(side: Side, mut driver: D, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

        let handle = tokio::task::spawn_blocking(move || {
            info!(side = %side, "camera worker started");

            while let Some(job) = rx.blocking_recv() {
                let queued = job.submitted.elapsed();
                let started = Instant::now();
                let result = driver.capture(&job.request);

                let report = CaptureReport {
                    side,
                    leaf: job.request.leaf,
                    error: result.err().map(|e| e.to_string()),
                    stats: CaptureStats {
                        queued,
                        capture: started.elapsed(),
                    },
                };
                match &report.error {
                    Some(error) => warn!(side = %side, leaf = report.leaf, error = %error, "capture failed"),
                    None => debug!(side = %side, leaf = report.leaf, stats = ?report.stats, "captured"),
                }

                // The requester may have stopped waiting.
                let _ = job.reply.send(report);
            }

            info!(side = %side, "camera worker stopped");
        });

        Self { side, tx, handle }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Queue `request`; the report arrives on the returned receiver.
    pub async fn submit(&self, request: CaptureRequest) -> Result<oneshot::Receiver<CaptureReport>> {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            request,
            submitted: Instant::now(),
            reply,
        };
        self.tx.send(job).await.map_err(|_| stopped(self.side))?;
        Ok(rx)
    }

    /// Queue `request` and wait for its report.
    pub async fn capture(&self, request: CaptureRequest) -> Result<CaptureReport> {
        let rx = self.submit(request).await?;
        rx.await.map_err(|_| stopped(self.side))
    }

    /// Close the queue, let queued requests finish and wait for the thread.
    pub async fn shutdown(self) {
        let Self { side, tx, handle } = self;
        drop(tx);
        if let Err(e) = handle.await {
            warn!(side = %side, error = %e, "camera worker ended abnormally");
        }
    }
}

fn stopped(side: Side) -> BookflowError {
    BookflowError::Precondition(format!("camera worker for {side} has stopped"))
}

/// The station's cameras, keyed by side.
#[derive(Debug, Default)]
pub struct Cameras {
    workers: BTreeMap<Side, CameraWorker>,
}

impl Cameras {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, replacing any previous one for its side.
    pub fn add(&mut self, worker: CameraWorker) -> Option<CameraWorker> {
        self.workers.insert(worker.side(), worker)
    }

    pub fn sides(&self) -> Vec<Side> {
        self.workers.keys().copied().collect()
    }

    /// Route `request` to the camera for its side.
    pub async fn capture(&self, request: CaptureRequest) -> Result<CaptureReport> {
        let worker = self.workers.get(&request.side).ok_or_else(|| {
            BookflowError::Precondition(format!("no camera for side {}", request.side))
        })?;
        worker.capture(request).await
    }

    /// Capture one spread starting at `first_leaf`: LEFT then RIGHT, or the
    /// single camera in single-camera mode. Both sides shoot concurrently;
    /// reports come back in leaf order.
    pub async fn capture_spread(&self, first_leaf: u32, dir: &Path) -> Result<Vec<CaptureReport>> {
        if self.workers.is_empty() {
            return Err(BookflowError::Precondition("no cameras configured".to_string()));
        }

        let mut pending = Vec::with_capacity(self.workers.len());
        for (offset, worker) in self.workers.values().enumerate() {
            let leaf = first_leaf + offset as u32;
            let request = CaptureRequest::new(worker.side(), leaf, dir);
            pending.push((worker.side(), worker.submit(request).await?));
        }

        let mut reports = Vec::with_capacity(pending.len());
        for (side, rx) in pending {
            reports.push(rx.await.map_err(|_| stopped(side))?);
        }
        Ok(reports)
    }

    pub async fn shutdown(self) {
        for worker in self.workers.into_values() {
            worker.shutdown().await;
        }
    }
}
