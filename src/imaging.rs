// src/imaging.rs

//! Image processing collaborator used by the packaging pipelines.

use std::fmt;
use std::path::Path;

use crate::errors::Result;

pub trait ImageProcessor: Send + Sync + fmt::Debug {
    /// Compress the captured image of `leaf` in place.
    fn compress(&self, book_dir: &Path, leaf: u32) -> Result<()>;

    /// Blurriness of `leaf` in `0.0..=1.0`; higher is blurrier.
    fn blur_score(&self, book_dir: &Path, leaf: u32) -> Result<f64>;
}

/// Leaves images untouched and reports every leaf as sharp.
#[derive(Debug, Clone, Default)]
pub struct NoopImages;

impl ImageProcessor for NoopImages {
    fn compress(&self, _book_dir: &Path, _leaf: u32) -> Result<()> {
        Ok(())
    }

    fn blur_score(&self, _book_dir: &Path, _leaf: u32) -> Result<f64> {
        Ok(0.0)
    }
}
