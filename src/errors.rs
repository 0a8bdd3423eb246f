// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Variants follow the three failure classes the orchestrator cares about:
//! - transient failures (`Transient`) are retried by the step runner up to
//!   the configured attempt budget;
//! - precondition violations (`Precondition`, `Locked`, `InvalidTransition`)
//!   fail immediately and are re-driven by a later orchestrator pass;
//! - data integrity failures (`Integrity`, `JsonError`) are fatal for the
//!   current task and end up on the book's `error` slot.

use thiserror::Error;
use uuid::Uuid;

use crate::book::status::{Event, Status};

#[derive(Error, Debug)]
pub enum BookflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Book not found: {0}")]
    BookNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Book {book} is locked by {holder}")]
    Locked { book: Uuid, holder: String },

    #[error("Invalid transition: {event} is not allowed from {from}")]
    InvalidTransition { from: Status, event: Event },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Data integrity error: {0}")]
    Integrity(String),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Task cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BookflowError {
    /// Whether a step that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookflowError::Transient(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BookflowError>;
