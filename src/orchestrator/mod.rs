// src/orchestrator/mod.rs

//! Book lifecycle orchestrator.
//!
//! Split the same way as a pure core and an IO shell:
//! - [`Orchestrator::evaluate`] is a pure decision function over a book and
//!   a snapshot of the facts it depends on ([`BookFacts`]). It never
//!   mutates anything, so repeated calls give the same answer.
//! - [`MoveAlong`] gathers the facts, applies the chosen [`Action`] and
//!   queues pipelines on the scheduler.

pub mod dispatch;
pub mod guards;
pub mod move_along;

use std::fmt;
use std::sync::Arc;

use crate::book::{status, Book, Event, UploadLockState};
use crate::config::model::ConfigFile;
use crate::errors::Result;
use crate::pipelines::PipelineKind;

pub use guards::{Guard, GUARDS};
pub use move_along::MoveAlong;

/// What one orchestrator pass decided for a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Apply a guarded transition directly.
    Transition(Event),
    /// Queue a pipeline for the book.
    Schedule(PipelineKind),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Transition(event) => write!(f, "transition {event}"),
            Action::Schedule(kind) => write!(f, "run {kind}"),
        }
    }
}

/// Everything `evaluate` needs beyond the book's in-memory state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFacts {
    pub upload_lock: UploadLockState,
    pub metadata_complete: bool,
}

impl BookFacts {
    /// Read the facts for `book`. Touches the filesystem for the upload lock.
    pub fn gather(book: &Book, cfg: &ConfigFile) -> Result<Self> {
        Ok(Self {
            upload_lock: book.upload_lock_state()?,
            metadata_complete: book.metadata_complete(&cfg.orchestrator.required_metadata),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: Arc<ConfigFile>,
}

impl Orchestrator {
    /// Fails if the status table is not monotonic.
    pub fn new(config: Arc<ConfigFile>) -> Result<Self> {
        status::check_monotonic()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Arc<ConfigFile> {
        &self.config
    }

    /// Decide the single next action for `book`: guards first, then the
    /// status dispatch. Terminal books skip the guards.
    pub fn evaluate(&self, book: &Book, facts: &BookFacts) -> Option<Action> {
        if book.status().is_terminal() {
            return dispatch::dispatch(book, facts).map(Action::Schedule);
        }

        if let Some(event) = self.first_guard(book, facts) {
            return Some(Action::Transition(event));
        }

        dispatch::dispatch(book, facts).map(Action::Schedule)
    }

    /// The first satisfied guard, by name, with its event.
    pub fn fired_guard(&self, book: &Book, facts: &BookFacts) -> Option<(&'static str, Event)> {
        GUARDS
            .iter()
            .find_map(|guard| (guard.check)(book, facts, &self.config).map(|e| (guard.name, e)))
    }

    fn first_guard(&self, book: &Book, facts: &BookFacts) -> Option<Event> {
        self.fired_guard(book, facts).map(|(_, event)| event)
    }
}
