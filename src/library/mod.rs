// src/library/mod.rs

//! Book registry.
//!
//! The orchestrator never walks directories itself; it asks a [`Library`]
//! for books and listens to its [`LibraryEvent`]s. [`DirLibrary`] is the
//! production registry (one sub-directory per book under a root).

mod dir;

use std::fmt;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::book::{SharedBook, Status};
use crate::errors::Result;

pub use dir::DirLibrary;

/// Notifications published by a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    BookCreated(Uuid),
    BookDeleted(Uuid),
    StatusChanged { uuid: Uuid, from: Status, to: Status },
}

/// Selector for [`Library::get_books`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookFilter {
    Status(Status),
    Identifier(String),
    Locked(bool),
}

impl BookFilter {
    pub fn matches(&self, book: &SharedBook) -> bool {
        let book = book.lock();
        match self {
            BookFilter::Status(status) => book.status() == *status,
            BookFilter::Identifier(id) => book.identifier() == Some(id.as_str()),
            BookFilter::Locked(locked) => book.is_locked() == *locked,
        }
    }
}

pub trait Library: Send + Sync + fmt::Debug {
    /// Every registered book, in a stable order.
    fn get_all_books(&self) -> Vec<SharedBook>;

    fn get_books(&self, filter: &BookFilter) -> Vec<SharedBook> {
        self.get_all_books()
            .into_iter()
            .filter(|book| filter.matches(book))
            .collect()
    }

    /// Register a new book with a fresh uuid.
    fn new_book(
        &self,
        identifier: Option<&str>,
        status: Status,
        error: Option<String>,
    ) -> Result<SharedBook>;

    fn get_item(&self, uuid: &Uuid) -> Result<SharedBook>;

    /// Remove a book from the registry and delete its storage.
    ///
    /// Only books in `deleted` status, or flagged `force_delete`, may be
    /// removed.
    fn delete_book(&self, uuid: &Uuid) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<LibraryEvent>;
}
