// src/library/dir.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::book::{Book, SharedBook, Status};
use crate::errors::{BookflowError, Result};
use crate::fs::FileSystem;
use crate::library::{Library, LibraryEvent};

const EVENT_CAPACITY: usize = 256;

/// Library backed by a directory holding one sub-directory per book,
/// named by the book's uuid.
pub struct DirLibrary {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    books: RwLock<BTreeMap<Uuid, SharedBook>>,
    events: broadcast::Sender<LibraryEvent>,
}

impl fmt::Debug for DirLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirLibrary")
            .field("root", &self.root)
            .field("books", &self.books.read().len())
            .finish_non_exhaustive()
    }
}

impl DirLibrary {
    /// Open (creating if needed) the library at `root` and load every book.
    ///
    /// Directories that are not valid books are skipped with a warning.
    pub fn open(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let root = root.into();
        fs.create_dir_all(&root)?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut books = BTreeMap::new();

        for entry in fs.read_dir(&root)? {
            if !fs.is_dir(&entry) {
                continue;
            }
            match Book::open(fs.clone(), entry.clone()) {
                Ok(mut book) => {
                    book.attach_events(events.clone());
                    books.insert(book.uuid(), Arc::new(Mutex::new(book)));
                }
                Err(e) => warn!(dir = ?entry, error = %e, "skipping unreadable book directory"),
            }
        }

        info!(root = ?root, books = books.len(), "library opened");
        Ok(Self {
            root,
            fs,
            books: RwLock::new(books),
            events,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn emit(&self, event: LibraryEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Library for DirLibrary {
    fn get_all_books(&self) -> Vec<SharedBook> {
        self.books.read().values().cloned().collect()
    }

    fn new_book(
        &self,
        identifier: Option<&str>,
        status: Status,
        error: Option<String>,
    ) -> Result<SharedBook> {
        let uuid = Uuid::new_v4();
        let dir = self.root.join(uuid.to_string());

        let mut book = Book::create(self.fs.clone(), dir, uuid, status, error)?;
        if let Some(id) = identifier {
            book.set_identifier(id)?;
        }
        book.attach_events(self.events.clone());

        let shared = Arc::new(Mutex::new(book));
        self.books.write().insert(uuid, shared.clone());
        debug!(book = %uuid, status = %status, "registered new book");
        self.emit(LibraryEvent::BookCreated(uuid));
        Ok(shared)
    }

    fn get_item(&self, uuid: &Uuid) -> Result<SharedBook> {
        self.books
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| BookflowError::BookNotFound(uuid.to_string()))
    }

    fn delete_book(&self, uuid: &Uuid) -> Result<()> {
        let shared = self.get_item(uuid)?;
        {
            let book = shared.lock();
            if book.status() != Status::Deleted && !book.force_delete() {
                return Err(BookflowError::Precondition(format!(
                    "book {uuid} is {} and not flagged for deletion",
                    book.status()
                )));
            }
            book.delete_storage()?;
        }

        self.books.write().remove(uuid);
        info!(book = %uuid, "book removed from library");
        self.emit(LibraryEvent::BookDeleted(*uuid));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }
}
