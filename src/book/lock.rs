// src/book/lock.rs

use std::fmt;

use uuid::Uuid;

use crate::book::SharedBook;
use crate::errors::Result;

/// Scoped ownership of a book's advisory lock.
///
/// Released on drop, including during unwinding, so a failing or panicking
/// pipeline cannot orphan the lock. Never drop a guard while holding the
/// same book's mutex: `Drop` locks it.
pub struct BookLockGuard {
    book: SharedBook,
    uuid: Uuid,
    holder: String,
}

impl BookLockGuard {
    /// Take the lock or fail with [`crate::errors::BookflowError::Locked`].
    pub fn acquire(book: &SharedBook, holder: impl Into<String>) -> Result<Self> {
        let holder = holder.into();
        let uuid = {
            let mut guard = book.lock();
            guard.set_lock(&holder)?;
            guard.uuid()
        };
        Ok(Self {
            book: book.clone(),
            uuid,
            holder,
        })
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl fmt::Debug for BookLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookLockGuard")
            .field("book", &self.uuid)
            .field("holder", &self.holder)
            .finish()
    }
}

impl Drop for BookLockGuard {
    fn drop(&mut self) {
        self.book.lock().release_lock(&self.holder);
    }
}
