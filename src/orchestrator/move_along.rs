// src/orchestrator/move_along.rs

use std::fmt;
use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::book::{BookLockGuard, SharedBook};
use crate::library::{BookFilter, LibraryEvent};
use crate::orchestrator::{Action, BookFacts, Orchestrator};
use crate::pipelines::{self, Services};
use crate::scheduler::{meta_task, SchedulerEvent, Submitter};
use crate::task::{Task, TaskBuilder, TaskId};
use crate::types::Level;

/// Applies orchestrator decisions to live books.
///
/// Shares the scheduler only through a [`Submitter`], so it can be owned by
/// the periodic meta-task and the event listener at the same time.
pub struct MoveAlong {
    orchestrator: Orchestrator,
    services: Arc<Services>,
}

impl fmt::Debug for MoveAlong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveAlong")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl MoveAlong {
    pub fn new(orchestrator: Orchestrator, services: Arc<Services>) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            services,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// One evaluation of `book`.
    ///
    /// A transition is applied in place and yields `None`; a pipeline is
    /// returned ready to queue, already holding the book's lock. Errors
    /// never escape: they land on the book through `raise_exception`.
    pub fn evaluate_book(&self, book: &SharedBook) -> Option<Task> {
        let kind = {
            let mut guard = book.lock();
            if guard.is_locked() {
                return None;
            }

            let facts = match BookFacts::gather(&guard, self.orchestrator.config()) {
                Ok(facts) => facts,
                Err(e) => {
                    guard.raise_exception(&e);
                    guard.touch();
                    return None;
                }
            };

            let action = self.orchestrator.evaluate(&guard, &facts);
            guard.touch();

            let action = action?;
            info!(
                parent: guard.span(),
                at = %OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
                status = %guard.status(),
                action = %action,
                "==== move along ===="
            );

            match action {
                Action::Transition(event) => {
                    if let Err(e) = guard.transition(event) {
                        guard.raise_exception(&e);
                    }
                    return None;
                }
                Action::Schedule(kind) => kind,
            }
        };

        // Mutex released: the lock guard and the pipeline builder both take it.
        let guard = match BookLockGuard::acquire(book, kind.as_str()) {
            Ok(guard) => guard,
            Err(e) => {
                debug!(pipeline = %kind, error = %e, "book taken before pipeline was queued");
                return None;
            }
        };
        Some(pipelines::build(kind, book, Some(guard), &self.services))
    }

    /// Evaluate `book` and queue whatever pipeline it needs.
    pub fn move_along(&self, book: &SharedBook, submitter: &Submitter) -> Option<TaskId> {
        let task = self.evaluate_book(book)?;
        let name = task.name().to_string();
        match submitter.submit(task) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(pipeline = %name, error = %e, "could not queue pipeline");
                None
            }
        }
    }

    /// One pass over every unlocked book; returns the pipelines to queue.
    pub fn pass(&self) -> Vec<Task> {
        let books = self.services.library.get_books(&BookFilter::Locked(false));
        debug!(books = books.len(), "move-along pass");
        books
            .iter()
            .filter_map(|book| self.evaluate_book(book))
            .collect()
    }

    /// The move-along meta-task. Add `.interval(..)` for the periodic form.
    pub fn meta_task(self: &Arc<Self>, submitter: Submitter) -> TaskBuilder {
        let this = self.clone();
        meta_task("move_along", Level::High, submitter, move |ctx| {
            let tasks = this.pass();
            ctx.report(format!("{} pipelines to queue", tasks.len()));
            Ok(tasks)
        })
    }

    /// Re-evaluate a book whenever something may have unblocked it: its
    /// status changed, it was just created, or a task that owned it ended.
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut scheduler_events: broadcast::Receiver<SchedulerEvent>,
        submitter: Submitter,
    ) -> JoinHandle<()> {
        let this = self.clone();
        let mut library_events = self.services.library.subscribe();

        tokio::spawn(async move {
            info!("move-along listener started");
            loop {
                let uuid = tokio::select! {
                    event = library_events.recv() => match event {
                        Ok(LibraryEvent::StatusChanged { uuid, .. })
                        | Ok(LibraryEvent::BookCreated(uuid)) => Some(uuid),
                        Ok(LibraryEvent::BookDeleted(_)) => None,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "library events lagged; periodic pass will catch up");
                            None
                        }
                        Err(RecvError::Closed) => break,
                    },
                    event = scheduler_events.recv() => match event {
                        Ok(SchedulerEvent::TaskRemoved(info)) => info.book,
                        Ok(_) => None,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "scheduler events lagged; periodic pass will catch up");
                            None
                        }
                        Err(RecvError::Closed) => break,
                    },
                };

                if let Some(uuid) = uuid {
                    this.clone().react(uuid, submitter.clone()).await;
                }
            }
            info!("move-along listener stopped");
        })
    }

    async fn react(self: Arc<Self>, uuid: Uuid, submitter: Submitter) {
        let joined = tokio::task::spawn_blocking(move || {
            match self.services.library.get_item(&uuid) {
                Ok(book) => {
                    self.move_along(&book, &submitter);
                }
                Err(e) => debug!(book = %uuid, error = %e, "book gone before re-evaluation"),
            }
        })
        .await;

        if let Err(e) = joined {
            warn!(book = %uuid, error = %e, "re-evaluation panicked");
        }
    }
}
