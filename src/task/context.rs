// src/task/context.rs

//! Mutable state shared by the steps of one task.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{BookflowError, Result};
use crate::task::handle::{TaskHandle, TaskId};

/// Shape of the answer a paused step expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    YesNo,
    Text,
    Number,
    Choice(Vec<String>),
}

/// Operator-supplied answer to an [`InputPrompt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    YesNo(bool),
    Text(String),
    Number(f64),
    Choice(String),
}

impl Answer {
    pub fn fits(&self, kind: &AnswerKind) -> bool {
        match (self, kind) {
            (Answer::YesNo(_), AnswerKind::YesNo) => true,
            (Answer::Text(_), AnswerKind::Text) => true,
            (Answer::Number(_), AnswerKind::Number) => true,
            (Answer::Choice(c), AnswerKind::Choice(options)) => options.contains(c),
            _ => false,
        }
    }
}

/// Structured request for input, reported while a task is paused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPrompt {
    /// Key the answer is stored under in the task context.
    pub id: String,
    pub title: String,
    pub message: String,
    pub expected: AnswerKind,
}

impl InputPrompt {
    pub fn yes_no(id: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: message.into(),
            expected: AnswerKind::YesNo,
        }
    }
}

pub struct TaskContext {
    handle: Arc<TaskHandle>,
    values: HashMap<TypeId, Box<dyn Any + Send>>,
    answers: HashMap<String, Answer>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.handle.id())
            .field("values", &self.values.len())
            .field("answers", &self.answers)
            .finish()
    }
}

impl TaskContext {
    pub(crate) fn new(handle: Arc<TaskHandle>) -> Self {
        Self {
            handle,
            values: HashMap::new(),
            answers: HashMap::new(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.handle.id()
    }

    /// Store a value, keyed by its type. Returns the previous value.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Answer previously supplied for the prompt with `id`.
    pub fn answer(&self, id: &str) -> Option<&Answer> {
        self.answers.get(id)
    }

    pub(crate) fn supply_answer(&mut self, id: String, answer: Answer) {
        self.answers.insert(id, answer);
    }

    /// Publish a human-readable progress line.
    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(progress = %message);
        self.handle.update(|info| info.progress = Some(message));
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancel_requested()
    }

    /// `Err(Cancelled)` once cancellation was requested; for steps that
    /// abort mid-way.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BookflowError::Cancelled)
        } else {
            Ok(())
        }
    }
}
