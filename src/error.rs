//! Error types for the tracker, the store and the task lifecycle.

use thiserror::Error;

use crate::model::{TaskId, TaskStatus};

/// Errors from the persistence gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Data in the database that cannot be turned back into a task.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The stored task no longer matches the copy a transition started
    /// from, because something else changed it in between.
    #[error("task {0} was changed by another process")]
    Conflict(TaskId),
}

/// The lifecycle actions a task can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Complete,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Complete => "complete",
        }
    }
}

/// An action that is not allowed from the task's current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {} a {from} task", .action.as_str())]
pub struct TransitionError {
    pub action: Action,
    pub from: TaskStatus,
}

/// Errors reported by the [`Tracker`](crate::tracker::Tracker).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Tasks need a non blank title.
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id}: {source}")]
    InvalidTransition {
        id: TaskId,
        #[source]
        source: TransitionError,
    },

    /// The store failed; in-memory state was left untouched and the
    /// operation may be retried.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}
