use chrono::{DateTime, Duration, Local};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Identifier of a persisted task (the rowid of the task table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The lifecycle status of a task.
///
/// ```text
/// backlog ──start──▶ running ──pause──▶ paused
///                       ▲                 │
///                       └──────start──────┘
/// backlog | running | paused ──complete──▶ completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Backlog,
    Running,
    Paused,
    Completed,
}

impl TaskStatus {
    /// Return the string representation used in the database.
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(TaskStatus::Backlog),
            "running" | "in_progress" => Ok(TaskStatus::Running),
            "paused" => Ok(TaskStatus::Paused),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(StoreError::InvalidState(format!(
                "unknown task status '{}'",
                other
            ))),
        }
    }
}

/// One contiguous span of work logged against a task. An interval without
/// an end is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Local>,
    pub end: Option<DateTime<Local>>,
    pub notes: String,
}

impl Interval {
    pub fn open(start: DateTime<Local>, notes: impl Into<String>) -> Interval {
        Interval {
            start,
            end: None,
            notes: notes.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Length of a closed interval. Open intervals have no length yet.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| span(self.start, end))
    }
}

/// A task that has not been stored yet, and therefore has no id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Local>,
}

/// A tracked task together with all the intervals logged against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Local>,
    /// Time committed by closed intervals only.
    pub total: Duration,
    /// Start of the open interval, set if and only if the task is running.
    pub running_since: Option<DateTime<Local>>,
    pub intervals: Vec<Interval>,
}

impl Task {
    /// A freshly stored task: in the backlog, with no time on it.
    pub fn from_new(id: TaskId, new: NewTask) -> Task {
        Task {
            id,
            title: new.title,
            description: new.description,
            status: TaskStatus::Backlog,
            created_at: new.created_at,
            total: Duration::zero(),
            running_since: None,
            intervals: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    pub fn open_interval(&self) -> Option<&Interval> {
        self.intervals.iter().find(|interval| interval.is_open())
    }

    pub(crate) fn open_interval_mut(&mut self) -> Option<&mut Interval> {
        self.intervals.iter_mut().find(|interval| interval.is_open())
    }
}

/// `end - start`, never negative.
pub fn span(start: DateTime<Local>, end: DateTime<Local>) -> Duration {
    std::cmp::max(Duration::zero(), end - start)
}
