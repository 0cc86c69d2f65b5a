//! Status transitions of a single task.
//!
//! These only touch the in-memory [`Task`]; the returned [`Effect`] tells
//! the caller what has to be written to the store.

use chrono::{DateTime, Duration, Local};

use crate::error::{Action, TransitionError};
use crate::model::{span, Interval, Task, TaskStatus};

/// What a transition did to the task's interval log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A new interval was opened.
    Opened(Interval),
    /// The interval opened at `started` was closed at `end`, adding `added`
    /// to the total.
    Closed {
        started: DateTime<Local>,
        end: DateTime<Local>,
        added: Duration,
    },
    /// The interval log is unchanged.
    None,
}

impl Task {
    /// Whether `action` is allowed from the current status.
    pub fn can(&self, action: Action) -> bool {
        match (action, self.status) {
            (Action::Start, TaskStatus::Backlog) | (Action::Start, TaskStatus::Paused) => true,
            (Action::Pause, TaskStatus::Running) => true,
            (Action::Complete, status) => !status.is_terminal(),
            _ => false,
        }
    }

    fn check(&self, action: Action) -> Result<(), TransitionError> {
        if self.can(action) {
            Ok(())
        } else {
            Err(TransitionError {
                action,
                from: self.status,
            })
        }
    }

    /// Open a new interval at `now` and mark the task as running.
    pub fn start(
        &mut self,
        now: DateTime<Local>,
        notes: impl Into<String>,
    ) -> Result<Effect, TransitionError> {
        self.check(Action::Start)?;
        let interval = Interval::open(now, notes);
        self.intervals.push(interval.clone());
        self.status = TaskStatus::Running;
        self.running_since = Some(now);
        Ok(Effect::Opened(interval))
    }

    /// Close the open interval at `now` and commit its time to the total.
    pub fn pause(&mut self, now: DateTime<Local>) -> Result<Effect, TransitionError> {
        self.check(Action::Pause)?;
        let started = match self.open_interval_mut() {
            Some(interval) => {
                interval.end = Some(now);
                interval.start
            }
            // running without a logged interval: fall back on the start mark
            None => self.running_since.unwrap_or(now),
        };
        let added = span(started, now);
        self.total = self.total + added;
        self.status = TaskStatus::Paused;
        self.running_since = None;
        Ok(Effect::Closed {
            started,
            end: now,
            added,
        })
    }

    /// Pause the task if it is running, then mark it completed for good.
    pub fn complete(&mut self, now: DateTime<Local>) -> Result<Effect, TransitionError> {
        self.check(Action::Complete)?;
        let effect = if self.is_running() {
            self.pause(now)?
        } else {
            Effect::None
        };
        self.status = TaskStatus::Completed;
        Ok(effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewTask, TaskId};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn task() -> Task {
        Task::from_new(
            TaskId(1),
            NewTask {
                title: "Write report".to_string(),
                description: None,
                created_at: at(8, 0, 0),
            },
        )
    }

    fn task_in(status: TaskStatus) -> Task {
        let mut task = task();
        match status {
            TaskStatus::Backlog => {}
            TaskStatus::Running => {
                task.start(at(9, 0, 0), "").unwrap();
            }
            TaskStatus::Paused => {
                task.start(at(9, 0, 0), "").unwrap();
                task.pause(at(9, 0, 10)).unwrap();
            }
            TaskStatus::Completed => {
                task.complete(at(9, 0, 0)).unwrap();
            }
        }
        task
    }

    #[rstest]
    #[case(TaskStatus::Backlog, Action::Start, true)]
    #[case(TaskStatus::Paused, Action::Start, true)]
    #[case(TaskStatus::Running, Action::Start, false)]
    #[case(TaskStatus::Completed, Action::Start, false)]
    #[case(TaskStatus::Running, Action::Pause, true)]
    #[case(TaskStatus::Backlog, Action::Pause, false)]
    #[case(TaskStatus::Paused, Action::Pause, false)]
    #[case(TaskStatus::Completed, Action::Pause, false)]
    #[case(TaskStatus::Backlog, Action::Complete, true)]
    #[case(TaskStatus::Running, Action::Complete, true)]
    #[case(TaskStatus::Paused, Action::Complete, true)]
    #[case(TaskStatus::Completed, Action::Complete, false)]
    fn allowed_transitions(
        #[case] status: TaskStatus,
        #[case] action: Action,
        #[case] allowed: bool,
    ) {
        assert_eq!(task_in(status).can(action), allowed);
    }

    #[test]
    fn start_then_pause_accumulates() {
        let mut task = task();
        let effect = task.start(at(9, 0, 0), "drafting").unwrap();
        assert_eq!(effect, Effect::Opened(Interval::open(at(9, 0, 0), "drafting")));
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.running_since, Some(at(9, 0, 0)));

        let effect = task.pause(at(9, 0, 10)).unwrap();
        assert_eq!(
            effect,
            Effect::Closed {
                started: at(9, 0, 0),
                end: at(9, 0, 10),
                added: Duration::seconds(10)
            }
        );
        assert_eq!(task.total, Duration::seconds(10));
        assert_eq!(task.status, TaskStatus::Paused);
        assert_eq!(task.running_since, None);
        assert!(task.open_interval().is_none());
    }

    #[test]
    fn pause_resume_never_decreases_total() {
        let mut task = task_in(TaskStatus::Paused);
        let before = task.total;
        task.start(at(9, 1, 0), "").unwrap();
        task.pause(at(9, 1, 0)).unwrap();
        assert!(task.total >= before);
    }

    #[test]
    fn pause_before_start_adds_nothing() {
        let mut task = task();
        task.start(at(9, 0, 10), "").unwrap();
        task.pause(at(9, 0, 0)).unwrap();
        assert_eq!(task.total, Duration::zero());
    }

    #[test]
    fn complete_pauses_a_running_task() {
        let mut task = task_in(TaskStatus::Running);
        let effect = task.complete(at(9, 0, 30)).unwrap();
        assert_eq!(
            effect,
            Effect::Closed {
                started: at(9, 0, 0),
                end: at(9, 0, 30),
                added: Duration::seconds(30)
            }
        );
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.running_since, None);
        assert_eq!(task.total, Duration::seconds(30));
    }

    #[test]
    fn complete_from_backlog_has_no_effect_on_the_log() {
        let mut task = task();
        assert_eq!(task.complete(at(9, 0, 0)).unwrap(), Effect::None);
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn completed_task_is_never_mutated() {
        let mut task = task_in(TaskStatus::Completed);
        let before = task.clone();

        let err = task.start(at(10, 0, 0), "").unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                action: Action::Start,
                from: TaskStatus::Completed
            }
        );
        assert!(task.pause(at(10, 0, 0)).is_err());
        assert!(task.complete(at(10, 0, 0)).is_err());
        assert_eq!(task, before);
    }

    #[test]
    fn at_most_one_open_interval() {
        let mut task = task_in(TaskStatus::Running);
        assert!(task.start(at(9, 5, 0), "").is_err());
        assert_eq!(task.intervals.iter().filter(|i| i.is_open()).count(), 1);
    }
}
