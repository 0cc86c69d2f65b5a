use chrono::{DateTime, Duration, Local, NaiveDate};
use tracing::{debug, info};

use crate::accounting::{self, DailyReport};
use crate::clock::Clock;
use crate::error::{TrackerError, TransitionError};
use crate::lifecycle::Effect;
use crate::model::{NewTask, Task, TaskId};
use crate::store::TaskStore;

/// Orchestration rules that are not part of a task's own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Starting a task first pauses every other running task.
    pub exclusive_running: bool,
    /// `shutdown` pauses running tasks instead of leaving their interval
    /// open in the store.
    pub pause_on_exit: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            exclusive_running: true,
            pause_on_exit: false,
        }
    }
}

/// The task collection and the operations on it.
///
/// Every mutation is applied to a copy of the task, written to the store,
/// and only then made visible, so a failed write leaves the tracker as it
/// was.
pub struct Tracker<S, C> {
    store: S,
    clock: C,
    policy: Policy,
    tasks: Vec<Task>,
}

impl<S: TaskStore, C: Clock> Tracker<S, C> {
    /// Load every task from `store`.
    pub fn open(mut store: S, clock: C, policy: Policy) -> Result<Self, TrackerError> {
        let tasks = store.load_all()?;
        debug!(count = tasks.len(), "tracker opened");
        Ok(Tracker {
            store,
            clock,
            policy,
            tasks,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Result<&Task, TrackerError> {
        self.tasks
            .iter()
            .find(|task| task.id == id)
            .ok_or(TrackerError::NotFound(id))
    }

    pub fn running(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| task.is_running())
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    fn position(&self, id: TaskId) -> Result<usize, TrackerError> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(TrackerError::NotFound(id))
    }

    /// Create a task in the backlog.
    pub fn add_task(
        &mut self,
        title: &str,
        description: Option<&str>,
    ) -> Result<&Task, TrackerError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TrackerError::EmptyTitle);
        }
        let description = description
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let task = self.store.insert(&NewTask {
            title: title.to_string(),
            description,
            created_at: self.clock.now(),
        })?;
        info!(task = %task.id, title = %task.title, "task added");
        self.tasks.push(task);
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    /// Apply `change` to a copy of the task at `index`, persist the result
    /// and commit it.
    fn transition<F>(&mut self, index: usize, change: F) -> Result<Effect, TrackerError>
    where
        F: FnOnce(&mut Task) -> Result<Effect, TransitionError>,
    {
        let mut next = self.tasks[index].clone();
        let effect = change(&mut next).map_err(|source| TrackerError::InvalidTransition {
            id: next.id,
            source,
        })?;
        self.store.record(&next, &effect)?;
        self.tasks[index] = next;
        Ok(effect)
    }

    /// Start the timer on a task. With `exclusive_running`, any other
    /// running task is paused in the same write.
    pub fn start(&mut self, id: TaskId, notes: &str) -> Result<&Task, TrackerError> {
        let index = self.position(id)?;
        let now = self.clock.now();
        let mut next = self.tasks[index].clone();
        let effect = next
            .start(now, notes)
            .map_err(|source| TrackerError::InvalidTransition { id, source })?;

        let mut paused = Vec::new();
        if self.policy.exclusive_running {
            for (other, task) in self.tasks.iter().enumerate() {
                if !task.is_running() || task.id == id {
                    continue;
                }
                let mut stopped = task.clone();
                let effect = stopped
                    .pause(now)
                    .map_err(|source| TrackerError::InvalidTransition { id: task.id, source })?;
                paused.push((other, stopped, effect));
            }
        }

        let mut changes: Vec<(&Task, &Effect)> = paused
            .iter()
            .map(|(_, task, effect)| (task, effect))
            .collect();
        changes.push((&next, &effect));
        self.store.record_all(&changes)?;

        for (other, task, _) in paused {
            info!(task = %task.id, "paused to start another task");
            self.tasks[other] = task;
        }
        self.tasks[index] = next;
        info!(task = %id, "task started");
        Ok(&self.tasks[index])
    }

    pub fn pause(&mut self, id: TaskId) -> Result<&Task, TrackerError> {
        let index = self.position(id)?;
        let now = self.clock.now();
        if let Effect::Closed { added, .. } = self.transition(index, |task| task.pause(now))? {
            info!(task = %id, added = added.num_seconds(), "task paused");
        }
        Ok(&self.tasks[index])
    }

    pub fn complete(&mut self, id: TaskId) -> Result<&Task, TrackerError> {
        let index = self.position(id)?;
        let now = self.clock.now();
        self.transition(index, |task| task.complete(now))?;
        info!(task = %id, "task completed");
        Ok(&self.tasks[index])
    }

    /// Remove a task and its interval log.
    pub fn delete(&mut self, id: TaskId) -> Result<Task, TrackerError> {
        let index = self.position(id)?;
        if !self.store.delete(id)? {
            debug!(task = %id, "task was already gone from the store");
        }
        info!(task = %id, "task deleted");
        Ok(self.tasks.remove(index))
    }

    /// Replace the description; blank text clears it.
    pub fn describe(&mut self, id: TaskId, description: &str) -> Result<&Task, TrackerError> {
        let description = Some(description.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        self.edit(id, |task| task.description = description)
    }

    pub fn rename(&mut self, id: TaskId, title: &str) -> Result<&Task, TrackerError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TrackerError::EmptyTitle);
        }
        let title = title.to_string();
        self.edit(id, |task| task.title = title)
    }

    fn edit<F: FnOnce(&mut Task)>(&mut self, id: TaskId, change: F) -> Result<&Task, TrackerError> {
        let index = self.position(id)?;
        let mut next = self.tasks[index].clone();
        change(&mut next);
        let saved = self.store.save(&next)?;
        self.tasks[index] = saved;
        debug!(task = %id, "task edited");
        Ok(&self.tasks[index])
    }

    /// Time spent per task on `date`.
    pub fn daily_report(&self, date: NaiveDate) -> DailyReport {
        accounting::daily_report(&self.tasks, date, self.clock.now())
    }

    /// Time spent on all tasks, all days.
    pub fn grand_total(&self) -> Duration {
        accounting::grand_total(&self.tasks, self.clock.now())
    }

    /// Replace the in-memory tasks with what the store holds now, picking
    /// up changes made by other processes.
    pub fn reload(&mut self) -> Result<(), TrackerError> {
        self.tasks = self.store.load_all()?;
        debug!(count = self.tasks.len(), "tracker reloaded");
        Ok(())
    }

    /// Leave the store consistent before exiting. Running tasks are either
    /// paused, or kept with their open interval already persisted.
    pub fn shutdown(&mut self) -> Result<(), TrackerError> {
        self.reload()?;
        let running: Vec<TaskId> = self.running().map(|task| task.id).collect();
        if self.policy.pause_on_exit {
            for id in running {
                self.pause(id)?;
            }
        } else if !running.is_empty() {
            info!(count = running.len(), "leaving running tasks open");
        }
        Ok(())
    }
}
