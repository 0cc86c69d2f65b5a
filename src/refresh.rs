//! The periodic refresh that keeps a display of running timers current.

use chrono::{DateTime, Duration, Local, NaiveDate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use crate::accounting::{elapsed_for_day, total_displayed};
use crate::clock::Clock;
use crate::model::{TaskId, TaskStatus};
use crate::store::TaskStore;
use crate::tracker::Tracker;

/// What a display shows for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRow {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub displayed: Duration,
    pub today: Duration,
}

/// Everything a display needs at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub at: DateTime<Local>,
    pub day: NaiveDate,
    pub rows: Vec<FrameRow>,
    pub day_total: Duration,
}

impl Frame {
    pub fn capture<S: TaskStore, C: Clock>(tracker: &Tracker<S, C>) -> Frame {
        let at = tracker.now();
        let day = at.date_naive();
        let rows: Vec<FrameRow> = tracker
            .tasks()
            .iter()
            .map(|task| FrameRow {
                id: task.id,
                title: task.title.clone(),
                status: task.status,
                displayed: total_displayed(task, at),
                today: elapsed_for_day(task, day, at),
            })
            .collect();
        let day_total = rows
            .iter()
            .fold(Duration::zero(), |acc, row| acc + row.today);
        Frame {
            at,
            day,
            rows,
            day_total,
        }
    }
}

/// Rows that differ from the previous frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameDiff {
    pub changed: Vec<TaskId>,
    pub removed: Vec<TaskId>,
    pub day_changed: bool,
}

impl FrameDiff {
    pub fn between(previous: Option<&Frame>, current: &Frame) -> FrameDiff {
        let previous = match previous {
            Some(previous) => previous,
            None => {
                return FrameDiff {
                    changed: current.rows.iter().map(|row| row.id).collect(),
                    removed: Vec::new(),
                    day_changed: true,
                }
            }
        };
        let changed = current
            .rows
            .iter()
            .filter(|row| !previous.rows.contains(row))
            .map(|row| row.id)
            .collect();
        let removed = previous
            .rows
            .iter()
            .filter(|old| current.rows.iter().all(|row| row.id != old.id))
            .map(|old| old.id)
            .collect();
        FrameDiff {
            changed,
            removed,
            day_changed: previous.day != current.day,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty() && !self.day_changed
    }
}

/// Receives each refreshed frame.
pub trait RefreshObserver {
    fn on_frame(&mut self, frame: &Frame, diff: &FrameDiff) -> anyhow::Result<()>;
}

/// Ticks on a fixed cadence, computing a frame each time.
pub struct RefreshLoop {
    interval: StdDuration,
    previous: Option<Frame>,
}

impl RefreshLoop {
    pub fn new(interval: StdDuration) -> RefreshLoop {
        RefreshLoop {
            interval,
            previous: None,
        }
    }

    /// Compute a frame and what changed since the last tick.
    pub fn tick<S: TaskStore, C: Clock>(&mut self, tracker: &Tracker<S, C>) -> (Frame, FrameDiff) {
        let frame = Frame::capture(tracker);
        let diff = FrameDiff::between(self.previous.as_ref(), &frame);
        self.previous = Some(frame.clone());
        (frame, diff)
    }

    /// Tick `max_ticks` times (forever if `None`), sleeping between ticks,
    /// until `stop` is raised. Tasks are reloaded before every tick so
    /// changes made by other processes show up. Reload and observer errors
    /// only cost that one refresh.
    pub fn run<S, C, O>(
        &mut self,
        tracker: &mut Tracker<S, C>,
        observer: &mut O,
        max_ticks: Option<u64>,
        stop: &AtomicBool,
    ) where
        S: TaskStore,
        C: Clock,
        O: RefreshObserver,
    {
        let mut ticks = 0u64;
        while !stop.load(Ordering::SeqCst) {
            if let Err(error) = tracker.reload() {
                warn!("reload failed: {}", error);
            }
            let (frame, diff) = self.tick(tracker);
            debug!(tick = ticks, changed = diff.changed.len(), "refresh");
            if let Err(error) = observer.on_frame(&frame, &diff) {
                warn!("refresh failed: {:#}", error);
            }
            ticks += 1;
            if max_ticks.map_or(false, |max| ticks >= max) {
                break;
            }
            self.sleep(stop);
        }
        debug!(ticks, "refresh stopped");
    }

    /// Sleep for one interval, waking early if `stop` is raised.
    fn sleep(&self, stop: &AtomicBool) {
        let mut left = self.interval;
        while !left.is_zero() && !stop.load(Ordering::SeqCst) {
            let nap = left.min(STOP_POLL);
            std::thread::sleep(nap);
            left -= nap;
        }
    }
}

const STOP_POLL: StdDuration = StdDuration::from_millis(100);
