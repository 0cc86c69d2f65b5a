//! Elapsed time queries over a task's interval log.
//!
//! All of these are pure functions of the task and a reference instant, so
//! they can be called on every refresh tick.

use chrono::{DateTime, Duration, Local, NaiveDate};
use std::collections::BTreeMap;

use crate::model::{span, Task, TaskId, TaskStatus};

/// Time of the interval currently running, measured up to `now`.
fn live(task: &Task, now: DateTime<Local>) -> Option<(NaiveDate, Duration)> {
    if !task.is_running() {
        return None;
    }
    task.running_since
        .map(|start| (start.date_naive(), span(start, now)))
}

/// Closed intervals as (start date, duration) pairs.
fn closed(task: &Task) -> impl Iterator<Item = (NaiveDate, Duration)> + '_ {
    task.intervals.iter().filter_map(|interval| {
        interval
            .duration()
            .map(|duration| (interval.start.date_naive(), duration))
    })
}

/// Time spent on `task` during `date`: closed intervals that started that
/// day, plus the running interval if it started that day.
pub fn elapsed_for_day(task: &Task, date: NaiveDate, now: DateTime<Local>) -> Duration {
    closed(task)
        .chain(live(task, now))
        .filter(|(day, _)| *day == date)
        .fold(Duration::zero(), |acc, (_, duration)| acc + duration)
}

/// Time spent on `task` per calendar day, keyed by the day each interval
/// started.
pub fn aggregate_by_day(task: &Task, now: DateTime<Local>) -> BTreeMap<NaiveDate, Duration> {
    let mut by_day = BTreeMap::new();
    for (day, duration) in closed(task).chain(live(task, now)) {
        let bucket = by_day.entry(day).or_insert_with(Duration::zero);
        *bucket = *bucket + duration;
    }
    by_day
}

/// Accumulated time, plus the running interval if any.
pub fn total_displayed(task: &Task, now: DateTime<Local>) -> Duration {
    match live(task, now) {
        Some((_, running)) => task.total + running,
        None => task.total,
    }
}

/// Sum of [`total_displayed`] over every task.
pub fn grand_total<'a>(tasks: impl IntoIterator<Item = &'a Task>, now: DateTime<Local>) -> Duration {
    tasks
        .into_iter()
        .fold(Duration::zero(), |acc, task| acc + total_displayed(task, now))
}

/// One line of a daily report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyReportRow {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub spent: Duration,
}

/// Time spent on each task during a given day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub rows: Vec<DailyReportRow>,
    pub total: Duration,
}

/// Build the report for `date`. Tasks without time on that day are left out.
pub fn daily_report<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    date: NaiveDate,
    now: DateTime<Local>,
) -> DailyReport {
    let rows: Vec<DailyReportRow> = tasks
        .into_iter()
        .filter_map(|task| {
            let spent = elapsed_for_day(task, date, now);
            if spent > Duration::zero() {
                Some(DailyReportRow {
                    id: task.id,
                    title: task.title.clone(),
                    status: task.status,
                    spent,
                })
            } else {
                None
            }
        })
        .collect();
    let total = rows
        .iter()
        .fold(Duration::zero(), |acc, row| acc + row.spent);
    DailyReport { date, rows, total }
}
