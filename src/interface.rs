use anyhow::Result;
use chrono::{Duration, NaiveDate};
use prettytable::{format, Table};
use std::io::Write;

use tasklog::accounting::{aggregate_by_day, elapsed_for_day, total_displayed, DailyReport};
use tasklog::model::span;
use tasklog::refresh::{Frame, FrameDiff, RefreshObserver};
use tasklog::{Clock, Task, TaskId, TaskStatus, TaskStore, Tracker};

/// Durations as HH:MM:SS, with hours growing past 24 if needed.
pub fn fmt_duration(duration: Duration) -> String {
    let secs = std::cmp::max(0, duration.num_seconds());
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn fmt_status(status: TaskStatus) -> String {
    match status {
        TaskStatus::Running => format!("▶ {}", status),
        TaskStatus::Completed => format!("✓ {}", status),
        TaskStatus::Backlog | TaskStatus::Paused => status.to_string(),
    }
}

fn fmt_description(task: &Task) -> String {
    task.description
        .as_deref()
        .map(|text| textwrap::fill(text, 40))
        .unwrap_or_default()
}

pub fn add_task<S: TaskStore, C: Clock>(
    tracker: &mut Tracker<S, C>,
    title: String,
    description: Option<String>,
) -> Result<()> {
    let task = tracker.add_task(&title, description.as_deref())?;
    println!("{}. {}", task.id, task.title);
    Ok(())
}

pub fn list<S: TaskStore, C: Clock>(tracker: &Tracker<S, C>) -> Result<()> {
    let now = tracker.now();
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["id", "task", "status", "total", "today", "created"]);

    let today = now.date_naive();
    for task in tracker.tasks() {
        table.add_row(row![
            task.id,
            task.title,
            fmt_status(task.status),
            fmt_duration(total_displayed(task, now)),
            fmt_duration(elapsed_for_day(task, today, now)),
            task.created_at.format("%F %R")
        ]);
    }

    if tracker.tasks().is_empty() {
        println!("No tasks! Use 'tasklog add' to add one.");
    } else {
        table.printstd();
        println!("Total: {}", fmt_duration(tracker.grand_total()));
    }
    Ok(())
}

pub fn show<S: TaskStore, C: Clock>(tracker: &Tracker<S, C>, id: TaskId) -> Result<()> {
    let now = tracker.now();
    let task = tracker.task(id)?;

    println!("{}. {} [{}]", task.id, task.title, fmt_status(task.status));
    let description = fmt_description(task);
    if !description.is_empty() {
        println!("{}", description);
    }
    println!("Total: {}", fmt_duration(total_displayed(task, now)));

    let mut log = Table::new();
    log.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    log.set_titles(row!["start", "end", "duration", "notes"]);
    for interval in &task.intervals {
        let (end, duration) = match interval.end {
            Some(end) => (end.format("%F %T").to_string(), interval.duration().unwrap_or_else(Duration::zero)),
            None => ("-".to_string(), span(interval.start, now)),
        };
        log.add_row(row![
            interval.start.format("%F %T"),
            end,
            fmt_duration(duration),
            textwrap::fill(&interval.notes, 30)
        ]);
    }
    if !task.intervals.is_empty() {
        log.printstd();
    }

    let by_day = aggregate_by_day(task, now);
    if !by_day.is_empty() {
        let mut days = Table::new();
        days.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        days.set_titles(row!["day", "time"]);
        for (day, spent) in by_day {
            days.add_row(row![day, fmt_duration(spent)]);
        }
        days.printstd();
    }
    Ok(())
}

pub fn start<S: TaskStore, C: Clock>(tracker: &mut Tracker<S, C>, id: TaskId, note: &str) -> Result<()> {
    let paused: Vec<TaskId> = if tracker.policy().exclusive_running {
        tracker.running().map(|task| task.id).filter(|other| *other != id).collect()
    } else {
        Vec::new()
    };
    let task = tracker.start(id, note)?;
    println!("Running: {}. {}", task.id, task.title);
    for other in paused {
        println!("Paused {}.", other);
    }
    Ok(())
}

pub fn pause<S: TaskStore, C: Clock>(tracker: &mut Tracker<S, C>, id: TaskId) -> Result<()> {
    let task = tracker.pause(id)?;
    println!("Paused: {}. {} ({})", task.id, task.title, fmt_duration(task.total));
    Ok(())
}

pub fn complete<S: TaskStore, C: Clock>(tracker: &mut Tracker<S, C>, id: TaskId) -> Result<()> {
    let task = tracker.complete(id)?;
    println!("Completed: {}. {} ({})", task.id, task.title, fmt_duration(task.total));
    Ok(())
}

pub fn remove_task<S: TaskStore, C: Clock>(tracker: &mut Tracker<S, C>, id: TaskId) -> Result<()> {
    let task = tracker.delete(id)?;
    println!("Removed: {}. {}", task.id, task.title);
    Ok(())
}

pub fn describe<S: TaskStore, C: Clock>(tracker: &mut Tracker<S, C>, id: TaskId, description: &str) -> Result<()> {
    let task = tracker.describe(id, description)?;
    println!("{}. {}", task.id, task.title);
    println!("{}", fmt_description(task));
    Ok(())
}

pub fn rename<S: TaskStore, C: Clock>(tracker: &mut Tracker<S, C>, id: TaskId, title: &str) -> Result<()> {
    let task = tracker.rename(id, title)?;
    println!("{}. {}", task.id, task.title);
    Ok(())
}

pub fn report<S: TaskStore, C: Clock>(tracker: &Tracker<S, C>, date: NaiveDate) -> Result<()> {
    print_report(&tracker.daily_report(date));
    Ok(())
}

fn print_report(report: &DailyReport) {
    println!("{}", report.date.format("%F"));
    if report.rows.is_empty() {
        println!("Nothing tracked.");
        return;
    }
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["id", "task", "status", "time"]);
    for line in &report.rows {
        table.add_row(row![line.id, line.title, fmt_status(line.status), fmt_duration(line.spent)]);
    }
    table.printstd();
    println!("Total: {}", fmt_duration(report.total));
}

/// Prints a status line whenever a refresh changes something.
pub struct WatchPrinter<W> {
    out: W,
}

impl<W: Write> WatchPrinter<W> {
    pub fn new(out: W) -> WatchPrinter<W> {
        WatchPrinter { out }
    }

    pub fn line(frame: &Frame) -> String {
        let running: Vec<String> = frame
            .rows
            .iter()
            .filter(|row| row.status == TaskStatus::Running)
            .map(|row| format!("{} {}", row.title, fmt_duration(row.displayed)))
            .collect();
        let running = if running.is_empty() {
            "nothing running".to_string()
        } else {
            running.join(" | ")
        };
        format!(
            "{} {} · today {}",
            frame.at.format("%T"),
            running,
            fmt_duration(frame.day_total)
        )
    }
}

impl<W: Write> RefreshObserver for WatchPrinter<W> {
    fn on_frame(&mut self, frame: &Frame, diff: &FrameDiff) -> anyhow::Result<()> {
        if diff.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "{}", WatchPrinter::<W>::line(frame))?;
        self.out.flush()?;
        Ok(())
    }
}
