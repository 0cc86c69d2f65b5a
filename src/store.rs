//! Persistence of tasks and their interval logs.

use chrono::{DateTime, Duration, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::StoreError;
use crate::lifecycle::Effect;
use crate::model::{Interval, NewTask, Task, TaskId, TaskStatus};

/// Where tasks live between runs.
pub trait TaskStore {
    /// Every task, with its intervals in the order they were logged.
    fn load_all(&mut self) -> Result<Vec<Task>, StoreError>;

    /// Store a new task and return it with its assigned id.
    fn insert(&mut self, task: &NewTask) -> Result<Task, StoreError>;

    /// Write back the task's own fields (not its intervals).
    fn save(&mut self, task: &Task) -> Result<Task, StoreError>;

    /// Remove a task and all of its intervals. Returns false if there was
    /// no such task.
    fn delete(&mut self, id: TaskId) -> Result<bool, StoreError>;

    fn append_interval(&mut self, task_id: TaskId, interval: &Interval) -> Result<(), StoreError>;

    fn close_open_interval(&mut self, task_id: TaskId, end: DateTime<Local>) -> Result<(), StoreError>;

    /// Persist a task after a lifecycle transition.
    fn record(&mut self, task: &Task, effect: &Effect) -> Result<(), StoreError> {
        match effect {
            Effect::Opened(interval) => self.append_interval(task.id, interval)?,
            Effect::Closed { end, .. } => self.close_open_interval(task.id, *end)?,
            Effect::None => {}
        }
        self.save(task)?;
        Ok(())
    }

    /// Persist several transitions that belong together. Stores that can
    /// should write all of them or none.
    fn record_all(&mut self, changes: &[(&Task, &Effect)]) -> Result<(), StoreError> {
        for (task, effect) in changes {
            self.record(task, effect)?;
        }
        Ok(())
    }
}

/// A [`TaskStore`] backed by a SQLite database.
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    /// Open the database at `path`, creating the schema if needed.
    pub fn open(path: &Path) -> Result<SqliteStore, StoreError> {
        debug!(path = %path.display(), "opening task database");
        SqliteStore::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<SqliteStore, StoreError> {
        SqliteStore::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<SqliteStore, StoreError> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&db)?;
        Ok(SqliteStore { db })
    }
}

/// Create the task and time_log tables if they are missing.
pub fn init_schema(db: &Connection) -> Result<(), StoreError> {
    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS task (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  title           TEXT NOT NULL,
                  description     TEXT,
                  status          TEXT NOT NULL,
                  created_at      TEXT NOT NULL,
                  total_ms        INTEGER NOT NULL,
                  last_start_time TEXT
                  );
         CREATE TABLE IF NOT EXISTS time_log (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  task_id         INTEGER NOT NULL REFERENCES task (id) ON DELETE CASCADE,
                  start_time      TEXT NOT NULL,
                  end_time        TEXT,
                  notes           TEXT NOT NULL DEFAULT ''
                  );
         CREATE INDEX IF NOT EXISTS time_log_task ON time_log (task_id);
         CREATE UNIQUE INDEX IF NOT EXISTS one_open_log ON time_log (task_id) WHERE end_time IS NULL;",
    )?;
    Ok(())
}

fn stamp(instant: &DateTime<Local>) -> String {
    instant.to_rfc3339()
}

/// Build a task (without intervals) from a row in this order:
/// [id, title, description, status, created_at, total_ms, last_start_time]
fn task_from_row(row: &Row) -> rusqlite::Result<(Task, String)> {
    let task = Task {
        id: TaskId(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        status: TaskStatus::Backlog,
        created_at: row.get::<_, DateTime<Local>>(4)?,
        total: Duration::milliseconds(row.get::<_, i64>(5)?),
        running_since: row.get::<_, Option<DateTime<Local>>>(6)?,
        intervals: Vec::new(),
    };
    // the status is parsed outside so a bad value is a StoreError
    Ok((task, row.get(3)?))
}

fn load_tasks(db: &Connection) -> Result<Vec<Task>, StoreError> {
    let mut stmt = db.prepare(
        "SELECT id, title, description, status, created_at, total_ms, last_start_time FROM task ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| task_from_row(row))?;

    let mut tasks = Vec::new();
    for row in rows {
        let (mut task, status) = row?;
        task.status = status.parse()?;
        if task.running_since.is_some() != task.is_running() {
            return Err(StoreError::InvalidState(format!(
                "task {} is {} but its start time is {:?}",
                task.id, task.status, task.running_since
            )));
        }
        tasks.push(task);
    }
    Ok(tasks)
}

fn load_intervals(db: &Connection) -> Result<HashMap<TaskId, Vec<Interval>>, StoreError> {
    let mut stmt = db.prepare("SELECT task_id, start_time, end_time, notes FROM time_log ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            TaskId(row.get(0)?),
            Interval {
                start: row.get::<_, DateTime<Local>>(1)?,
                end: row.get::<_, Option<DateTime<Local>>>(2)?,
                notes: row.get(3)?,
            },
        ))
    })?;

    let mut by_task: HashMap<TaskId, Vec<Interval>> = HashMap::new();
    for row in rows {
        let (task_id, interval) = row?;
        by_task.entry(task_id).or_default().push(interval);
    }
    Ok(by_task)
}

fn missing(task_id: TaskId) -> StoreError {
    StoreError::InvalidState(format!("task {} does not exist", task_id))
}

fn update_task(db: &Connection, task: &Task) -> Result<(), StoreError> {
    let changed = db.execute(
        "UPDATE task SET title = ?1, description = ?2, status = ?3, total_ms = ?4, last_start_time = ?5 WHERE id = ?6",
        params![
            task.title,
            task.description,
            task.status.as_str(),
            task.total.num_milliseconds(),
            task.running_since.as_ref().map(stamp),
            task.id.0
        ],
    )?;
    if changed == 0 {
        return Err(missing(task.id));
    }
    Ok(())
}

/// Like `update_task`, but only while the stored row still has the start
/// time `previous` the transition was computed from.
fn update_task_from(
    db: &Connection,
    task: &Task,
    previous: Option<&DateTime<Local>>,
) -> Result<(), StoreError> {
    let changed = db.execute(
        "UPDATE task SET title = ?1, description = ?2, status = ?3, total_ms = ?4, last_start_time = ?5
         WHERE id = ?6 AND last_start_time IS ?7",
        params![
            task.title,
            task.description,
            task.status.as_str(),
            task.total.num_milliseconds(),
            task.running_since.as_ref().map(stamp),
            task.id.0,
            previous.map(stamp)
        ],
    )?;
    if changed == 0 {
        let exists = db
            .query_row("SELECT 1 FROM task WHERE id = ?1", params![task.id.0], |_| Ok(()))
            .optional()?
            .is_some();
        return Err(if exists {
            StoreError::Conflict(task.id)
        } else {
            missing(task.id)
        });
    }
    Ok(())
}

/// Write one transition: the interval change, then the task row.
fn apply_transition(db: &Connection, task: &Task, effect: &Effect) -> Result<(), StoreError> {
    let previous = match effect {
        Effect::Opened(interval) => {
            insert_interval(db, task.id, interval)?;
            None
        }
        Effect::Closed { started, end, .. } => {
            close_interval(db, task.id, end)?;
            Some(*started)
        }
        Effect::None => task.running_since,
    };
    update_task_from(db, task, previous.as_ref())
}

fn insert_interval(db: &Connection, task_id: TaskId, interval: &Interval) -> Result<(), StoreError> {
    db.execute(
        "INSERT INTO time_log (task_id, start_time, end_time, notes) VALUES (?1, ?2, ?3, ?4)",
        params![
            task_id.0,
            stamp(&interval.start),
            interval.end.as_ref().map(stamp),
            interval.notes
        ],
    )?;
    Ok(())
}

fn close_interval(db: &Connection, task_id: TaskId, end: &DateTime<Local>) -> Result<(), StoreError> {
    let open = db
        .query_row(
            "SELECT id FROM time_log WHERE task_id = ?1 AND end_time IS NULL",
            params![task_id.0],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    match open {
        Some(id) => {
            db.execute(
                "UPDATE time_log SET end_time = ?1 WHERE id = ?2",
                params![stamp(end), id],
            )?;
        }
        None => debug!(task = %task_id, "no open interval to close"),
    }
    Ok(())
}

impl TaskStore for SqliteStore {
    fn load_all(&mut self) -> Result<Vec<Task>, StoreError> {
        let mut tasks = load_tasks(&self.db)?;
        let mut intervals = load_intervals(&self.db)?;
        for task in tasks.iter_mut() {
            task.intervals = intervals.remove(&task.id).unwrap_or_default();
        }
        debug!(count = tasks.len(), "loaded tasks");
        Ok(tasks)
    }

    fn insert(&mut self, task: &NewTask) -> Result<Task, StoreError> {
        self.db.execute(
            "INSERT INTO task (title, description, status, created_at, total_ms) VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                task.title,
                task.description,
                TaskStatus::Backlog.as_str(),
                stamp(&task.created_at)
            ],
        )?;
        let id = TaskId(self.db.last_insert_rowid());
        debug!(task = %id, "inserted task");
        Ok(Task::from_new(id, task.clone()))
    }

    fn save(&mut self, task: &Task) -> Result<Task, StoreError> {
        update_task(&self.db, task)?;
        Ok(task.clone())
    }

    fn delete(&mut self, id: TaskId) -> Result<bool, StoreError> {
        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM time_log WHERE task_id = ?1", params![id.0])?;
        let removed = tx.execute("DELETE FROM task WHERE id = ?1", params![id.0])?;
        tx.commit()?;
        debug!(task = %id, removed, "deleted task");
        Ok(removed > 0)
    }

    fn append_interval(&mut self, task_id: TaskId, interval: &Interval) -> Result<(), StoreError> {
        insert_interval(&self.db, task_id, interval)
    }

    fn close_open_interval(&mut self, task_id: TaskId, end: DateTime<Local>) -> Result<(), StoreError> {
        close_interval(&self.db, task_id, &end)
    }

    fn record(&mut self, task: &Task, effect: &Effect) -> Result<(), StoreError> {
        self.record_all(&[(task, effect)])
    }

    /// Every interval and task row is written in one transaction, so a
    /// failure leaves the database as it was.
    fn record_all(&mut self, changes: &[(&Task, &Effect)]) -> Result<(), StoreError> {
        let tx = self.db.transaction()?;
        for (task, effect) in changes {
            apply_transition(&tx, task, effect)?;
        }
        tx.commit()?;
        for (task, _) in changes {
            debug!(task = %task.id, status = %task.status, "recorded transition");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: Some("details".to_string()),
            created_at: at(8, 0, 0),
        }
    }

    fn open_intervals(store: &SqliteStore, id: TaskId) -> i64 {
        store
            .db
            .query_row(
                "SELECT count(*) FROM time_log WHERE task_id = ?1 AND end_time IS NULL",
                params![id.0],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn insert_assigns_ids() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = store.insert(&new_task("first")).unwrap();
        let second = store.insert(&new_task("second")).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.status, TaskStatus::Backlog);
        assert_eq!(first.total, Duration::zero());

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn transitions_round_trip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut task = store.insert(&new_task("write")).unwrap();

        let effect = task.start(at(9, 0, 0), "first go").unwrap();
        store.record(&task, &effect).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![task.clone()]);
        assert_eq!(open_intervals(&store, task.id), 1);

        let effect = task.pause(at(9, 0, 10)).unwrap();
        store.record(&task, &effect).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![task.clone()]);
        assert_eq!(loaded[0].total, Duration::seconds(10));
        assert_eq!(open_intervals(&store, task.id), 0);
    }

    #[test]
    fn second_open_interval_is_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let task = store.insert(&new_task("write")).unwrap();
        store
            .append_interval(task.id, &Interval::open(at(9, 0, 0), ""))
            .unwrap();
        assert!(store
            .append_interval(task.id, &Interval::open(at(9, 5, 0), ""))
            .is_err());
        assert_eq!(open_intervals(&store, task.id), 1);
    }

    #[test]
    fn failed_record_leaves_nothing_behind() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut ghost = store.insert(&new_task("ghost")).unwrap();
        store.delete(ghost.id).unwrap();

        // the task row is gone, so the update inside the transaction fails
        let effect = ghost.start(at(9, 0, 0), "").unwrap();
        assert!(store.record(&ghost, &effect).is_err());
        let logs: i64 = store
            .db
            .query_row("SELECT count(*) FROM time_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(logs, 0);
    }

    #[test]
    fn record_all_is_all_or_nothing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut running = store.insert(&new_task("running")).unwrap();
        let effect = running.start(at(9, 0, 0), "").unwrap();
        store.record(&running, &effect).unwrap();
        let mut ghost = store.insert(&new_task("ghost")).unwrap();
        store.delete(ghost.id).unwrap();
        let before = store.load_all().unwrap();

        let mut paused = running.clone();
        let pausing = paused.pause(at(9, 10, 0)).unwrap();
        let starting = ghost.start(at(9, 10, 0), "").unwrap();
        let err = store
            .record_all(&[(&paused, &pausing), (&ghost, &starting)])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
        assert_eq!(store.load_all().unwrap(), before);
        assert_eq!(open_intervals(&store, running.id), 1);
    }

    #[test]
    fn stale_transition_is_a_conflict() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut task = store.insert(&new_task("write")).unwrap();
        let effect = task.start(at(9, 0, 0), "").unwrap();
        store.record(&task, &effect).unwrap();
        let mut stale = task.clone();

        // somebody else pauses and restarts the task
        let effect = task.pause(at(9, 10, 0)).unwrap();
        store.record(&task, &effect).unwrap();
        let effect = task.start(at(9, 20, 0), "").unwrap();
        store.record(&task, &effect).unwrap();

        let effect = stale.pause(at(9, 30, 0)).unwrap();
        let err = store.record(&stale, &effect).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == task.id));
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![task.clone()]);
        assert_eq!(loaded[0].total, Duration::minutes(10));
        assert_eq!(open_intervals(&store, task.id), 1);
    }

    #[test]
    fn delete_cascades_to_intervals() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut task = store.insert(&new_task("write")).unwrap();
        let keep = store.insert(&new_task("keep")).unwrap();
        for (start, end) in [(at(9, 0, 0), at(9, 1, 0)), (at(10, 0, 0), at(10, 1, 0))] {
            let effect = task.start(start, "").unwrap();
            store.record(&task, &effect).unwrap();
            let effect = task.pause(end).unwrap();
            store.record(&task, &effect).unwrap();
        }

        assert!(store.delete(task.id).unwrap());
        assert!(!store.delete(task.id).unwrap());
        let logs: i64 = store
            .db
            .query_row("SELECT count(*) FROM time_log WHERE task_id = ?1", params![task.id.0], |row| row.get(0))
            .unwrap();
        assert_eq!(logs, 0);
        assert_eq!(store.load_all().unwrap(), vec![keep]);
    }

    #[test]
    fn reopening_a_file_restores_running_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.sqlite");

        let mut task = {
            let mut store = SqliteStore::open(&path).unwrap();
            let mut task = store.insert(&new_task("write")).unwrap();
            let effect = task.start(at(9, 0, 0), "").unwrap();
            store.record(&task, &effect).unwrap();
            let effect = task.pause(at(9, 30, 0)).unwrap();
            store.record(&task, &effect).unwrap();
            let effect = task.start(at(10, 0, 0), "again").unwrap();
            store.record(&task, &effect).unwrap();
            task
        };

        let mut store = SqliteStore::open(&path).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![task.clone()]);
        assert_eq!(loaded[0].running_since, Some(at(10, 0, 0)));
        assert_eq!(loaded[0].open_interval().unwrap().notes, "again");

        task.complete(at(10, 15, 0)).unwrap();
        store.save(&task).unwrap();
        store.close_open_interval(task.id, at(10, 15, 0)).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![task]);
    }

    #[test]
    fn inconsistent_rows_are_reported() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let task = store.insert(&new_task("write")).unwrap();
        store
            .db
            .execute("UPDATE task SET status = 'running' WHERE id = ?1", params![task.id.0])
            .unwrap();
        assert!(matches!(store.load_all(), Err(StoreError::InvalidState(_))));

        store
            .db
            .execute("UPDATE task SET status = 'sleeping' WHERE id = ?1", params![task.id.0])
            .unwrap();
        assert!(matches!(store.load_all(), Err(StoreError::InvalidState(_))));
    }
}
