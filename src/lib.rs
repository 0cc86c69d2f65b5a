//! Task timers with per-day time accounting, stored in SQLite.

pub mod accounting;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod refresh;
pub mod store;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{StoreError, TrackerError};
pub use model::{Interval, Task, TaskId, TaskStatus};
pub use store::{SqliteStore, TaskStore};
pub use tracker::{Policy, Tracker};
