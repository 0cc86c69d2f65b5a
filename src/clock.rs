use chrono::{DateTime, Duration, Local, SubsecRound};
use std::cell::Cell;

/// Source of the current instant. Everything that needs "now" asks a
/// `Clock`, so tests can pin time down.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

/// The wall clock, with seconds precision.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now().trunc_subsecs(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> ManualClock {
        ManualClock {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Local>) {
        self.now.set(instant);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Local> {
        (**self).now()
    }
}
