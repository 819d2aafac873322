//! Clock adapters.
//!
//! - [`SystemClock`]: `std::time::Instant` for uptime and the local time
//!   zone (via `chrono`) for wall-clock values.
//! - [`ManualClock`]: advanced by hand; both readings move together.

use std::cell::Cell;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, TimeDelta};

use crate::app::ports::Clock;

pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn uptime(&self) -> Duration {
        self.start.elapsed()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock for simulations.  Uptime starts at zero.
#[derive(Debug)]
pub struct ManualClock {
    uptime: Cell<Duration>,
    wall: Cell<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(wall: NaiveDateTime) -> Self {
        Self {
            uptime: Cell::new(Duration::ZERO),
            wall: Cell::new(wall),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.uptime.set(self.uptime.get() + d);
        let delta = TimeDelta::from_std(d).unwrap_or(TimeDelta::zero());
        self.wall.set(self.wall.get() + delta);
    }

    /// Jump the wall clock without moving uptime (e.g. NTP correction).
    pub fn set_wall(&self, wall: NaiveDateTime) {
        self.wall.set(wall);
    }
}

impl Clock for ManualClock {
    fn uptime(&self) -> Duration {
        self.uptime.get()
    }

    fn local_now(&self) -> NaiveDateTime {
        self.wall.get()
    }
}
