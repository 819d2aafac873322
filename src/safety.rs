//! Dispense guard.
//!
//! Runs at the start of every dose check, before any store query, and
//! decides whether the relays may be switched on at all.  A refusal is
//! never fatal: the check simply ends, and the next identification, dose
//! timer or refresh tries again.
//!
//! ## Refusal lifecycle
//!
//! 1. A condition blocks dispensing (e.g. an idle window starts).
//! 2. The guard reports the [`Refusal`] and logs it once.
//! 3. Later checks that fail for the same reason stay quiet.
//! 4. The first check that passes logs the clearance.
//!
//! Deferrals decided by the ration math ([`Refusal::TooSoon`],
//! [`Refusal::BelowMinimum`]) share the type so events carry one reason
//! enum.

use core::fmt;

use chrono::NaiveTime;
use log::{info, warn};

use crate::config::BoxParameters;
use crate::model::{AnimalAllocation, Feed};

/// Why a dose check ended without dispensing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Inside an idle window.
    IdleWindow,
    /// The animal's tag was lost and the exit is being confirmed.
    ExitPending,
    /// A dose or calibration run is still in flight.
    RelaysBusy,
    /// No allocation row for the animal.
    NoAllocation,
    /// Daily allocation of a feed is zero.
    ZeroAllocation(Feed),
    /// Calibrated speed of a feed is zero.
    ZeroSpeed(Feed),
    /// Eating slower than dispensed so far; retried shortly.
    TooSoon,
    /// Less than the minimum dose is owed; retried later.
    BelowMinimum,
    /// A store query failed.
    StoreUnavailable,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdleWindow => write!(f, "idle window"),
            Self::ExitPending => write!(f, "exit pending"),
            Self::RelaysBusy => write!(f, "relays busy"),
            Self::NoAllocation => write!(f, "no allocation"),
            Self::ZeroAllocation(feed) => write!(f, "feed {feed} allocation is zero"),
            Self::ZeroSpeed(feed) => write!(f, "feed {feed} speed is zero"),
            Self::TooSoon => write!(f, "animal still eating"),
            Self::BelowMinimum => write!(f, "below minimum dose"),
            Self::StoreUnavailable => write!(f, "store unavailable"),
        }
    }
}

/// Snapshot of everything the guard looks at.
#[derive(Debug, Clone, Copy)]
pub struct DispenseConditions<'a> {
    pub time_of_day: NaiveTime,
    pub params: &'a BoxParameters,
    pub allocation: Option<&'a AnimalAllocation>,
    pub exit_pending: bool,
    pub relays_busy: bool,
}

#[derive(Debug, Default)]
pub struct DispenseGuard {
    last: Option<Refusal>,
}

impl DispenseGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the static preconditions, in priority order.
    pub fn evaluate(&mut self, c: &DispenseConditions<'_>) -> Result<(), Refusal> {
        let verdict = Self::check(c);
        match verdict {
            Err(r) => self.note(r),
            Ok(()) => {
                if let Some(prev) = self.last.take() {
                    info!("Dispense: clear ({prev} resolved)");
                }
            }
        }
        verdict
    }

    /// Record a refusal decided outside [`evaluate`](Self::evaluate).
    pub fn note(&mut self, r: Refusal) {
        if self.last != Some(r) {
            warn!("Dispense: blocked, {r}");
        }
        self.last = Some(r);
    }

    /// Last refusal, cleared by the next passing check.
    pub fn last_refusal(&self) -> Option<Refusal> {
        self.last
    }

    fn check(c: &DispenseConditions<'_>) -> Result<(), Refusal> {
        if c.params.is_idle_at(c.time_of_day) {
            return Err(Refusal::IdleWindow);
        }
        if c.exit_pending {
            return Err(Refusal::ExitPending);
        }
        if c.relays_busy {
            return Err(Refusal::RelaysBusy);
        }
        let alloc = c.allocation.ok_or(Refusal::NoAllocation)?;
        for feed in Feed::ALL {
            if alloc.daily.get(feed) <= 0.0 {
                return Err(Refusal::ZeroAllocation(feed));
            }
        }
        for feed in Feed::ALL {
            if c.params.food_speed.get(feed) <= 0.0 {
                return Err(Refusal::ZeroSpeed(feed));
            }
        }
        Ok(())
    }
}
