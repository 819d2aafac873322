//! Live state of one animal's visit.

use std::time::Duration;

use chrono::NaiveDateTime;

use crate::model::{AnimalAllocation, AnimalId, FeedAmounts, MealRecordId};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub animal: AnimalId,
    /// Wall-clock arrival, written to the meal record.
    pub entry_time: NaiveDateTime,
    /// Monotonic arrival, used for the eating-pace check.
    pub entry_uptime: Duration,
    /// Grams dispensed this visit.
    pub given: FeedAmounts,
    /// History row opened by the first dose, updated by later ones.
    pub record: Option<MealRecordId>,
    /// Loaded on arrival; `None` when the store has no row for the animal.
    pub allocation: Option<AnimalAllocation>,
}

impl Session {
    pub fn new(
        animal: AnimalId,
        entry_time: NaiveDateTime,
        entry_uptime: Duration,
        allocation: Option<AnimalAllocation>,
    ) -> Self {
        Self {
            animal,
            entry_time,
            entry_uptime,
            given: FeedAmounts::ZERO,
            record: None,
            allocation,
        }
    }

    pub fn present_for(&self, now: Duration) -> Duration {
        now.saturating_sub(self.entry_uptime)
    }
}
