//! Ration math.
//!
//! Pure functions deciding how much of each feed an animal is owed right
//! now.  The controller feeds them with store sums and the allocation
//! loaded at the start of the visit.
//!
//! ```text
//!   per feed:  give = min( daily − eaten today,
//!                          daily / meals − eaten this interval,
//!                          daily / (daily A + daily B) × meal minimum )
//! ```
//!
//! Meal count and interval are recomputed on every check from the
//! allocation, so a changed allocation takes effect on the next dose.

use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};

use crate::model::{AnimalAllocation, DEFAULT_EAT_SPEED, Feed, FeedAmounts};

/// Doses below this (both feeds combined) are not worth dispensing, grams.
pub const MIN_DOSE_GRAMS: f64 = 10.0;
/// Re-check delay when less than [`MIN_DOSE_GRAMS`] is owed.
pub const BELOW_MINIMUM_RETRY: Duration = Duration::from_secs(5 * 60);
/// Re-check delay when the animal has not finished what it was given.
pub const TOO_SOON_RETRY: Duration = Duration::from_secs(2);
/// Presence below which the eating-pace check is skipped.
pub const PACE_GRACE: Duration = Duration::from_millis(500);
/// Gap between the end of a dose and the next check.
pub const DOSE_MARGIN: Duration = Duration::from_secs(1);

/// Hours over which automatic meals are spread.
const ACTIVE_HOURS: i64 = 18;

/// Meals per day: the configured count, or 2/4/6 by daily total
/// (≤ 3000 g, ≤ 6000 g, above).
pub fn effective_meal_count(alloc: &AnimalAllocation) -> u32 {
    if alloc.meal_count > 0 {
        return alloc.meal_count;
    }
    let total = alloc.daily.total();
    if total > 6000.0 {
        6
    } else if total > 3000.0 {
        4
    } else {
        2
    }
}

/// Length of the trailing window used for the per-meal cap.
pub fn meal_interval(alloc: &AnimalAllocation, meal_count: u32) -> TimeDelta {
    if alloc.meal_delay_min > 0 {
        TimeDelta::minutes(i64::from(alloc.meal_delay_min))
    } else {
        TimeDelta::hours(ACTIVE_HOURS) / meal_count.max(1) as i32
    }
}

/// Start of the current quota day: today's `new_day` if already passed,
/// otherwise yesterday's.
pub fn day_start(now: NaiveDateTime, new_day: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(new_day);
    if now >= today {
        today
    } else {
        today - TimeDelta::days(1)
    }
}

/// True while the animal has been present for less time than it needs to
/// eat what it was given this visit.  A non-positive `eat_speed` counts as
/// [`DEFAULT_EAT_SPEED`].
pub fn eating_too_fast(present_for: Duration, given: FeedAmounts, eat_speed: f64) -> bool {
    if present_for <= PACE_GRACE {
        return false;
    }
    let speed = if eat_speed > 0.0 { eat_speed } else { DEFAULT_EAT_SPEED };
    present_for.as_secs_f64() < given.total() / speed
}

/// Grams of each feed owed now, never negative.
pub fn compute_dose(
    alloc: &AnimalAllocation,
    meal_count: u32,
    eaten_today: FeedAmounts,
    eaten_interval: FeedAmounts,
    meal_minimum: f64,
) -> FeedAmounts {
    let total_daily = alloc.daily.total();
    let meals = f64::from(meal_count.max(1));

    let owed = |feed: Feed| {
        let daily = alloc.daily.get(feed);
        let by_day = daily - eaten_today.get(feed);
        let by_meal = daily / meals - eaten_interval.get(feed);
        let share = if total_daily > 0.0 {
            daily / total_daily * meal_minimum
        } else {
            0.0
        };
        by_day.min(by_meal).min(share).max(0.0)
    };

    FeedAmounts::new(owed(Feed::A), owed(Feed::B))
}

/// Relay on-time to dispense `grams` at `speed` g/s.
pub fn run_time(grams: f64, speed: f64) -> Duration {
    if grams <= 0.0 || speed <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(grams / speed).unwrap_or(Duration::ZERO)
}
