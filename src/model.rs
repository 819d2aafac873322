//! Domain values shared between the controller and the store.

use core::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Animal number as assigned by the herd database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnimalId(pub i64);

impl fmt::Display for AnimalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Feeding-box number, unique per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoxId(pub u32);

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row id of a persisted meal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MealRecordId(pub i64);

/// The two feed types a box can dispense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    A,
    B,
}

impl Feed {
    pub const ALL: [Feed; 2] = [Feed::A, Feed::B];
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// A pair of gram amounts, one per feed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedAmounts {
    pub a: f64,
    pub b: f64,
}

impl FeedAmounts {
    pub const ZERO: Self = Self { a: 0.0, b: 0.0 };

    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    pub fn get(&self, feed: Feed) -> f64 {
        match feed {
            Feed::A => self.a,
            Feed::B => self.b,
        }
    }

    pub fn total(&self) -> f64 {
        self.a + self.b
    }
}

impl core::ops::Add for FeedAmounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.a + rhs.a, self.b + rhs.b)
    }
}

impl core::ops::AddAssign for FeedAmounts {
    fn add_assign(&mut self, rhs: Self) {
        self.a += rhs.a;
        self.b += rhs.b;
    }
}

/// Fallback when the stored eat speed is not positive, grams per second.
pub const DEFAULT_EAT_SPEED: f64 = 6.0;

/// Per-animal feeding plan, loaded when the animal arrives at a box.
///
/// Deserialized rows go through [`AnimalAllocation::new`], so a stored
/// non-positive eat speed never survives loading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "AllocationRow")]
pub struct AnimalAllocation {
    /// Daily allowance per feed, grams.
    pub daily: FeedAmounts,
    /// Meals per day; 0 derives it from the daily total.
    pub meal_count: u32,
    /// Minutes between meals; 0 spreads meals over the active day.
    pub meal_delay_min: u32,
    /// Maximum consumption rate, grams per second.  Always positive.
    pub eat_speed: f64,
}

impl AnimalAllocation {
    /// Build an allocation, replacing a non-positive eat speed by
    /// [`DEFAULT_EAT_SPEED`].
    pub fn new(daily: FeedAmounts, meal_count: u32, meal_delay_min: u32, eat_speed: f64) -> Self {
        let eat_speed = if eat_speed > 0.0 {
            eat_speed
        } else {
            DEFAULT_EAT_SPEED
        };
        Self {
            daily,
            meal_count,
            meal_delay_min,
            eat_speed,
        }
    }

    /// Re-apply the eat-speed default to a value built field by field.
    pub fn normalized(self) -> Self {
        Self::new(self.daily, self.meal_count, self.meal_delay_min, self.eat_speed)
    }
}

/// Allocation as stored, before validation.
#[derive(Deserialize)]
struct AllocationRow {
    daily: FeedAmounts,
    #[serde(default)]
    meal_count: u32,
    #[serde(default)]
    meal_delay_min: u32,
    #[serde(default)]
    eat_speed: f64,
}

impl From<AllocationRow> for AnimalAllocation {
    fn from(row: AllocationRow) -> Self {
        Self::new(row.daily, row.meal_count, row.meal_delay_min, row.eat_speed)
    }
}

/// One visit's feeding history row.
#[derive(Debug, Clone, PartialEq)]
pub struct MealRecord {
    pub animal: AnimalId,
    pub box_id: BoxId,
    pub given: FeedAmounts,
    pub entry: NaiveDateTime,
    pub exit: NaiveDateTime,
}
