//! Port traits: the boundary between the feeding logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ BoxController (domain)
//! ```
//!
//! Driven adapters (store, clock, event sinks) implement these traits.
//! The [`BoxController`](super::controller::BoxController) receives them
//! per call through [`Ports`], so one store connection serves every box on
//! the reactor thread without shared mutable globals.
//!
//! All store operations are fallible.  The controller treats every failure
//! as transient: it abandons the current step and asks the store to
//! reconnect.

use std::time::Duration;

use chrono::NaiveDateTime;

use crate::config::BoxParameters;
use crate::error::StoreResult;
use crate::model::{AnimalAllocation, AnimalId, BoxId, FeedAmounts, MealRecord, MealRecordId};
use crate::sensors::TagId;

// ───────────────────────────────────────────────────────────────
// Store port (driven adapter: domain ↔ herd database)
// ───────────────────────────────────────────────────────────────

/// Result of resolving a tag against the identification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagLookup {
    /// No identification row for this tag.
    Unknown,
    /// The tag is known but not bound to an animal yet.
    Unassigned,
    Animal(AnimalId),
}

/// Herd database as seen by a feeding box.
pub trait StoreGateway {
    fn is_connected(&self) -> bool;

    /// Ask for a reconnect.  Implementations rate-limit attempts, see
    /// [`ReconnectCooldown`].
    fn request_reconnect(&mut self, now: Duration);

    fn find_animal_by_tag(&mut self, tag: &TagId) -> StoreResult<TagLookup>;

    /// Create a pending identification row so an operator can bind the
    /// tag to an animal later.
    fn record_unknown_tag(&mut self, tag: &TagId) -> StoreResult<()>;

    fn load_allocation(&mut self, animal: AnimalId) -> StoreResult<Option<AnimalAllocation>>;

    /// Grams of each feed recorded for `animal` with an entry time strictly
    /// after `since`.
    fn sum_food_since(&mut self, animal: AnimalId, since: NaiveDateTime) -> StoreResult<FeedAmounts>;

    fn insert_meal_record(&mut self, record: &MealRecord) -> StoreResult<MealRecordId>;

    fn update_meal_record(
        &mut self,
        id: MealRecordId,
        given: FeedAmounts,
        exit: NaiveDateTime,
    ) -> StoreResult<()>;

    fn load_box_config(&mut self, box_id: BoxId) -> StoreResult<Option<BoxParameters>>;

    fn insert_default_box_config(
        &mut self,
        box_id: BoxId,
        name: &str,
        params: &BoxParameters,
    ) -> StoreResult<()>;

    fn touch_last_connected(&mut self, box_id: BoxId, at: NaiveDateTime) -> StoreResult<()>;
}

/// Minimum spacing between two reconnect attempts.
pub const RECONNECT_COOLDOWN: Duration = Duration::from_secs(20);

/// Rate limiter for store reconnects, shared by every box through the
/// store adapter.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectCooldown {
    last_attempt: Option<Duration>,
    cooldown: Duration,
}

impl Default for ReconnectCooldown {
    fn default() -> Self {
        Self::new(RECONNECT_COOLDOWN)
    }
}

impl ReconnectCooldown {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_attempt: None,
            cooldown,
        }
    }

    /// Returns `true` (and records the attempt) when a reconnect may be
    /// tried at `now`.
    pub fn try_begin(&mut self, now: Duration) -> bool {
        if let Some(last) = self.last_attempt {
            if now < last + self.cooldown {
                return false;
            }
        }
        self.last_attempt = Some(now);
        true
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait Clock {
    /// Monotonic time since start.  Drives every timer.
    fn uptime(&self) -> Duration;

    /// Local wall-clock time.  Drives quotas, idle windows and history.
    fn local_now(&self) -> NaiveDateTime;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`BoxEvent`](super::events::BoxEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::BoxEvent);
}

// ───────────────────────────────────────────────────────────────
// Bundle
// ───────────────────────────────────────────────────────────────

/// Collaborators handed to the controller for one callback.
pub struct Ports<'a> {
    pub store: &'a mut dyn StoreGateway,
    pub clock: &'a dyn Clock,
    pub sink: &'a mut dyn EventSink,
}

impl<'a> Ports<'a> {
    pub fn new(
        store: &'a mut dyn StoreGateway,
        clock: &'a dyn Clock,
        sink: &'a mut dyn EventSink,
    ) -> Self {
        Self { store, clock, sink }
    }
}
