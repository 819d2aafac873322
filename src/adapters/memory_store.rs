//! In-memory herd store.
//!
//! Implements [`StoreGateway`] over plain maps.  Used for bench runs
//! without a database and by the tests, which drive connection loss and
//! query failures through [`MemoryStore::disconnect`],
//! [`MemoryStore::set_reachable`], [`MemoryStore::set_failing`] and
//! [`MemoryStore::set_failing_writes`].
//!
//! Reconnects follow the same cooldown a database adapter uses: at most one
//! attempt per [`RECONNECT_COOLDOWN`](crate::app::ports::RECONNECT_COOLDOWN).

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use log::{info, warn};

use crate::app::ports::{ReconnectCooldown, StoreGateway, TagLookup};
use crate::config::BoxParameters;
use crate::error::{StoreError, StoreResult};
use crate::model::{AnimalAllocation, AnimalId, BoxId, FeedAmounts, MealRecord, MealRecordId};
use crate::sensors::TagId;

#[derive(Debug, Clone)]
struct BoxRow {
    name: String,
    params: BoxParameters,
    last_connected: Option<NaiveDateTime>,
}

#[derive(Debug)]
pub struct MemoryStore {
    connected: bool,
    reachable: bool,
    failing: bool,
    failing_writes: bool,
    cooldown: ReconnectCooldown,
    reconnect_attempts: u32,

    tags: HashMap<TagId, Option<AnimalId>>,
    allocations: HashMap<AnimalId, AnimalAllocation>,
    meals: Vec<(MealRecordId, MealRecord)>,
    boxes: HashMap<BoxId, BoxRow>,
    next_meal_id: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty, connected store.
    pub fn new() -> Self {
        Self {
            connected: true,
            reachable: true,
            failing: false,
            failing_writes: false,
            cooldown: ReconnectCooldown::default(),
            reconnect_attempts: 0,
            tags: HashMap::new(),
            allocations: HashMap::new(),
            meals: Vec::new(),
            boxes: HashMap::new(),
            next_meal_id: 1,
        }
    }

    // ── Seeding ───────────────────────────────────────────────

    pub fn assign_tag(&mut self, tag: TagId, animal: AnimalId) {
        self.tags.insert(tag, Some(animal));
    }

    pub fn set_allocation(&mut self, animal: AnimalId, allocation: AnimalAllocation) {
        self.allocations.insert(animal, allocation);
    }

    pub fn set_box_config(&mut self, box_id: BoxId, name: &str, params: BoxParameters) {
        self.boxes.insert(
            box_id,
            BoxRow {
                name: name.to_owned(),
                params,
                last_connected: None,
            },
        );
    }

    /// Add a history row, e.g. a meal eaten earlier in the day.
    pub fn add_meal(&mut self, record: MealRecord) -> MealRecordId {
        let id = MealRecordId(self.next_meal_id);
        self.next_meal_id += 1;
        self.meals.push((id, record));
        id
    }

    // ── Fault injection ───────────────────────────────────────

    /// Drop the connection.
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Whether a reconnect attempt succeeds.
    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Make every query fail while connected.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Make meal inserts and updates fail while reads still succeed.
    pub fn set_failing_writes(&mut self, failing: bool) {
        self.failing_writes = failing;
    }

    /// Delete a history row behind the controller's back.
    pub fn remove_meal(&mut self, id: MealRecordId) -> bool {
        let before = self.meals.len();
        self.meals.retain(|(i, _)| *i != id);
        self.meals.len() != before
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn meals(&self) -> impl Iterator<Item = (MealRecordId, &MealRecord)> {
        self.meals.iter().map(|(id, r)| (*id, r))
    }

    pub fn meal(&self, id: MealRecordId) -> Option<&MealRecord> {
        self.meals.iter().find(|(i, _)| *i == id).map(|(_, r)| r)
    }

    /// Tags waiting for an operator to bind them to an animal.
    pub fn pending_tags(&self) -> Vec<TagId> {
        let mut tags: Vec<_> = self
            .tags
            .iter()
            .filter(|(_, a)| a.is_none())
            .map(|(t, _)| *t)
            .collect();
        tags.sort();
        tags
    }

    pub fn box_config(&self, box_id: BoxId) -> Option<&BoxParameters> {
        self.boxes.get(&box_id).map(|b| &b.params)
    }

    pub fn box_name(&self, box_id: BoxId) -> Option<&str> {
        self.boxes.get(&box_id).map(|b| b.name.as_str())
    }

    pub fn last_connected(&self, box_id: BoxId) -> Option<NaiveDateTime> {
        self.boxes.get(&box_id).and_then(|b| b.last_connected)
    }

    fn ready_to_write(&self, what: &'static str) -> StoreResult<()> {
        self.ready(what)?;
        if self.failing_writes {
            return Err(StoreError::QueryFailed(what));
        }
        Ok(())
    }

    fn ready(&self, what: &'static str) -> StoreResult<()> {
        if !self.connected {
            Err(StoreError::Disconnected)
        } else if self.failing {
            Err(StoreError::QueryFailed(what))
        } else {
            Ok(())
        }
    }
}

impl StoreGateway for MemoryStore {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn request_reconnect(&mut self, now: Duration) {
        if self.connected && !self.failing && !self.failing_writes {
            return;
        }
        if !self.cooldown.try_begin(now) {
            return;
        }
        self.reconnect_attempts += 1;
        if self.reachable {
            info!("Store: reconnected (attempt {})", self.reconnect_attempts);
            self.connected = true;
            self.failing = false;
            self.failing_writes = false;
        } else {
            warn!("Store: reconnect attempt {} failed", self.reconnect_attempts);
            self.connected = false;
        }
    }

    fn find_animal_by_tag(&mut self, tag: &TagId) -> StoreResult<TagLookup> {
        self.ready("identification")?;
        Ok(match self.tags.get(tag) {
            None => TagLookup::Unknown,
            Some(None) => TagLookup::Unassigned,
            Some(Some(animal)) => TagLookup::Animal(*animal),
        })
    }

    fn record_unknown_tag(&mut self, tag: &TagId) -> StoreResult<()> {
        self.ready("identification insert")?;
        self.tags.entry(*tag).or_insert(None);
        Ok(())
    }

    fn load_allocation(&mut self, animal: AnimalId) -> StoreResult<Option<AnimalAllocation>> {
        self.ready("allocation")?;
        Ok(self.allocations.get(&animal).copied())
    }

    fn sum_food_since(&mut self, animal: AnimalId, since: NaiveDateTime) -> StoreResult<FeedAmounts> {
        self.ready("food sum")?;
        Ok(self
            .meals
            .iter()
            .filter(|(_, m)| m.animal == animal && m.entry > since)
            .fold(FeedAmounts::ZERO, |acc, (_, m)| acc + m.given))
    }

    fn insert_meal_record(&mut self, record: &MealRecord) -> StoreResult<MealRecordId> {
        self.ready_to_write("meal insert")?;
        Ok(self.add_meal(record.clone()))
    }

    fn update_meal_record(
        &mut self,
        id: MealRecordId,
        given: FeedAmounts,
        exit: NaiveDateTime,
    ) -> StoreResult<()> {
        self.ready_to_write("meal update")?;
        let (_, record) = self
            .meals
            .iter_mut()
            .find(|(i, _)| *i == id)
            .ok_or(StoreError::MissingRow)?;
        record.given = given;
        record.exit = exit;
        Ok(())
    }

    fn load_box_config(&mut self, box_id: BoxId) -> StoreResult<Option<BoxParameters>> {
        self.ready("box config")?;
        Ok(self.boxes.get(&box_id).map(|b| b.params.clone()))
    }

    fn insert_default_box_config(
        &mut self,
        box_id: BoxId,
        name: &str,
        params: &BoxParameters,
    ) -> StoreResult<()> {
        self.ready("box config insert")?;
        self.boxes.entry(box_id).or_insert_with(|| BoxRow {
            name: name.to_owned(),
            params: params.clone(),
            last_connected: None,
        });
        Ok(())
    }

    fn touch_last_connected(&mut self, box_id: BoxId, at: NaiveDateTime) -> StoreResult<()> {
        self.ready("last connected")?;
        let row = self.boxes.get_mut(&box_id).ok_or(StoreError::MissingRow)?;
        row.last_connected = Some(at);
        Ok(())
    }
}
