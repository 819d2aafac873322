//! Feeding-box controller, the application core of one box.
//!
//! ```text
//!   Detector ──presence──▶ ┌───────────────┐ ──▶ FeedRelay A/B
//!   calib buttons ───────▶ │ BoxController │ ──▶ StoreGateway
//!   TimerQueue ──due────▶  └───────────────┘ ──▶ EventSink
//! ```
//!
//! Every entry point runs to completion.  Waiting is expressed as entries
//! in the controller's own [`TimerQueue`]:
//!
//! | Timer               | Armed by                         | Effect            |
//! |---------------------|----------------------------------|-------------------|
//! | `ExitConfirm`       | tag lost with a visit open       | close the visit   |
//! | `DoseCheck`         | dose, deferral                   | dose check        |
//! | `StopFeed(feed)`    | dose, calibration                | relays off        |
//! | `RefreshParameters` | start (every 60 s)               | reload parameters |
//!
//! There is at most one pending dose check; arming a new one replaces the
//! old.  A calibration run does not cancel a pending dose check: that
//! check is refused while the relays are busy and the next trigger tries
//! again.

use std::time::Duration;

use chrono::NaiveDateTime;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{info, warn};

use crate::app::events::BoxEvent;
use crate::app::ports::{Ports, StoreGateway, TagLookup};
use crate::config::{BoxHardwareConfig, BoxParameters};
use crate::control::ration;
use crate::drivers::gpio::{DigitalInput, Pull};
use crate::drivers::relay::FeedRelay;
use crate::error::StoreError;
use crate::fsm::{BoxState, PresenceFsm, Session};
use crate::model::{AnimalAllocation, AnimalId, BoxId, Feed, FeedAmounts, MealRecord, MealRecordId};
use crate::pins;
use crate::safety::{DispenseConditions, DispenseGuard, Refusal};
use crate::scheduler::{TimerHandle, TimerQueue};
use crate::sensors::{Presence, TagId};

/// How often box parameters are reloaded.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// What a controller timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxTimer {
    ExitConfirm,
    DoseCheck,
    StopFeed(Feed),
    RefreshParameters,
}

/// Pins of one box.
pub struct BoxPins<O, I> {
    pub food_a: O,
    pub food_b: O,
    pub food_phys_a: O,
    pub food_phys_b: O,
    pub calib_a: I,
    pub calib_b: I,
}

fn idx(feed: Feed) -> usize {
    match feed {
        Feed::A => 0,
        Feed::B => 1,
    }
}

pub struct BoxController<O: OutputPin, I: InputPin> {
    id: BoxId,
    name: String,
    params: BoxParameters,
    relays: [FeedRelay<O>; 2],
    buttons: [DigitalInput<I>; 2],
    fsm: PresenceFsm,
    session: Option<Session>,
    guard: DispenseGuard,
    timers: TimerQueue<BoxTimer>,
    exit_timer: Option<TimerHandle>,
    dose_timer: Option<TimerHandle>,
    stop_timers: [Option<TimerHandle>; 2],
}

impl<O: OutputPin, I: InputPin> BoxController<O, I> {
    /// Build a box with default parameters and every relay off.
    /// Calibration buttons are pull-up inputs sampled every `poll_interval`.
    pub fn new(id: BoxId, name: impl Into<String>, pins: BoxPins<O, I>, poll_interval: Duration) -> Self {
        let name = name.into();
        Self {
            id,
            params: BoxParameters::default(),
            relays: [
                FeedRelay::new(Feed::A, pins.food_a, pins.food_phys_a),
                FeedRelay::new(Feed::B, pins.food_b, pins.food_phys_b),
            ],
            buttons: [
                DigitalInput::new(pins.calib_a, Pull::Up, poll_interval, "calib A"),
                DigitalInput::new(pins.calib_b, Pull::Up, poll_interval, "calib B"),
            ],
            fsm: PresenceFsm::new(name.clone()),
            name,
            session: None,
            guard: DispenseGuard::new(),
            timers: TimerQueue::new(),
            exit_timer: None,
            dose_timer: None,
            stop_timers: [None, None],
        }
    }

    pub fn from_config(config: &BoxHardwareConfig, wiring: BoxPins<O, I>) -> Self {
        Self::new(
            config.id,
            config.name.clone(),
            wiring,
            Duration::from_millis(pins::INPUT_POLL_MS),
        )
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn id(&self) -> BoxId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BoxState {
        self.fsm.state()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn parameters(&self) -> &BoxParameters {
        &self.params
    }

    pub fn relay_on(&self, feed: Feed) -> bool {
        self.relays[idx(feed)].is_on()
    }

    pub fn physical_relay_on(&self, feed: Feed) -> bool {
        self.relays[idx(feed)].is_physical_on()
    }

    pub fn relays_busy(&self) -> bool {
        self.relays.iter().any(FeedRelay::is_on)
    }

    /// When the exit-confirmation timer fires, if armed.
    pub fn exit_deadline(&self) -> Option<Duration> {
        self.exit_timer.and_then(|h| self.timers.deadline_of(h))
    }

    /// When the next dose check runs, if one is pending.
    pub fn dose_check_deadline(&self) -> Option<Duration> {
        self.dose_timer.and_then(|h| self.timers.deadline_of(h))
    }

    pub fn last_refusal(&self) -> Option<Refusal> {
        self.guard.last_refusal()
    }

    /// Earliest instant at which a timer fires or an input is sampled.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.buttons
            .iter()
            .filter_map(DigitalInput::next_poll)
            .chain(self.timers.next_deadline())
            .min()
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Force the relays off, load parameters and arm the periodic refresh.
    pub fn start(&mut self, ports: &mut Ports<'_>) {
        for relay in &mut self.relays {
            relay.set(false);
        }
        let now = ports.clock.uptime();
        self.timers
            .schedule_every(now + REFRESH_PERIOD, REFRESH_PERIOD, BoxTimer::RefreshParameters);
        info!("Box {}: started (id {})", self.name, self.id);
        self.refresh_parameters(ports);
    }

    /// Cancel every timer and switch all relays off.  The open visit, if
    /// any, is left unrecorded.
    pub fn shutdown(&mut self) {
        self.timers.clear();
        self.exit_timer = None;
        self.dose_timer = None;
        self.stop_timers = [None, None];
        for relay in &mut self.relays {
            relay.set(false);
        }
        info!("Box {}: shut down", self.name);
    }

    // ── Entry points ──────────────────────────────────────────

    /// React to a change of the detected presence.
    pub fn on_presence(&mut self, presence: &Presence, ports: &mut Ports<'_>) {
        match presence {
            Presence::Absent => self.on_tag_lost(ports),
            Presence::Tag(tag) => self.on_tag(tag, ports),
        }
    }

    /// Sample the calibration buttons.  A press starts a calibration run.
    pub fn poll_inputs(&mut self, ports: &mut Ports<'_>) {
        let now = ports.clock.uptime();
        for feed in Feed::ALL {
            if self.buttons[idx(feed)].poll(now) == Some(true) {
                self.calibrate(feed, ports);
            }
        }
    }

    /// Run every timer that is due.
    pub fn run_due(&mut self, ports: &mut Ports<'_>) {
        let now = ports.clock.uptime();
        while let Some((handle, timer)) = self.timers.pop_due(now) {
            match timer {
                BoxTimer::ExitConfirm => {
                    if self.exit_timer == Some(handle) {
                        self.exit_timer = None;
                    }
                    self.confirm_exit(ports);
                }
                BoxTimer::DoseCheck => {
                    if self.dose_timer == Some(handle) {
                        self.dose_timer = None;
                    }
                    self.check_dose(ports);
                }
                BoxTimer::StopFeed(feed) => {
                    self.stop_timers[idx(feed)] = None;
                    self.stop_feed(feed, ports);
                }
                BoxTimer::RefreshParameters => self.refresh_parameters(ports),
            }
        }
    }

    // ── Identification ────────────────────────────────────────

    fn on_tag_lost(&mut self, ports: &mut Ports<'_>) {
        if self.session.is_none() || self.exit_timer.is_some() {
            return;
        }
        let now = ports.clock.uptime();
        let delay = self.params.detection_delay();
        self.exit_timer = Some(self.timers.schedule_in(now, delay, BoxTimer::ExitConfirm));
        self.fsm.transition(BoxState::PendingExit, now);
        info!("Box {}: tag lost, exit in {}s", self.name, delay.as_secs());
    }

    fn on_tag(&mut self, tag: &TagId, ports: &mut Ports<'_>) {
        let now = ports.clock.uptime();
        if !ports.store.is_connected() {
            warn!("Box {}: store offline, ignoring tag {}", self.name, tag);
            ports.store.request_reconnect(now);
            return;
        }

        let animal = match ports.store.find_animal_by_tag(tag) {
            Ok(TagLookup::Animal(animal)) => animal,
            Ok(lookup) => {
                self.on_unresolved_tag(tag, lookup, ports);
                return;
            }
            Err(e) => {
                self.store_failed("tag lookup", e, ports);
                return;
            }
        };

        self.timers.cancel_slot(&mut self.exit_timer);

        match self.session.as_ref().map(|s| s.animal == animal) {
            Some(true) => {
                self.fsm.transition(BoxState::Present, now);
                info!("Box {}: animal {} still here", self.name, animal);
            }
            Some(false) => {
                if let Err(e) = self.close_session(ports) {
                    // Another animal is at the trough; its visit cannot wait.
                    self.store_failed("meal record on animal switch", e, ports);
                    if let Some(old) = self.session.take() {
                        warn!("Box {}: visit of {} lost", self.name, old.animal);
                    }
                    self.timers.cancel_slot(&mut self.dose_timer);
                    self.fsm.transition(BoxState::Idle, now);
                }
                self.open_session(animal, ports);
            }
            None => self.open_session(animal, ports),
        }

        self.check_dose(ports);
    }

    fn on_unresolved_tag(&mut self, tag: &TagId, lookup: TagLookup, ports: &mut Ports<'_>) {
        if lookup == TagLookup::Unknown {
            if let Err(e) = ports.store.record_unknown_tag(tag) {
                self.store_failed("unknown tag insert", e, ports);
                return;
            }
            warn!("Box {}: unknown tag {}, pending identification created", self.name, tag);
        } else {
            warn!("Box {}: tag {} not assigned to an animal", self.name, tag);
        }
        ports.sink.emit(&BoxEvent::UnknownTag {
            box_id: self.id,
            tag: *tag,
        });
    }

    fn open_session(&mut self, animal: AnimalId, ports: &mut Ports<'_>) {
        let now = ports.clock.uptime();
        let allocation = match ports.store.load_allocation(animal) {
            Ok(a) => a.map(AnimalAllocation::normalized),
            Err(e) => {
                // Reloaded by the first dose check that finds it missing.
                self.store_failed("allocation", e, ports);
                None
            }
        };
        if allocation.is_none() {
            warn!("Box {}: no allocation for animal {}", self.name, animal);
        }
        self.session = Some(Session::new(animal, ports.clock.local_now(), now, allocation));
        self.fsm.transition(BoxState::Present, now);
        info!("Box {}: animal {} entered", self.name, animal);
        ports.sink.emit(&BoxEvent::Entered {
            box_id: self.id,
            animal,
        });
    }

    // ── Exit ──────────────────────────────────────────────────

    fn confirm_exit(&mut self, ports: &mut Ports<'_>) {
        if self.session.is_none() {
            return;
        }
        if let Err(e) = self.close_session(ports) {
            // Keep the visit and try again after another grace period.
            let now = ports.clock.uptime();
            self.store_failed("meal record on exit", e, ports);
            let delay = self.params.detection_delay();
            self.exit_timer = Some(self.timers.schedule_in(now, delay, BoxTimer::ExitConfirm));
        }
    }

    /// Write the visit's history row and clear the session.
    fn close_session(&mut self, ports: &mut Ports<'_>) -> Result<(), StoreError> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        if !ports.store.is_connected() {
            return Err(StoreError::Disconnected);
        }
        let exit = ports.clock.local_now();
        save_record(self.id, &self.name, session, exit, &mut *ports.store)?;

        let animal = session.animal;
        let given = session.given;
        self.session = None;
        self.timers.cancel_slot(&mut self.dose_timer);
        self.fsm.transition(BoxState::Idle, ports.clock.uptime());
        info!(
            "Box {}: animal {} left after {:.0} g A / {:.0} g B",
            self.name, animal, given.a, given.b
        );
        ports.sink.emit(&BoxEvent::Exited {
            box_id: self.id,
            animal,
            given,
        });
        Ok(())
    }

    // ── Dose check ────────────────────────────────────────────

    fn check_dose(&mut self, ports: &mut Ports<'_>) {
        let now = ports.clock.uptime();
        let wall = ports.clock.local_now();
        let Some(animal) = self.session.as_ref().map(|s| s.animal) else {
            return;
        };
        if !ports.store.is_connected() {
            ports.store.request_reconnect(now);
            return;
        }

        if self.session.as_ref().is_some_and(|s| s.allocation.is_none()) {
            match ports.store.load_allocation(animal) {
                Ok(found) => {
                    if let Some(s) = self.session.as_mut() {
                        s.allocation = found.map(AnimalAllocation::normalized);
                    }
                }
                Err(e) => {
                    self.store_failed("allocation", e, ports);
                    return;
                }
            }
        }

        let Some(session) = self.session.as_ref() else {
            return;
        };
        let conditions = DispenseConditions {
            time_of_day: wall.time(),
            params: &self.params,
            allocation: session.allocation.as_ref(),
            exit_pending: self.exit_timer.is_some(),
            relays_busy: self.relays.iter().any(FeedRelay::is_on),
        };
        if let Err(reason) = self.guard.evaluate(&conditions) {
            self.emit_refusal(reason, ports);
            return;
        }
        let Some(alloc) = session.allocation else {
            return;
        };

        if ration::eating_too_fast(session.present_for(now), session.given, alloc.eat_speed) {
            self.defer(Refusal::TooSoon, ration::TOO_SOON_RETRY, ports);
            return;
        }

        let meals = ration::effective_meal_count(&alloc);
        let interval = ration::meal_interval(&alloc, meals);
        let day_start = ration::day_start(wall, self.params.new_day_time);

        let eaten_today = match ports.store.sum_food_since(animal, day_start) {
            Ok(v) => v,
            Err(e) => {
                self.store_failed("daily total", e, ports);
                self.emit_refusal(Refusal::StoreUnavailable, ports);
                return;
            }
        };
        let eaten_interval = match ports.store.sum_food_since(animal, wall - interval) {
            Ok(v) => v,
            Err(e) => {
                self.store_failed("interval total", e, ports);
                self.emit_refusal(Refusal::StoreUnavailable, ports);
                return;
            }
        };

        let dose = ration::compute_dose(
            &alloc,
            meals,
            eaten_today,
            eaten_interval,
            self.params.meal_minimum,
        );
        if dose.total() < ration::MIN_DOSE_GRAMS {
            self.defer(Refusal::BelowMinimum, ration::BELOW_MINIMUM_RETRY, ports);
            return;
        }

        self.dispense(animal, dose, ports);
    }

    fn dispense(&mut self, animal: AnimalId, dose: FeedAmounts, ports: &mut Ports<'_>) {
        let now = ports.clock.uptime();
        let wall = ports.clock.local_now();

        let mut longest = Duration::ZERO;
        for feed in Feed::ALL {
            let grams = dose.get(feed);
            if grams <= 0.0 {
                continue;
            }
            let run = ration::run_time(grams, self.params.food_speed.get(feed));
            self.relays[idx(feed)].set(true);
            let slot = &mut self.stop_timers[idx(feed)];
            self.timers.cancel_slot(slot);
            *slot = Some(self.timers.schedule_in(now, run, BoxTimer::StopFeed(feed)));
            longest = longest.max(run);
        }
        self.arm_dose_check(now, longest + ration::DOSE_MARGIN);

        info!(
            "Box {}: giving {:.1} g A / {:.1} g B to animal {}",
            self.name, dose.a, dose.b, animal
        );
        ports.sink.emit(&BoxEvent::DoseStarted {
            box_id: self.id,
            animal,
            dose,
        });

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.given += dose;
        match save_record(self.id, &self.name, session, wall, &mut *ports.store) {
            Ok(id) => session.record = Some(id),
            Err(e) => self.store_failed("meal record", e, ports),
        }
    }

    fn defer(&mut self, reason: Refusal, delay: Duration, ports: &mut Ports<'_>) {
        let now = ports.clock.uptime();
        self.guard.note(reason);
        self.arm_dose_check(now, delay);
        self.emit_refusal(reason, ports);
    }

    fn arm_dose_check(&mut self, now: Duration, delay: Duration) {
        self.timers.cancel_slot(&mut self.dose_timer);
        self.dose_timer = Some(self.timers.schedule_in(now, delay, BoxTimer::DoseCheck));
    }

    fn emit_refusal(&mut self, reason: Refusal, ports: &mut Ports<'_>) {
        ports.sink.emit(&BoxEvent::DispensingRefused {
            box_id: self.id,
            reason,
        });
    }

    // ── Relays ────────────────────────────────────────────────

    fn stop_feed(&mut self, feed: Feed, ports: &mut Ports<'_>) {
        if self.relays[idx(feed)].set(false) {
            ports.sink.emit(&BoxEvent::FeedStopped {
                box_id: self.id,
                feed,
            });
        }
    }

    fn calibrate(&mut self, feed: Feed, ports: &mut Ports<'_>) {
        if self.relays_busy() {
            info!("Box {}: calibration {} ignored, relays busy", self.name, feed);
            return;
        }
        let now = ports.clock.uptime();
        let run = self.params.calibration_time();
        self.relays[idx(feed)].set(true);
        let slot = &mut self.stop_timers[idx(feed)];
        self.timers.cancel_slot(slot);
        *slot = Some(self.timers.schedule_in(now, run, BoxTimer::StopFeed(feed)));
        info!("Box {}: calibrating feed {} for {}s", self.name, feed, run.as_secs());
        ports.sink.emit(&BoxEvent::CalibrationStarted {
            box_id: self.id,
            feed,
        });
    }

    // ── Parameters ────────────────────────────────────────────

    fn refresh_parameters(&mut self, ports: &mut Ports<'_>) {
        let now = ports.clock.uptime();
        if !ports.store.is_connected() {
            ports.store.request_reconnect(now);
            return;
        }

        let defaults_created = match ports.store.load_box_config(self.id) {
            Ok(Some(params)) => {
                self.params = params;
                false
            }
            Ok(None) => {
                let defaults = BoxParameters::default();
                if let Err(e) = ports.store.insert_default_box_config(self.id, &self.name, &defaults) {
                    self.store_failed("default box config", e, ports);
                }
                info!("Box {}: no configuration stored, using defaults", self.name);
                self.params = defaults;
                true
            }
            Err(e) => {
                self.store_failed("box config", e, ports);
                return;
            }
        };

        if let Err(e) = ports.store.touch_last_connected(self.id, ports.clock.local_now()) {
            self.store_failed("last connected", e, ports);
        }
        ports.sink.emit(&BoxEvent::ParametersLoaded {
            box_id: self.id,
            defaults_created,
        });

        // Retry a visit that was refused for configuration or idle reasons.
        if self.fsm.state() == BoxState::Present && self.dose_timer.is_none() && !self.relays_busy() {
            self.check_dose(ports);
        }
    }

    fn store_failed(&mut self, what: &str, e: StoreError, ports: &mut Ports<'_>) {
        warn!("Box {}: {} failed: {}", self.name, what, e);
        ports.store.request_reconnect(ports.clock.uptime());
    }
}

/// Write the visit's history row: update the open row, or insert one when
/// there is none or the open row has disappeared from the store.
fn save_record(
    box_id: BoxId,
    name: &str,
    session: &Session,
    exit: NaiveDateTime,
    store: &mut dyn StoreGateway,
) -> Result<MealRecordId, StoreError> {
    if let Some(id) = session.record {
        match store.update_meal_record(id, session.given, exit) {
            Ok(()) => return Ok(id),
            Err(StoreError::MissingRow) => {
                warn!(
                    "Box {name}: meal record {} of animal {} is gone, inserting a new one",
                    id.0, session.animal
                );
            }
            Err(e) => return Err(e),
        }
    }
    store.insert_meal_record(&MealRecord {
        animal: session.animal,
        box_id,
        given: session.given,
        entry: session.entry_time,
        exit,
    })
}

impl<O: OutputPin, I: InputPin> Drop for BoxController<O, I> {
    fn drop(&mut self) {
        for relay in &mut self.relays {
            relay.set(false);
        }
    }
}
