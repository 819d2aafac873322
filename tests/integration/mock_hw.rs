//! Mock hardware and store rig for integration tests.
//!
//! Wires one [`BoxController`] to simulated pins, an in-memory store, a
//! manual clock and a recording sink, and steps time the way the site
//! reactor does.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::rc::Rc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};

use feedbox::adapters::hardware::{PinLevel, SimPin};
use feedbox::adapters::log_sink::RecordingSink;
use feedbox::adapters::memory_store::MemoryStore;
use feedbox::adapters::time::ManualClock;
use feedbox::app::{BoxController, BoxEvent, BoxPins, Ports};
use feedbox::model::{AnimalAllocation, AnimalId, BoxId, Feed, FeedAmounts};
use feedbox::sensors::tag_codec::{ETX, STX};
use feedbox::sensors::{Presence, TagId};

pub const BOX: BoxId = BoxId(1);
pub const COW: AnimalId = AnimalId(7);
pub const OTHER_COW: AnimalId = AnimalId(8);
pub const COW_TAG: TagId = TagId::new(*b"0000000007");
pub const OTHER_TAG: TagId = TagId::new(*b"0000000008");
pub const STRAY_TAG: TagId = TagId::new(*b"9999999999");

/// Reactor step used by [`Rig::advance`].
pub const STEP: Duration = Duration::from_millis(50);

pub fn wall(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 10)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

pub fn allocation(a: f64, b: f64) -> AnimalAllocation {
    AnimalAllocation::new(FeedAmounts::new(a, b), 0, 0, 6.0)
}

// ── Pin handles ───────────────────────────────────────────────

#[allow(dead_code)]
pub struct Levels {
    pub food_a: PinLevel,
    pub food_b: PinLevel,
    pub phys_a: PinLevel,
    pub phys_b: PinLevel,
    pub calib_a: PinLevel,
    pub calib_b: PinLevel,
}

pub fn box_pins() -> (BoxPins<SimPin, SimPin>, Levels) {
    let pins = BoxPins {
        food_a: SimPin::new(),
        food_b: SimPin::new(),
        food_phys_a: SimPin::new(),
        food_phys_b: SimPin::new(),
        // Pull-up buttons idle high.
        calib_a: SimPin::with_level(true),
        calib_b: SimPin::with_level(true),
    };
    let levels = Levels {
        food_a: pins.food_a.level(),
        food_b: pins.food_b.level(),
        phys_a: pins.food_phys_a.level(),
        phys_b: pins.food_phys_b.level(),
        calib_a: pins.calib_a.level(),
        calib_b: pins.calib_b.level(),
    };
    (pins, levels)
}

// ── Serial port ───────────────────────────────────────────────

/// Non-blocking byte source shared between the test and a detector.
#[derive(Clone, Default)]
pub struct SerialFeed(Rc<RefCell<VecDeque<u8>>>);

#[allow(dead_code)]
impl SerialFeed {
    pub fn push(&self, bytes: &[u8]) {
        self.0.borrow_mut().extend(bytes);
    }

    pub fn push_tag(&self, tag: &TagId) {
        self.push(&frame(tag));
    }
}

impl Read for SerialFeed {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut q = self.0.borrow_mut();
        if q.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(q.len());
        for (dst, src) in buf.iter_mut().zip(q.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

pub fn frame(tag: &TagId) -> Vec<u8> {
    let mut f = vec![STX];
    f.extend_from_slice(tag.as_bytes());
    f.push(ETX);
    f
}

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub controller: BoxController<SimPin, SimPin>,
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub sink: RecordingSink,
    pub levels: Levels,
}

#[allow(dead_code)]
impl Rig {
    /// Box 1 at 10:00 with default parameters stored and cow 7 allotted
    /// 3000 g of each feed.
    pub fn new() -> Self {
        let mut store = MemoryStore::new();
        store.set_box_config(BOX, "Box 1", Default::default());
        store.assign_tag(COW_TAG, COW);
        store.set_allocation(COW, allocation(3000.0, 3000.0));
        store.assign_tag(OTHER_TAG, OTHER_COW);
        store.set_allocation(OTHER_COW, allocation(2000.0, 1000.0));
        Self::with_store(store)
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let (pins, levels) = box_pins();
        Self {
            controller: BoxController::new(BOX, "Box 1", pins, Duration::from_millis(250)),
            store,
            clock: ManualClock::new(wall(10, 0)),
            sink: RecordingSink::new(),
            levels,
        }
    }

    pub fn with_ports<R>(
        &mut self,
        f: impl FnOnce(&mut BoxController<SimPin, SimPin>, &mut Ports<'_>) -> R,
    ) -> R {
        let mut ports = Ports::new(&mut self.store, &self.clock, &mut self.sink);
        f(&mut self.controller, &mut ports)
    }

    pub fn start(&mut self) {
        self.with_ports(|c, p| c.start(p));
    }

    pub fn started() -> Self {
        let mut rig = Self::new();
        rig.start();
        rig.sink.clear();
        rig
    }

    pub fn present(&mut self, tag: TagId) {
        self.with_ports(|c, p| c.on_presence(&Presence::Tag(tag), p));
    }

    pub fn absent(&mut self) {
        self.with_ports(|c, p| c.on_presence(&Presence::Absent, p));
    }

    /// Step the clock by `d` in reactor-sized increments, polling inputs
    /// and running due timers after each step.
    pub fn advance(&mut self, d: Duration) {
        let target = self.clock_uptime() + d;
        while self.clock_uptime() < target {
            let step = STEP.min(target - self.clock_uptime());
            self.clock.advance(step);
            self.with_ports(|c, p| {
                c.poll_inputs(p);
                c.run_due(p);
            });
        }
    }

    pub fn clock_uptime(&self) -> Duration {
        use feedbox::app::Clock;
        self.clock.uptime()
    }

    pub fn relay(&self, feed: Feed) -> bool {
        self.controller.relay_on(feed)
    }

    pub fn doses(&self) -> Vec<FeedAmounts> {
        self.sink
            .events
            .iter()
            .filter_map(|e| match e {
                BoxEvent::DoseStarted { dose, .. } => Some(*dose),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&BoxEvent) -> bool) -> usize {
        self.sink.count(pred)
    }
}
