//! Site reactor.
//!
//! One thread drives every box of a site:
//!
//! ```text
//!   loop {
//!       store health ─▶ reconnect every 30 s while down, heartbeat on/off
//!       heartbeat.poll
//!       for each box {
//!           detector.poll ─▶ controller.on_presence
//!           controller.poll_inputs          (calibration buttons)
//!           controller.run_due              (relay stops, dose checks, ...)
//!       }
//!       sleep until the next deadline (at most one tick)
//!   }
//! ```
//!
//! Boxes share the store, the clock and the event sink, and nothing else.
//! Every callback runs to completion, so no locking is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use log::{info, warn};

use crate::app::controller::BoxController;
use crate::app::ports::{Clock, EventSink, Ports, StoreGateway};
use crate::drivers::heartbeat::Heartbeat;
use crate::sensors::Detector;

/// Reconnect retry period while the store is down.
pub const STORE_RETRY_PERIOD: Duration = Duration::from_secs(30);

/// Longest sleep between two passes.  Serial input has no deadline of its
/// own, so the loop never sleeps longer than this.
pub const TICK: Duration = Duration::from_millis(50);

/// A detector and the controller it feeds.
pub struct FeedingBox<O: OutputPin, I: InputPin> {
    pub detector: Box<dyn Detector>,
    pub controller: BoxController<O, I>,
}

pub struct Site<S, C, K, O: OutputPin, I: InputPin> {
    boxes: Vec<FeedingBox<O, I>>,
    store: S,
    clock: C,
    sink: K,
    heartbeat: Option<Heartbeat<O>>,
    next_store_retry: Option<Duration>,
    store_up: bool,
}

impl<S, C, K, O, I> Site<S, C, K, O, I>
where
    S: StoreGateway,
    C: Clock,
    K: EventSink,
    O: OutputPin,
    I: InputPin,
{
    pub fn new(store: S, clock: C, sink: K) -> Self {
        Self {
            boxes: Vec::new(),
            store,
            clock,
            sink,
            heartbeat: None,
            next_store_retry: None,
            store_up: false,
        }
    }

    /// Attach the "application running" LED.
    pub fn with_heartbeat(mut self, led: O) -> Self {
        self.heartbeat = Some(Heartbeat::new(led));
        self
    }

    pub fn add_box(&mut self, detector: Box<dyn Detector>, controller: BoxController<O, I>) {
        self.boxes.push(FeedingBox {
            detector,
            controller,
        });
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn boxes(&self) -> &[FeedingBox<O, I>] {
        &self.boxes
    }

    pub fn boxes_mut(&mut self) -> &mut [FeedingBox<O, I>] {
        &mut self.boxes
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn heartbeat(&self) -> Option<&Heartbeat<O>> {
        self.heartbeat.as_ref()
    }

    // ── Reactor ───────────────────────────────────────────────

    /// Start every box: relays off, parameters loaded, refresh armed.
    pub fn start(&mut self) {
        info!("Site: starting {} box(es)", self.boxes.len());
        self.check_store();
        let Self {
            boxes,
            store,
            clock,
            sink,
            ..
        } = self;
        for b in boxes.iter_mut() {
            let mut ports = Ports::new(&mut *store, &*clock, &mut *sink);
            b.controller.start(&mut ports);
        }
    }

    /// One pass over the store, the heartbeat and every box.
    pub fn run_once(&mut self) {
        let now = self.clock.uptime();
        self.check_store();
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.poll(now);
        }

        let Self {
            boxes,
            store,
            clock,
            sink,
            ..
        } = self;
        for b in boxes.iter_mut() {
            let mut ports = Ports::new(&mut *store, &*clock, &mut *sink);
            if let Some(presence) = b.detector.poll(now) {
                b.controller.on_presence(&presence, &mut ports);
            }
            b.controller.poll_inputs(&mut ports);
            b.controller.run_due(&mut ports);
        }
    }

    /// Earliest deadline over every box, the heartbeat and the store retry.
    pub fn next_wakeup(&self) -> Option<Duration> {
        self.boxes
            .iter()
            .flat_map(|b| [b.controller.next_deadline(), b.detector.next_poll()])
            .chain([
                self.heartbeat.as_ref().and_then(Heartbeat::next_deadline),
                self.next_store_retry,
            ])
            .flatten()
            .min()
    }

    /// Run until `stop` is set, then shut down.
    pub fn run(&mut self, stop: &AtomicBool) {
        self.start();
        while !stop.load(Ordering::Relaxed) {
            self.run_once();
            let now = self.clock.uptime();
            let sleep = self
                .next_wakeup()
                .map_or(TICK, |at| at.saturating_sub(now).min(TICK));
            if !sleep.is_zero() {
                thread::sleep(sleep);
            }
        }
        self.shutdown();
    }

    /// Switch every relay and the heartbeat off.
    pub fn shutdown(&mut self) {
        for b in &mut self.boxes {
            b.controller.shutdown();
        }
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.stop();
        }
        info!("Site: stopped");
    }

    fn check_store(&mut self) {
        let now = self.clock.uptime();
        if self.store.is_connected() {
            if !self.store_up {
                info!("Site: store connected");
            }
            self.store_up = true;
            self.next_store_retry = None;
            if let Some(hb) = self.heartbeat.as_mut() {
                hb.start(now);
            }
            return;
        }

        if self.store_up || self.next_store_retry.is_none() {
            warn!("Site: store connection lost");
            if let Some(hb) = self.heartbeat.as_mut() {
                hb.stop();
            }
        }
        self.store_up = false;
        if self.next_store_retry.is_none_or(|at| now >= at) {
            self.store.request_reconnect(now);
            self.next_store_retry = Some(now + STORE_RETRY_PERIOD);
        }
    }
}
