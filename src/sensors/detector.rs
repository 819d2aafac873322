//! Animal presence detection.
//!
//! A [`Detector`] exposes one observable value, the [`Presence`] at the
//! box, and notifies subscribers only when it actually changes.
//!
//! ```text
//!   serial bytes ──▶ TagFrameDecoder ──▶ Tag(id) ─┐
//!                                                 ├──▶ Presence ──▶ listeners
//!   tag-in-range ──▶ DigitalInput ──▶ falling ────┘      (Absent wins)
//! ```
//!
//! Two implementations:
//!
//! - [`AnimalDetector`] reads a serial RFID reader and its "tag in range"
//!   line.
//! - [`ManualDetector`] is driven by hand on the bench.

use std::io::{ErrorKind, Read};
use std::time::Duration;

use embedded_hal::digital::InputPin;
use log::{debug, info, warn};

use crate::drivers::gpio::{DigitalInput, Pull};
use crate::observer::Listeners;
use crate::sensors::tag_codec::{TagFrameDecoder, TagId};

/// What the detector currently sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    #[default]
    Absent,
    Tag(TagId),
}

impl Presence {
    pub fn tag(&self) -> Option<&TagId> {
        match self {
            Self::Absent => None,
            Self::Tag(id) => Some(id),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// One capability interface for every kind of detector.
pub trait Detector {
    fn current(&self) -> &Presence;

    /// Process whatever arrived since the last call.  Returns the new
    /// presence when it differs from the one before the call; subscribers
    /// see every intermediate change.
    fn poll(&mut self, now: Duration) -> Option<Presence>;

    /// When polling next has an effect, if the detector knows.
    fn next_poll(&self) -> Option<Duration> {
        None
    }

    fn subscribe(&mut self, f: Box<dyn FnMut(&Presence)>);
}

/// Stores the observed value and fans out changes.
#[derive(Debug, Default)]
struct Observed {
    current: Presence,
    listeners: Listeners<Presence>,
}

impl Observed {
    fn set(&mut self, p: Presence) -> bool {
        if p == self.current {
            return false;
        }
        self.current = p;
        self.listeners.notify(&p);
        true
    }
}

// ───────────────────────────────────────────────────────────────
// Serial RFID reader
// ───────────────────────────────────────────────────────────────

/// Upper bound on reads per poll so a chatty port cannot stall the reactor.
const MAX_READS_PER_POLL: usize = 16;

/// RFID reader on a serial port plus its tag-in-range line.
///
/// The serial source must be non-blocking: `WouldBlock` and `TimedOut`
/// mean "nothing yet".
pub struct AnimalDetector<P, R> {
    tag_in_range: DigitalInput<P>,
    serial: R,
    decoder: TagFrameDecoder,
    observed: Observed,
}

impl<P: InputPin, R: Read> AnimalDetector<P, R> {
    /// `tag_in_range` is sampled every `poll_interval`.  The line is pulled
    /// down, so an unwired reader reads "no tag".
    pub fn new(tag_in_range: P, serial: R, poll_interval: Duration) -> Self {
        Self {
            tag_in_range: DigitalInput::new(tag_in_range, Pull::None, poll_interval, "tag in range"),
            serial,
            decoder: TagFrameDecoder::new(),
            observed: Observed::default(),
        }
    }

    pub fn decoder(&self) -> &TagFrameDecoder {
        &self.decoder
    }

    pub fn tag_in_range(&self) -> bool {
        self.tag_in_range.is_on()
    }

    fn read_serial(&mut self) -> Vec<TagId> {
        let mut ids = Vec::new();
        let mut buf = [0u8; 64];
        for _ in 0..MAX_READS_PER_POLL {
            match self.serial.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => ids.extend(self.decoder.feed(&buf[..n])),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("Tag reader: serial read failed: {e}");
                    break;
                }
            }
        }
        ids
    }
}

impl<P: InputPin, R: Read> Detector for AnimalDetector<P, R> {
    fn current(&self) -> &Presence {
        &self.observed.current
    }

    fn poll(&mut self, now: Duration) -> Option<Presence> {
        let before = self.observed.current;
        let ids = self.read_serial();

        if self.tag_in_range.poll(now) == Some(false) {
            // Physical absence beats anything decoded in the same pass.
            if !ids.is_empty() || self.decoder.pending_len() > 0 {
                debug!("Tag reader: dropping {} decoded id(s) on tag loss", ids.len());
            }
            self.decoder.reset();
            if self.observed.set(Presence::Absent) {
                info!("Tag reader: tag lost");
            }
        } else {
            for id in ids {
                if self.observed.set(Presence::Tag(id)) {
                    info!("Tag reader: read {id}");
                }
            }
        }

        (self.observed.current != before).then_some(self.observed.current)
    }

    fn next_poll(&self) -> Option<Duration> {
        self.tag_in_range.next_poll()
    }

    fn subscribe(&mut self, f: Box<dyn FnMut(&Presence)>) {
        self.observed.listeners.subscribe(f);
    }
}

// ───────────────────────────────────────────────────────────────
// Manual detector
// ───────────────────────────────────────────────────────────────

/// Detector set by hand (bench runs, tests).
#[derive(Debug, Default)]
pub struct ManualDetector {
    observed: Observed,
    reported: Presence,
}

impl ManualDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the detected value.  Subscribers are notified immediately;
    /// the next [`poll`](Detector::poll) reports the change.
    pub fn set_detected(&mut self, p: Presence) {
        self.observed.set(p);
    }
}

impl Detector for ManualDetector {
    fn current(&self) -> &Presence {
        &self.observed.current
    }

    fn poll(&mut self, _now: Duration) -> Option<Presence> {
        if self.observed.current == self.reported {
            return None;
        }
        self.reported = self.observed.current;
        Some(self.reported)
    }

    fn subscribe(&mut self, f: Box<dyn FnMut(&Presence)>) {
        self.observed.listeners.subscribe(f);
    }
}
