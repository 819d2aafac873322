//! Feed relay pair.
//!
//! Each feed is switched through two outputs that always move together:
//! the logical relay read by the box electronics and the physical relay
//! driving the auger contactor.
//!
//! ## Safety contract
//!
//! Never on while another dose or calibration run is in flight for the
//! same box.  Enforced by the dispense guard; this driver is a dumb
//! actuator.

use embedded_hal::digital::OutputPin;
use log::info;

use crate::drivers::gpio::DigitalOutput;
use crate::model::Feed;

pub struct FeedRelay<P> {
    feed: Feed,
    logical: DigitalOutput<P>,
    physical: DigitalOutput<P>,
}

impl<P: OutputPin> FeedRelay<P> {
    pub fn new(feed: Feed, logical: P, physical: P) -> Self {
        let (l, p) = match feed {
            Feed::A => ("food A", "food phys A"),
            Feed::B => ("food B", "food phys B"),
        };
        Self {
            feed,
            logical: DigitalOutput::new(logical, l),
            physical: DigitalOutput::new(physical, p),
        }
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }

    /// Logical relay state.
    pub fn is_on(&self) -> bool {
        self.logical.is_on()
    }

    pub fn is_physical_on(&self) -> bool {
        self.physical.is_on()
    }

    /// Switch both relays.  Returns `true` if the logical relay changed.
    pub fn set(&mut self, on: bool) -> bool {
        let changed = self.logical.set(on);
        self.physical.set(on);
        if changed {
            info!("Relay {}: {}", self.feed, if on { "ON" } else { "OFF" });
        }
        changed
    }

    pub fn subscribe(&mut self, f: impl FnMut(&bool) + 'static) {
        self.logical.subscribe(f);
    }
}
