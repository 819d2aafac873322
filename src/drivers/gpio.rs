//! Digital lines over `embedded-hal` pins.
//!
//! - [`DigitalOutput`] tracks its logical state, supports timed pulses and
//!   toggling, and notifies subscribers on every transition.
//! - [`DigitalInput`] is polled on a fixed interval.  Re-sampling at that
//!   interval is the debounce: a bounce shorter than the interval is never
//!   seen.  Pull-up inputs are inverted so "on" means the contact is closed.
//!
//! Both are dumb actuators/sensors: a pin driver error is logged and the
//! logical state keeps tracking what was requested.
//!
//! Time is passed in as monotonic uptime; nothing here reads a clock.

use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use log::warn;

use crate::observer::Listeners;

// ───────────────────────────────────────────────────────────────
// Output
// ───────────────────────────────────────────────────────────────

pub struct DigitalOutput<P> {
    pin: P,
    label: &'static str,
    on: bool,
    pulse_until: Option<Duration>,
    listeners: Listeners<bool>,
}

impl<P: OutputPin> DigitalOutput<P> {
    /// Wrap `pin` and drive it low.
    pub fn new(pin: P, label: &'static str) -> Self {
        let mut out = Self {
            pin,
            label,
            on: false,
            pulse_until: None,
            listeners: Listeners::new(),
        };
        out.drive(false);
        out
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn subscribe(&mut self, f: impl FnMut(&bool) + 'static) {
        self.listeners.subscribe(f);
    }

    /// Set the line.  Cancels a running pulse.  Returns `true` if the state
    /// changed.
    pub fn set(&mut self, on: bool) -> bool {
        self.pulse_until = None;
        self.apply(on)
    }

    pub fn toggle(&mut self) -> bool {
        self.set(!self.on)
    }

    /// Switch on now and back off once `duration` has elapsed.  The reset
    /// happens in [`poll`](Self::poll).
    pub fn pulse(&mut self, now: Duration, duration: Duration) {
        self.apply(true);
        self.pulse_until = Some(now + duration);
    }

    /// When the running pulse ends, if any.
    pub fn pulse_deadline(&self) -> Option<Duration> {
        self.pulse_until
    }

    /// Expire a finished pulse.  Returns `true` if the line went off.
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.pulse_until {
            Some(until) if now >= until => {
                self.pulse_until = None;
                self.apply(false)
            }
            _ => false,
        }
    }

    fn apply(&mut self, on: bool) -> bool {
        if on == self.on {
            return false;
        }
        self.drive(on);
        self.on = on;
        self.listeners.notify(&on);
        true
    }

    fn drive(&mut self, on: bool) {
        let res = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = res {
            warn!("GPIO {}: write {} failed: {:?}", self.label, on, e);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Input
// ───────────────────────────────────────────────────────────────

/// Bias wiring of an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    /// Pulled up: the contact shorts to ground, so a low level reads "on".
    Up,
    Down,
}

pub struct DigitalInput<P> {
    pin: P,
    label: &'static str,
    pull: Pull,
    interval: Duration,
    next_sample: Option<Duration>,
    on: bool,
    listeners: Listeners<bool>,
}

impl<P: InputPin> DigitalInput<P> {
    /// Wrap `pin` and take the initial sample.  The first poll samples
    /// again immediately.
    pub fn new(pin: P, pull: Pull, interval: Duration, label: &'static str) -> Self {
        let mut input = Self {
            pin,
            label,
            pull,
            interval,
            next_sample: None,
            on: false,
            listeners: Listeners::new(),
        };
        input.on = input.sample().unwrap_or(false);
        input
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn pull(&self) -> Pull {
        self.pull
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn subscribe(&mut self, f: impl FnMut(&bool) + 'static) {
        self.listeners.subscribe(f);
    }

    /// Sample the line if the poll interval has elapsed.  Returns the new
    /// state on a transition.
    pub fn poll(&mut self, now: Duration) -> Option<bool> {
        if self.next_sample.is_some_and(|t| now < t) {
            return None;
        }
        self.next_sample = Some(now + self.interval);

        let on = self.sample()?;
        if on == self.on {
            return None;
        }
        self.on = on;
        self.listeners.notify(&on);
        Some(on)
    }

    /// When the next sample is due.
    pub fn next_poll(&self) -> Option<Duration> {
        self.next_sample
    }

    fn sample(&mut self) -> Option<bool> {
        match self.pin.is_high() {
            Ok(high) => Some(if self.pull == Pull::Up { !high } else { high }),
            Err(e) => {
                warn!("GPIO {}: read failed: {:?}", self.label, e);
                None
            }
        }
    }
}
