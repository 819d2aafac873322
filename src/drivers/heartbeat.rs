//! "Application running" LED.
//!
//! | State    | Pattern                      |
//! |----------|------------------------------|
//! | Running  | 1.5 s on every 3 s           |
//! | Stopped  | off (store unreachable)      |

use std::time::Duration;

use embedded_hal::digital::OutputPin;

use crate::drivers::gpio::DigitalOutput;

pub const BEAT_PERIOD: Duration = Duration::from_secs(3);
pub const BEAT_ON: Duration = Duration::from_millis(1500);

pub struct Heartbeat<P> {
    led: DigitalOutput<P>,
    next_beat: Option<Duration>,
}

impl<P: OutputPin> Heartbeat<P> {
    pub fn new(pin: P) -> Self {
        Self {
            led: DigitalOutput::new(pin, "running"),
            next_beat: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_beat.is_some()
    }

    pub fn is_lit(&self) -> bool {
        self.led.is_on()
    }

    /// Start beating at `now`.  No-op while already running.
    pub fn start(&mut self, now: Duration) {
        if self.next_beat.is_none() {
            self.next_beat = Some(now);
        }
    }

    /// Stop and turn the LED off.
    pub fn stop(&mut self) {
        self.next_beat = None;
        self.led.set(false);
    }

    pub fn poll(&mut self, now: Duration) {
        self.led.poll(now);
        if let Some(at) = self.next_beat {
            if now >= at {
                self.led.pulse(now, BEAT_ON);
                let mut next = at + BEAT_PERIOD;
                if next <= now {
                    // Fell behind; resume the rhythm from here.
                    next = now + BEAT_PERIOD;
                }
                self.next_beat = Some(next);
            }
        }
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.next_beat, self.led.pulse_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
