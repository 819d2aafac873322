//! Event sink adapters.
//!
//! [`LogEventSink`] writes every [`BoxEvent`] as one log line through the
//! `log` facade; whichever logger the host process installs decides where
//! it ends up.  [`RecordingSink`] keeps the events in memory for bench
//! diagnostics and tests.

use log::{info, warn};

use crate::app::events::BoxEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`BoxEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &BoxEvent) {
        match event {
            BoxEvent::Entered { box_id, animal } => {
                info!("VISIT | box={} animal={} entered", box_id, animal);
            }
            BoxEvent::Exited {
                box_id,
                animal,
                given,
            } => {
                info!(
                    "VISIT | box={} animal={} left | A={:.1}g B={:.1}g",
                    box_id, animal, given.a, given.b
                );
            }
            BoxEvent::DoseStarted {
                box_id,
                animal,
                dose,
            } => {
                info!(
                    "DOSE  | box={} animal={} | A={:.1}g B={:.1}g",
                    box_id, animal, dose.a, dose.b
                );
            }
            BoxEvent::FeedStopped { box_id, feed } => {
                info!("RELAY | box={} feed={} off", box_id, feed);
            }
            BoxEvent::CalibrationStarted { box_id, feed } => {
                info!("CALIB | box={} feed={}", box_id, feed);
            }
            BoxEvent::UnknownTag { box_id, tag } => {
                warn!("TAG   | box={} unknown tag {}", box_id, tag);
            }
            BoxEvent::DispensingRefused { box_id, reason } => {
                info!("HOLD  | box={} {}", box_id, reason);
            }
            BoxEvent::ParametersLoaded {
                box_id,
                defaults_created,
            } => {
                info!(
                    "PARAM | box={} loaded{}",
                    box_id,
                    if *defaults_created { " (defaults created)" } else { "" }
                );
            }
        }
    }
}

/// Sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<BoxEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events matching `pred`.
    pub fn count(&self, pred: impl Fn(&BoxEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &BoxEvent) {
        self.events.push(event.clone());
    }
}
