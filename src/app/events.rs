//! Outbound box events.
//!
//! The [`BoxController`](super::controller::BoxController) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on the
//! other side decide what to do with them: log them, count them, assert
//! on them in tests.

use crate::model::{AnimalId, BoxId, Feed, FeedAmounts};
use crate::safety::Refusal;
use crate::sensors::TagId;

/// Structured events emitted by a feeding box.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxEvent {
    /// A new visit started.
    Entered { box_id: BoxId, animal: AnimalId },

    /// A visit was closed and its history row written.
    Exited {
        box_id: BoxId,
        animal: AnimalId,
        given: FeedAmounts,
    },

    /// Relays switched on for a dose.
    DoseStarted {
        box_id: BoxId,
        animal: AnimalId,
        dose: FeedAmounts,
    },

    /// One feed's relays went off.
    FeedStopped { box_id: BoxId, feed: Feed },

    /// A calibration run started on one feed.
    CalibrationStarted { box_id: BoxId, feed: Feed },

    /// A tag without an animal was seen.
    UnknownTag { box_id: BoxId, tag: TagId },

    /// A dose check ended without dispensing.
    DispensingRefused { box_id: BoxId, reason: Refusal },

    /// Box parameters were (re)loaded from the store.
    ParametersLoaded { box_id: BoxId, defaults_created: bool },
}
