//! Presence state machine of one feeding box.
//!
//! ```text
//!                 tag resolved to animal
//!        ┌──────┐ ─────────────────────▶ ┌─────────┐
//!        │ Idle │                        │ Present │◀──┐
//!        └──────┘ ◀───────────────────── └─────────┘   │ same animal
//!            ▲      other animal / shut       │         │ seen again
//!            │                     tag lost   ▼         │
//!            │ exit confirmed           ┌─────────────┐ │
//!            └───────────────────────── │ PendingExit │─┘
//!                                       └─────────────┘
//! ```
//!
//! The controller owns the side effects (relays, store, timers); this
//! module only validates and logs transitions and remembers when the
//! current state was entered.

pub mod session;

use core::fmt;
use std::time::Duration;

use log::info;

pub use session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxState {
    /// No animal.
    Idle,
    /// Animal identified; dispensing or between doses.
    Present,
    /// Tag lost; the exit-confirmation timer is running.
    PendingExit,
}

impl BoxState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Present => "Present",
            Self::PendingExit => "PendingExit",
        }
    }

    /// Whether `self -> next` is an edge of the diagram above.
    pub fn can_move_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Present)
                | (Self::Present, Self::PendingExit | Self::Idle)
                | (Self::PendingExit, Self::Present | Self::Idle)
        )
    }
}

impl fmt::Display for BoxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current state plus the uptime at which it was entered.
#[derive(Debug, Clone)]
pub struct PresenceFsm {
    label: String,
    state: BoxState,
    entered_at: Duration,
}

impl PresenceFsm {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: BoxState::Idle,
            entered_at: Duration::ZERO,
        }
    }

    pub fn state(&self) -> BoxState {
        self.state
    }

    pub fn time_in_state(&self, now: Duration) -> Duration {
        now.saturating_sub(self.entered_at)
    }

    /// Move to `next`.  Returns `false` when already there.
    pub fn transition(&mut self, next: BoxState, now: Duration) -> bool {
        if next == self.state {
            return false;
        }
        debug_assert!(
            self.state.can_move_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        info!("Box {}: {} -> {}", self.label, self.state, next);
        self.state = next;
        self.entered_at = now;
        true
    }
}
