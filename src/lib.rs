//! FeedBox: RFID-driven concentrate feeding controller.
//!
//! Hexagonal layout:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  MemoryStore     LogEventSink    SystemClock    SimPin         │
//! │  (StoreGateway)  (EventSink)     (Clock)        (embedded-hal) │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        BoxController (one per feeding box)             │    │
//! │  │  presence FSM · dispense guard · ration math           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Drivers (relays, inputs, heartbeat) · Sensors (RFID reader)   │
//! │  TimerQueue · Site reactor                                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Process bootstrap (opening serial ports, claiming GPIO lines, installing
//! a logger, connecting the database) belongs to the host binary.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod model;
pub mod observer;
pub mod pins;
pub mod runtime;
pub mod safety;
pub mod scheduler;
pub mod sensors;

pub use error::{Error, Result};
