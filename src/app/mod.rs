//! Application core: feeding logic of one box, no direct I/O.
//!
//! The [`controller`] holds the visit state machine and rationing rules.
//! All interaction with the herd database, the clock and event consumers
//! happens through the **port traits** in [`ports`]; pins reach it as
//! generic `embedded-hal` types, keeping this layer testable on the host.

pub mod controller;
pub mod events;
pub mod ports;

pub use controller::{BoxController, BoxPins, BoxTimer};
pub use events::BoxEvent;
pub use ports::{Clock, EventSink, Ports, StoreGateway, TagLookup};
