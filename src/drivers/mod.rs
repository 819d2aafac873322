//! Output and input drivers over `embedded-hal` digital pins.

pub mod gpio;
pub mod heartbeat;
pub mod relay;
