//! Default GPIO assignments (BCM numbering) for a feeding-box controller.
//!
//! The site document may override every pin per box.  These values are
//! what a box gets when its entry omits the field.

// ---------------------------------------------------------------------------
// Feed relays
// ---------------------------------------------------------------------------

/// Logical relay for feed A (drives the auger contactor input).
pub const FOOD_A_GPIO: u8 = 22;
/// Logical relay for feed B.
pub const FOOD_B_GPIO: u8 = 23;
/// Physical relay for feed A, switched together with the logical one.
pub const FOOD_PHYS_A_GPIO: u8 = 7;
/// Physical relay for feed B.
pub const FOOD_PHYS_B_GPIO: u8 = 8;

// ---------------------------------------------------------------------------
// Calibration push-buttons (active-low, pull-up)
// ---------------------------------------------------------------------------

pub const CALIB_BUTTON_A_GPIO: u8 = 25;
pub const CALIB_BUTTON_B_GPIO: u8 = 24;

// ---------------------------------------------------------------------------
// RFID reader
// ---------------------------------------------------------------------------

/// "Tag in range" line from the reader.  Pulled down: no tag when unwired.
pub const TAG_IN_RANGE_GPIO: u8 = 17;

// ---------------------------------------------------------------------------
// Site-wide
// ---------------------------------------------------------------------------

/// Heartbeat LED showing the controller is running and the store is reachable.
pub const RUNNING_LED_GPIO: u8 = 27;

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Poll interval for debounced inputs (buttons, tag-in-range), milliseconds.
pub const INPUT_POLL_MS: u64 = 250;
