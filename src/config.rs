//! Site and box configuration.
//!
//! Two layers:
//!
//! - [`SiteConfig`] is the JSON document handed over at process start: one
//!   entry per box with its pin wiring and reader port, plus the site-wide
//!   heartbeat pin and store connection settings.  Omitted pins fall back
//!   to the defaults in [`crate::pins`].
//! - [`BoxParameters`] is the per-box feeding configuration held by the
//!   store.  It is refreshed every minute and never mutated by the feeding
//!   logic.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{BoxId, FeedAmounts};
use crate::pins;

// ───────────────────────────────────────────────────────────────
// Site document
// ───────────────────────────────────────────────────────────────

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub boxes: Vec<BoxHardwareConfig>,
    #[serde(default = "default_running_gpio")]
    pub running_gpio: u8,
    /// Connection settings, passed through to the store adapter.
    #[serde(flatten)]
    pub store: StoreSettings,
}

/// Store connection settings.  Opaque to the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    pub database_host: String,
    pub database_port: u16,
    pub database_name: String,
    pub database_user: String,
    pub database_pwd: String,
}

/// Wiring of one feeding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxHardwareConfig {
    pub id: BoxId,
    pub name: String,
    #[serde(default = "default_food_a")]
    pub gpio_food_a: u8,
    #[serde(default = "default_food_b")]
    pub gpio_food_b: u8,
    #[serde(default = "default_food_phys_a")]
    pub gpio_food_phys_a: u8,
    #[serde(default = "default_food_phys_b")]
    pub gpio_food_phys_b: u8,
    #[serde(default = "default_calib_a")]
    pub gpio_calib_button_a: u8,
    #[serde(default = "default_calib_b")]
    pub gpio_calib_button_b: u8,
    pub detector: ReaderConfig,
}

impl BoxHardwareConfig {
    /// Every pin this box claims, tag-in-range line included.
    pub fn pins(&self) -> [u8; 7] {
        [
            self.gpio_food_a,
            self.gpio_food_b,
            self.gpio_food_phys_a,
            self.gpio_food_phys_b,
            self.gpio_calib_button_a,
            self.gpio_calib_button_b,
            self.detector.gpio_tag_in_range,
        ]
    }
}

/// RFID reader connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderConfig {
    /// Serial device, e.g. `/dev/ttyUSB0`.
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_tag_in_range")]
    pub gpio_tag_in_range: u8,
}

fn default_running_gpio() -> u8 {
    pins::RUNNING_LED_GPIO
}
fn default_food_a() -> u8 {
    pins::FOOD_A_GPIO
}
fn default_food_b() -> u8 {
    pins::FOOD_B_GPIO
}
fn default_food_phys_a() -> u8 {
    pins::FOOD_PHYS_A_GPIO
}
fn default_food_phys_b() -> u8 {
    pins::FOOD_PHYS_B_GPIO
}
fn default_calib_a() -> u8 {
    pins::CALIB_BUTTON_A_GPIO
}
fn default_calib_b() -> u8 {
    pins::CALIB_BUTTON_B_GPIO
}
fn default_tag_in_range() -> u8 {
    pins::TAG_IN_RANGE_GPIO
}
fn default_baud_rate() -> u32 {
    9600
}

impl SiteConfig {
    /// Parse and validate a document.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| {
            log::error!("Config: {e}");
            ConfigError::Malformed
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the document at `path`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading site config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing site config {}", path.display()))
    }

    /// Reject documents that cannot describe a working site.
    ///
    /// A pin may only be claimed once across the whole site, since boxes
    /// share one GPIO bank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boxes.is_empty() {
            return Err(ConfigError::ValidationFailed("no boxes configured"));
        }

        let mut ids = HashSet::new();
        let mut used = HashSet::new();
        used.insert(self.running_gpio);

        for b in &self.boxes {
            if !ids.insert(b.id) {
                return Err(ConfigError::ValidationFailed("duplicate box id"));
            }
            if b.detector.port.is_empty() {
                return Err(ConfigError::ValidationFailed("reader port missing"));
            }
            for pin in b.pins() {
                if !used.insert(pin) {
                    return Err(ConfigError::ValidationFailed("pin assigned twice"));
                }
            }
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Box parameters (store-held)
// ───────────────────────────────────────────────────────────────

/// Time-of-day range during which dispensing is suppressed.
///
/// Both bounds are exclusive.  A window whose start is after its stop
/// spans midnight; equal bounds describe an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleWindow {
    pub start: NaiveTime,
    pub stop: NaiveTime,
}

impl IdleWindow {
    pub fn new(start: NaiveTime, stop: NaiveTime) -> Self {
        Self { start, stop }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.stop {
            t > self.start && t < self.stop
        } else {
            t > self.start || t < self.stop
        }
    }
}

/// Per-box feeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxParameters {
    /// Time of day at which a new quota day starts.
    pub new_day_time: NaiveTime,
    pub idle_windows: [Option<IdleWindow>; 2],
    /// Calibrated dispense rates, grams per second.
    pub food_speed: FeedAmounts,
    /// Relay on-time for a manual calibration run, seconds.
    pub calibration_time_secs: u32,
    /// Upper bound on a single dose (both feeds combined), grams.
    pub meal_minimum: f64,
    /// Grace period after tag loss before the visit is closed, seconds.
    pub detection_delay_secs: u32,
}

impl BoxParameters {
    pub fn calibration_time(&self) -> Duration {
        Duration::from_secs(u64::from(self.calibration_time_secs))
    }

    pub fn detection_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.detection_delay_secs))
    }

    /// True when `t` falls inside either idle window.
    pub fn is_idle_at(&self, t: NaiveTime) -> bool {
        self.idle_windows.iter().flatten().any(|w| w.contains(t))
    }
}

impl Default for BoxParameters {
    fn default() -> Self {
        Self {
            new_day_time: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or_default(),
            idle_windows: [None, None],
            food_speed: FeedAmounts::new(7.0, 7.0),
            calibration_time_secs: 120,
            meal_minimum: 100.0,
            detection_delay_secs: 30,
        }
    }
}
