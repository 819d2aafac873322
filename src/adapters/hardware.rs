//! Simulated GPIO pin.
//!
//! [`SimPin`] implements the `embedded-hal` digital traits over a shared
//! level cell.  Bench runs and tests keep a [`PinLevel`] handle to watch an
//! output or to drive an input from outside the controller.  A pin can be
//! told to fail so the dumb-actuator error path is exercised.
//!
//! Real boards plug their own HAL pins into the same generic drivers; this
//! is the only pin implementation the crate ships.

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::digital::{Error, ErrorKind, ErrorType, InputPin, OutputPin};

/// Shared view of a simulated line.
#[derive(Debug, Clone, Default)]
pub struct PinLevel {
    high: Rc<Cell<bool>>,
    faulty: Rc<Cell<bool>>,
}

impl PinLevel {
    pub fn get(&self) -> bool {
        self.high.get()
    }

    pub fn set(&self, high: bool) {
        self.high.set(high);
    }

    /// Make every subsequent pin access fail (or succeed again).
    pub fn set_faulty(&self, faulty: bool) {
        self.faulty.set(faulty);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinError;

impl Error for SimPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// In-memory pin usable as either input or output.
#[derive(Debug, Clone, Default)]
pub struct SimPin {
    level: PinLevel,
}

impl SimPin {
    /// Low, healthy pin.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(high: bool) -> Self {
        let pin = Self::new();
        pin.level.set(high);
        pin
    }

    /// Handle sharing this pin's level.
    pub fn level(&self) -> PinLevel {
        self.level.clone()
    }

    fn check(&self) -> Result<(), SimPinError> {
        if self.level.faulty.get() {
            Err(SimPinError)
        } else {
            Ok(())
        }
    }
}

impl ErrorType for SimPin {
    type Error = SimPinError;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.check()?;
        self.level.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.check()?;
        self.level.set(true);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.check()?;
        Ok(self.level.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|h| !h)
    }
}
