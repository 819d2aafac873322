//! Unified error types for the feeding-box controller.
//!
//! Subsystems report their own error types: the store port returns
//! [`StoreError`], the tag decoder records [`FramingError`]s and the site
//! document yields [`ConfigError`].  Each converts into the crate-level
//! [`Error`] returned at the library boundary (e.g.
//! [`SiteConfig::from_json`](crate::config::SiteConfig::from_json)).  All
//! variants are `Copy`.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Error returned at the library boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The storage collaborator failed or is unreachable.
    Store(StoreError),
    /// A serial frame from the tag reader was malformed.
    Framing(FramingError),
    /// The site configuration document is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Framing(e) => write!(f, "framing: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`StoreGateway`](crate::app::ports::StoreGateway).
///
/// Every variant is transient from the controller's point of view: the
/// operation is abandoned for this cycle and a reconnect is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// No open connection to the backend.
    Disconnected,
    /// The backend rejected or failed the statement.
    QueryFailed(&'static str),
    /// A row that must exist (e.g. the open meal record) is gone.
    MissingRow,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "not connected"),
            Self::QueryFailed(what) => write!(f, "{what} query failed"),
            Self::MissingRow => write!(f, "row not found"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Framing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// ETX seen but the frame carried no STX.
    MissingStart,
    /// Fewer payload bytes than a tag identifier after STX.
    ShortPayload(usize),
    /// No ETX before the pending buffer filled up.
    Overflow,
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStart => write!(f, "start of text not found"),
            Self::ShortPayload(n) => write!(f, "payload too short ({n} bytes)"),
            Self::Overflow => write!(f, "frame buffer overflow"),
        }
    }
}

impl std::error::Error for FramingError {}

impl From<FramingError> for Error {
    fn from(e: FramingError) -> Self {
        Self::Framing(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The document is not valid JSON for the expected shape.
    Malformed,
    /// A field failed validation.  The `&'static str` names the rule.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed document"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result aliases
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Result of a storage operation.
pub type StoreResult<T> = core::result::Result<T, StoreError>;
