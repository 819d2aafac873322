//! RFID reader frame decoder.
//!
//! Wire format (ASCII reader output):
//! ```text
//! ┌──────────┬─────┬────────────────────┬─────────────┬─────┐
//! │ noise... │ STX │ tag id (10 bytes)  │ trailer...  │ ETX │
//! │          │ 02h │                    │ (ignored)   │ 03h │
//! └──────────┴─────┴────────────────────┴─────────────┴─────┘
//! ```
//!
//! Bytes are accumulated until ETX.  Everything before ETX is one frame;
//! the payload starts after the frame's first STX.  A frame without STX or
//! with fewer than ten payload bytes is dropped and counted, and decoding
//! carries on with the next byte.  The decoder works byte by byte, so the
//! result never depends on how the stream was chunked.

use core::fmt;

use heapless::Vec as HVec;
use log::warn;

use crate::error::FramingError;

/// Start of text.
pub const STX: u8 = 0x02;
/// End of text.
pub const ETX: u8 = 0x03;
/// Tag identifier length in bytes.
pub const TAG_LEN: usize = 10;

/// Longest run of bytes kept while waiting for ETX.
const MAX_PENDING: usize = 256;

// ───────────────────────────────────────────────────────────────
// Tag identifier
// ───────────────────────────────────────────────────────────────

/// Identifier read from an ear tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId([u8; TAG_LEN]);

impl TagId {
    pub const fn new(bytes: [u8; TAG_LEN]) -> Self {
        Self(bytes)
    }

    /// Exactly [`TAG_LEN`] bytes, or `None`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({self})")
    }
}

// ───────────────────────────────────────────────────────────────
// Decoder
// ───────────────────────────────────────────────────────────────

/// Streaming STX/ETX decoder.
#[derive(Debug, Default)]
pub struct TagFrameDecoder {
    pending: HVec<u8, MAX_PENDING>,
    framing_errors: u32,
    last_error: Option<FramingError>,
}

impl TagFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the identifiers completed by them, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<TagId> {
        let mut ids = Vec::new();
        for &b in data {
            if b == ETX {
                if let Some(id) = self.finish_frame() {
                    ids.push(id);
                }
                continue;
            }
            if self.pending.push(b).is_err() {
                self.reject(FramingError::Overflow);
                self.pending.clear();
                // Cannot fail on an empty buffer.
                let _ = self.pending.push(b);
            }
        }
        ids
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Frames dropped since construction.
    pub fn framing_errors(&self) -> u32 {
        self.framing_errors
    }

    pub fn last_error(&self) -> Option<FramingError> {
        self.last_error
    }

    /// Bytes buffered while waiting for ETX.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn finish_frame(&mut self) -> Option<TagId> {
        let result = match self.pending.iter().position(|&b| b == STX) {
            None => Err(FramingError::MissingStart),
            Some(start) => {
                let payload = &self.pending[start + 1..];
                if payload.len() < TAG_LEN {
                    Err(FramingError::ShortPayload(payload.len()))
                } else {
                    TagId::from_slice(&payload[..TAG_LEN]).ok_or(FramingError::ShortPayload(payload.len()))
                }
            }
        };
        self.pending.clear();

        match result {
            Ok(id) => Some(id),
            Err(e) => {
                self.reject(e);
                None
            }
        }
    }

    fn reject(&mut self, e: FramingError) {
        warn!("Tag reader: {e}");
        self.framing_errors = self.framing_errors.saturating_add(1);
        self.last_error = Some(e);
    }
}
