//! Animal identification: RFID frame decoding and presence detection.

pub mod detector;
pub mod tag_codec;

pub use detector::{AnimalDetector, Detector, ManualDetector, Presence};
pub use tag_codec::{TagFrameDecoder, TagId};
