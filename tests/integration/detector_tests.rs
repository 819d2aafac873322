//! RFID reader tests: serial framing through `AnimalDetector` and the
//! tag-in-range line.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use feedbox::adapters::hardware::{PinLevel, SimPin};
use feedbox::sensors::tag_codec::{ETX, STX};
use feedbox::sensors::{AnimalDetector, Detector, Presence};

use crate::mock_hw::*;

type Reader = AnimalDetector<SimPin, SerialFeed>;

fn reader() -> (Reader, SerialFeed, PinLevel) {
    let line = SimPin::new();
    let level = line.level();
    let serial = SerialFeed::default();
    let det = AnimalDetector::new(line, serial.clone(), Duration::from_millis(250));
    (det, serial, level)
}

fn at(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

#[test]
fn frame_split_across_reads_is_decoded_once() {
    let (mut det, serial, level) = reader();
    level.set(true);
    let bytes = frame(&COW_TAG);

    serial.push(&bytes[..4]);
    assert_eq!(det.poll(at(0)), None);
    serial.push(&bytes[4..9]);
    assert_eq!(det.poll(at(50)), None);
    serial.push(&bytes[9..]);
    assert_eq!(det.poll(at(100)), Some(Presence::Tag(COW_TAG)));
    assert_eq!(det.decoder().framing_errors(), 0);

    // Same id again is not a change.
    serial.push_tag(&COW_TAG);
    assert_eq!(det.poll(at(150)), None);
}

#[test]
fn noise_between_frames_is_skipped() {
    let (mut det, serial, level) = reader();
    level.set(true);
    serial.push(b"\r\n??");
    serial.push(&[STX, b'1', b'2', ETX]); // short payload
    serial.push_tag(&OTHER_TAG);

    assert_eq!(det.poll(at(0)), Some(Presence::Tag(OTHER_TAG)));
    assert!(det.decoder().framing_errors() >= 1);
}

#[test]
fn falling_line_beats_frame_in_same_pass() {
    let (mut det, serial, level) = reader();
    level.set(true);
    serial.push_tag(&COW_TAG);
    det.poll(at(0));
    assert_eq!(det.current(), &Presence::Tag(COW_TAG));

    level.set(false);
    serial.push_tag(&OTHER_TAG);
    assert_eq!(det.poll(at(250)), Some(Presence::Absent));
    assert_eq!(det.decoder().pending_len(), 0);
}

#[test]
fn listeners_see_every_change_poll_reports_net() {
    let (mut det, serial, level) = reader();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    det.subscribe(Box::new(move |p| sink.borrow_mut().push(*p)));

    level.set(true);
    serial.push_tag(&COW_TAG);
    serial.push_tag(&OTHER_TAG);
    assert_eq!(det.poll(at(0)), Some(Presence::Tag(OTHER_TAG)));
    assert_eq!(
        *seen.borrow(),
        vec![Presence::Tag(COW_TAG), Presence::Tag(OTHER_TAG)]
    );
}

#[test]
fn line_sampled_on_its_interval() {
    let (mut det, serial, level) = reader();
    level.set(true);
    serial.push_tag(&COW_TAG);
    det.poll(at(0));
    assert_eq!(det.next_poll(), Some(at(250)));

    // Drop between samples: not seen until the next sample is due.
    level.set(false);
    assert_eq!(det.poll(at(100)), None);
    assert_eq!(det.poll(at(250)), Some(Presence::Absent));
}
