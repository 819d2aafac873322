//! Fuzz target: `TagFrameDecoder::feed`
//!
//! Feeds arbitrary bytes, whole and split at the first byte, and checks
//! that both paths decode the same ids and the buffer stays bounded.
//!
//! cargo fuzz run fuzz_tag_decoder

#![no_main]

use feedbox::sensors::TagFrameDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut whole = TagFrameDecoder::new();
    let ids = whole.feed(data);
    assert!(whole.pending_len() <= 256, "pending buffer exceeds its bound");

    let split = data.first().map_or(0, |b| usize::from(*b) % (data.len() + 1));
    let mut chunked = TagFrameDecoder::new();
    let mut again = chunked.feed(&data[..split]);
    again.extend(chunked.feed(&data[split..]));
    assert_eq!(ids, again, "chunking changed the decoded ids");
    assert_eq!(whole.framing_errors(), chunked.framing_errors());

    whole.reset();
    assert_eq!(whole.pending_len(), 0);
});
