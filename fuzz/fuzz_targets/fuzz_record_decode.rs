//! Fuzz target: ring record decoding and buffer operations
//!
//! Interprets the input as a stream of packet-buffer operations and raw
//! record words.  Asserts that unpacking arbitrary words never panics,
//! that anything it accepts re-encodes within `MAX_ENCODED_LEN`, and that
//! the arena never reports more words in use than it holds.
//!
//! cargo fuzz run fuzz_record_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use terranode::ring::{PacketBuffer, packet};
use terranode::wire::{self, MAX_ENCODED_LEN};

fuzz_target!(|data: &[u8]| {
    let words: Vec<u32> = data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    if let Ok(message) = packet::unpack(&words) {
        let mut buf = [0u8; MAX_ENCODED_LEN];
        let len = wire::encode(&message, &mut buf).expect("decoded message must encode");
        assert_eq!(len, wire::encoded_len(&message));
    }

    let ring = PacketBuffer::<64>::new(data.first().is_some_and(|b| b & 1 == 1));
    for &op in data {
        let words = usize::from(op >> 2) % 8;
        match op & 3 {
            0 | 1 => {
                if let Some(mut h) = ring.allocate(words) {
                    h.write_words(0, &vec![u32::from(op); words]);
                    if op & 1 == 0 {
                        ring.commit(h);
                    }
                }
            }
            _ => {
                if let Some(rec) = ring.claim() {
                    let mut out = [0u32; 64];
                    let n = rec.copy_payload(&mut out);
                    assert!(out[..n].iter().all(|&w| w == out[0]), "torn record");
                    ring.free(rec);
                }
            }
        }
        assert!(ring.used_words() <= ring.capacity());
    }
});
