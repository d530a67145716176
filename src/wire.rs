//! Over-the-air wire encoder.
//!
//! Every frame is a CBOR map with exactly two entries, written in fixed
//! order:
//!
//! ```text
//! {
//!   "type": uint,                    // 0 = telemetry, 1 = node status
//!   "data": {                        // field order fixed per type
//!     "timestamp": uint, "temperature": uint, "humidity": uint, "pressure": uint
//!   | "timestamp": uint, "uptime": uint, "status": uint
//!   }
//! }
//! ```
//!
//! Maps carry definite-length headers and integers use their shortest
//! encoding, so a given message always produces the same bytes.  The
//! encoder writes into a caller-supplied slice and never allocates.

use core::fmt;

use log::debug;
use minicbor::Encoder;
use minicbor::encode::write::Cursor;

use crate::messages::{MessageKind, NodeStatus, OutgoingMessage, TelemetrySample};

const KEY_TYPE: &str = "type";
const KEY_DATA: &str = "data";

const TELEMETRY_FIELDS: [&str; 4] = ["timestamp", "temperature", "humidity", "pressure"];
const NODE_STATUS_FIELDS: [&str; 3] = ["timestamp", "uptime", "status"];

/// Largest encoding of a `u32` (major type 0 with a 4-byte argument).
const MAX_UINT_LEN: usize = 5;

/// Worst-case encoded size of the largest message type.
/// The egress scratch buffer is sized from this.
pub const MAX_ENCODED_LEN: usize = {
    let telemetry = frame_overhead() + fields_max_len(&TELEMETRY_FIELDS);
    let status = frame_overhead() + fields_max_len(&NODE_STATUS_FIELDS);
    if telemetry > status { telemetry } else { status }
};

/// Encoder failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The destination cannot hold the next CBOR atom.
    BufferTooSmall,
    /// The supplied tag does not name a known message type.
    UnknownType(u32),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::UnknownType(tag) => write!(f, "unknown message type {tag}"),
        }
    }
}

impl<E> From<minicbor::encode::Error<E>> for EncodeError {
    fn from(_: minicbor::encode::Error<E>) -> Self {
        // The slice cursor only fails when it runs out of room.
        Self::BufferTooSmall
    }
}

/// Serialize `message` into `buffer`, returning the number of bytes written.
///
/// On failure nothing in `buffer` is usable: the slice is zeroed and no
/// length is returned.
pub fn encode(message: &OutgoingMessage, buffer: &mut [u8]) -> Result<usize, EncodeError> {
    match write_frame(message, buffer) {
        Ok(len) => {
            debug!("CBOR encoding successful, size: {}", len);
            Ok(len)
        }
        Err(e) => {
            buffer.fill(0);
            Err(e)
        }
    }
}

/// Serialize `message` under an externally supplied raw `tag`.
///
/// Used where the tag arrives separately from the payload.  A tag that is
/// unknown, or that names a different kind than `message`, fails closed
/// with [`EncodeError::UnknownType`].
pub fn encode_tagged(
    tag: u32,
    message: &OutgoingMessage,
    buffer: &mut [u8],
) -> Result<usize, EncodeError> {
    match MessageKind::from_tag(tag) {
        Some(kind) if kind == message.kind() => encode(message, buffer),
        _ => Err(EncodeError::UnknownType(tag)),
    }
}

/// Exact number of bytes [`encode`] produces for `message`.
pub fn encoded_len(message: &OutgoingMessage) -> usize {
    let values = match message {
        OutgoingMessage::Telemetry(t) => {
            uint_len(t.timestamp) + uint_len(t.temperature) + uint_len(t.humidity) + uint_len(t.pressure)
        }
        OutgoingMessage::NodeStatus(s) => {
            uint_len(s.timestamp) + uint_len(s.uptime) + uint_len(s.status.ordinal())
        }
    };
    let keys = match message.kind() {
        MessageKind::Telemetry => keys_len(&TELEMETRY_FIELDS),
        MessageKind::NodeStatus => keys_len(&NODE_STATUS_FIELDS),
    };
    frame_overhead() + keys + values
}

// ── Internal ──────────────────────────────────────────────────

fn write_frame(message: &OutgoingMessage, buffer: &mut [u8]) -> Result<usize, EncodeError> {
    let mut enc = Encoder::new(Cursor::new(&mut *buffer));

    enc.map(2)?
        .str(KEY_TYPE)?
        .u32(message.kind().tag())?
        .str(KEY_DATA)?;

    match message {
        OutgoingMessage::Telemetry(t) => write_telemetry(&mut enc, t)?,
        OutgoingMessage::NodeStatus(s) => write_node_status(&mut enc, s)?,
    }

    Ok(enc.writer().position())
}

fn write_telemetry(
    enc: &mut Encoder<Cursor<&mut [u8]>>,
    t: &TelemetrySample,
) -> Result<(), EncodeError> {
    let [ts, temp, hum, press] = TELEMETRY_FIELDS;
    enc.map(TELEMETRY_FIELDS.len() as u64)?
        .str(ts)?
        .u32(t.timestamp)?
        .str(temp)?
        .u32(t.temperature)?
        .str(hum)?
        .u32(t.humidity)?
        .str(press)?
        .u32(t.pressure)?;
    Ok(())
}

fn write_node_status(
    enc: &mut Encoder<Cursor<&mut [u8]>>,
    s: &NodeStatus,
) -> Result<(), EncodeError> {
    let [ts, uptime, status] = NODE_STATUS_FIELDS;
    enc.map(NODE_STATUS_FIELDS.len() as u64)?
        .str(ts)?
        .u32(s.timestamp)?
        .str(uptime)?
        .u32(s.uptime)?
        .str(status)?
        .u32(s.status.ordinal())?;
    Ok(())
}

/// Outer map header, both top-level keys, the type value and the inner
/// map header.  Tags and field counts are below 24, so each fits one byte.
const fn frame_overhead() -> usize {
    1 + text_len(KEY_TYPE) + 1 + text_len(KEY_DATA) + 1
}

const fn text_len(key: &str) -> usize {
    assert!(key.len() < 24);
    1 + key.len()
}

const fn keys_len(keys: &[&str]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < keys.len() {
        total += text_len(keys[i]);
        i += 1;
    }
    total
}

const fn fields_max_len(keys: &[&str]) -> usize {
    keys_len(keys) + keys.len() * MAX_UINT_LEN
}

const fn uint_len(value: u32) -> usize {
    match value {
        0..=23 => 1,
        24..=0xff => 2,
        0x100..=0xffff => 3,
        _ => 5,
    }
}
