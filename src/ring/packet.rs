//! Record layout for messages carried through the packet buffer.
//!
//! ```text
//! word 0      : message kind tag
//! word 1..=n  : postcard body, little-endian, zero padded to a word
//! ```

use core::fmt;

use crate::messages::{MessageKind, NodeStatus, OutgoingMessage, TelemetrySample};

/// Largest postcard body: four `u32` varints of at most five bytes each.
pub const MAX_BODY_BYTES: usize = 20;

/// Payload words of the largest record (tag word plus body).
pub const MAX_PAYLOAD_WORDS: usize = 1 + MAX_BODY_BYTES.div_ceil(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// No contiguous space left in the arena.
    NoSpace,
    /// The record's tag names no known message kind.
    UnknownType(u32),
    /// The record is empty or longer than any known message.
    Truncated,
    /// The body failed to (de)serialize.
    Malformed,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpace => write!(f, "packet buffer full"),
            Self::UnknownType(tag) => write!(f, "unknown record type {tag}"),
            Self::Truncated => write!(f, "record length out of range"),
            Self::Malformed => write!(f, "malformed record body"),
        }
    }
}

/// Lay `message` out as record words.  Returns the number of words used.
pub fn pack(message: &OutgoingMessage, out: &mut [u32; MAX_PAYLOAD_WORDS]) -> Result<usize, PacketError> {
    let mut body = [0u8; MAX_BODY_BYTES];
    let used = match message {
        OutgoingMessage::Telemetry(t) => postcard::to_slice(t, &mut body).map(|b| b.len()),
        OutgoingMessage::NodeStatus(s) => postcard::to_slice(s, &mut body).map(|b| b.len()),
    }
    .map_err(|_| PacketError::Malformed)?;

    let body_words = used.div_ceil(4);
    out[0] = message.kind().tag();
    for (slot, chunk) in out[1..].iter_mut().zip(body[..body_words * 4].chunks_exact(4)) {
        *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(1 + body_words)
}

/// Rebuild a message from record words.
pub fn unpack(words: &[u32]) -> Result<OutgoingMessage, PacketError> {
    let (&tag, body_words) = words.split_first().ok_or(PacketError::Truncated)?;
    let kind = MessageKind::from_tag(tag).ok_or(PacketError::UnknownType(tag))?;
    if body_words.len() * 4 > MAX_BODY_BYTES {
        return Err(PacketError::Truncated);
    }

    let mut body = [0u8; MAX_BODY_BYTES];
    for (chunk, w) in body.chunks_exact_mut(4).zip(body_words) {
        chunk.copy_from_slice(&w.to_le_bytes());
    }
    let body = &body[..body_words.len() * 4];

    match kind {
        MessageKind::Telemetry => postcard::from_bytes::<TelemetrySample>(body).map(OutgoingMessage::from),
        MessageKind::NodeStatus => postcard::from_bytes::<NodeStatus>(body).map(OutgoingMessage::from),
    }
    .map_err(|_| PacketError::Malformed)
}
