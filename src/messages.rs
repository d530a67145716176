//! Payload types that travel through the egress pipeline.
//!
//! ```text
//! SensorPort ──▶ TelemetrySample ─┐
//!                                 ├─▶ OutgoingMessage ──▶ bus / ring ──▶ radio
//! StatusReporter ─▶ NodeStatus ───┘
//! ```
//!
//! [`OutgoingMessage`] is a closed sum type: the wire tag is derived from
//! the variant, so a tag can never disagree with its payload.

use serde::{Deserialize, Serialize};

/// A point-in-time sensor reading.
///
/// Units: centi-degrees Celsius, centi-percent relative humidity, pascals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp: u32,
    pub temperature: u32,
    pub humidity: u32,
    pub pressure: u32,
}

/// Health of the node as reported in the periodic status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    #[default]
    Ok = 0,
    Error = 1,
}

impl Status {
    /// Ordinal used on the wire.
    pub const fn ordinal(self) -> u32 {
        self as u32
    }
}

/// Periodic health report, produced independently of sensor sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    pub timestamp: u32,
    /// Seconds since boot.
    pub uptime: u32,
    pub status: Status,
}

/// Discriminant of an [`OutgoingMessage`]. Doubles as the bus topic kind
/// and the `"type"` value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    Telemetry = 0,
    NodeStatus = 1,
}

impl MessageKind {
    pub const ALL: [MessageKind; 2] = [MessageKind::Telemetry, MessageKind::NodeStatus];

    /// Wire tag for this kind.
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Map a raw wire tag back to a kind. `None` for unknown tags.
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Telemetry),
            1 => Some(Self::NodeStatus),
            _ => None,
        }
    }
}

/// The single payload type moving through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutgoingMessage {
    Telemetry(TelemetrySample),
    NodeStatus(NodeStatus),
}

impl OutgoingMessage {
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Telemetry(_) => MessageKind::Telemetry,
            Self::NodeStatus(_) => MessageKind::NodeStatus,
        }
    }

    pub const fn timestamp(&self) -> u32 {
        match self {
            Self::Telemetry(t) => t.timestamp,
            Self::NodeStatus(s) => s.timestamp,
        }
    }
}

impl From<TelemetrySample> for OutgoingMessage {
    fn from(sample: TelemetrySample) -> Self {
        Self::Telemetry(sample)
    }
}

impl From<NodeStatus> for OutgoingMessage {
    fn from(status: NodeStatus) -> Self {
        Self::NodeStatus(status)
    }
}
