//! Outbound egress events.
//!
//! The [`EgressDispatcher`](crate::egress::EgressDispatcher) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them.

use crate::bus::BusError;
use crate::config::TransportKind;
use crate::error::RadioError;
use crate::messages::MessageKind;
use crate::ring::PacketError;
use crate::wire::EncodeError;

/// Structured events emitted by the egress path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressEvent {
    /// The dispatcher entered its loop.
    Started(TransportKind),

    /// A frame went out on the radio.
    Sent { kind: MessageKind, len: usize },

    /// A notification arrived but the value could not be read in time.
    ReadMissed(BusError),

    /// A ring record could not be unpacked and was discarded.
    Malformed(PacketError),

    /// The encoder rejected a message.
    EncodeFailed { kind: MessageKind, error: EncodeError },

    /// The radio rejected a frame.
    TransmitFailed { kind: MessageKind, error: RadioError },
}
