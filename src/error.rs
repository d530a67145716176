//! Unified error types for the TerraSCOPE node firmware.
//!
//! Every subsystem keeps its own small `Copy` error enum (bus, wire
//! encoder, ring records, radio, config) and converts into the
//! top-level [`Error`] so the egress loop and the bootstrap code handle
//! failures uniformly.

use core::fmt;

use crate::bus::BusError;
use crate::config::ConfigError;
use crate::ring::PacketError;
use crate::wire::EncodeError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Publishing to or reading from the channel bus failed.
    Bus(BusError),
    /// A message could not be serialized for the air.
    Encode(EncodeError),
    /// A ring-buffer record could not be packed or unpacked.
    Packet(PacketError),
    /// The radio rejected a configuration or a transmission.
    Radio(RadioError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Encode(e) => write!(f, "encode: {e}"),
            Self::Packet(e) => write!(f, "packet: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

impl From<PacketError> for Error {
    fn from(e: PacketError) -> Self {
        Self::Packet(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`Radio`](crate::app::ports::Radio) capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The modem is absent or has not been initialised.
    DeviceNotReady,
    /// Applying the modem configuration failed.
    ConfigFailed,
    /// The modem accepted the frame but failed to send it.
    SendFailed,
    /// Receive failed for a reason other than a timeout.
    RecvFailed,
    /// Empty payload, zero-length buffer or an out-of-range parameter.
    InvalidParams,
    /// The operation did not finish within its deadline.
    Timeout,
    /// The modem is busy with another operation.
    Busy,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceNotReady => write!(f, "device not ready"),
            Self::ConfigFailed => write!(f, "configuration failed"),
            Self::SendFailed => write!(f, "send failed"),
            Self::RecvFailed => write!(f, "receive failed"),
            Self::InvalidParams => write!(f, "invalid parameters"),
            Self::Timeout => write!(f, "timed out"),
            Self::Busy => write!(f, "radio busy"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
