//! Port traits — the hexagonal boundary between the pipeline and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ producers / egress dispatcher
//! ```
//!
//! Driven adapters (radio, sensors, clock, event sinks) implement these
//! traits.  The producers and the [`EgressDispatcher`](crate::egress::EgressDispatcher)
//! consume them via generics, so the pipeline never touches hardware
//! directly and runs unchanged against test doubles.

use core::time::Duration;

use crate::config::RadioConfig;
use crate::error::RadioError;
use crate::messages::TelemetrySample;

use super::events::EgressEvent;

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain → modem)
// ───────────────────────────────────────────────────────────────

/// Metadata of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reception {
    /// Bytes written into the caller's buffer.
    pub len: usize,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Signal-to-noise ratio in dB.
    pub snr: i8,
}

/// Long-range radio used for egress.
///
/// `transmit` is synchronous: it returns once the frame is on the air or
/// has failed.  Callers never retry.
pub trait Radio {
    /// Apply modem parameters.
    fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError>;

    /// Send one frame.
    fn transmit(&mut self, payload: &[u8]) -> Result<(), RadioError>;

    /// Listen for one frame for at most `timeout`.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Reception, RadioError>;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the producer calls this on every sensor tick.
pub trait SensorPort {
    /// Acquire one complete, timestamped reading.
    fn take_reading(&mut self) -> TelemetrySample;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time since boot.
pub trait ClockPort {
    fn uptime_secs(&self) -> u32;

    fn uptime_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The dispatcher emits structured [`EgressEvent`]s through this port.
/// Adapters decide where they go (serial log, counters, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &EgressEvent);
}
