//! Mock hardware adapters for integration tests.
//!
//! Records every radio frame and egress event so tests can assert on the
//! full history without a modem attached.  Recorders share their log via
//! `Arc<Mutex<..>>` so the test keeps a view after moving the adapter into
//! a dispatcher or thread.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use minicbor::Decoder;
use minicbor::data::Type;
use terranode::RadioError;
use terranode::app::events::EgressEvent;
use terranode::app::ports::{ClockPort, EventSink, Radio, Reception, SensorPort};
use terranode::config::RadioConfig;
use terranode::messages::TelemetrySample;

// ── RecordingRadio ────────────────────────────────────────────

#[derive(Default)]
struct RadioLog {
    frames: Vec<Vec<u8>>,
    attempts: u32,
    fail_remaining: u32,
}

/// Radio double: stores transmitted frames, can fail the next N sends.
#[derive(Clone, Default)]
pub struct RecordingRadio {
    log: Arc<Mutex<RadioLog>>,
}

#[allow(dead_code)]
impl RecordingRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        self.log.lock().unwrap().fail_remaining = count;
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.log.lock().unwrap().frames.clone()
    }

    /// Transmit calls, successful or not.
    pub fn attempts(&self) -> u32 {
        self.log.lock().unwrap().attempts
    }
}

impl Radio for RecordingRadio {
    fn configure(&mut self, _config: &RadioConfig) -> Result<(), RadioError> {
        Ok(())
    }

    fn transmit(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        let mut log = self.log.lock().unwrap();
        log.attempts += 1;
        if log.fail_remaining > 0 {
            log.fail_remaining -= 1;
            return Err(RadioError::SendFailed);
        }
        log.frames.push(payload.to_vec());
        Ok(())
    }

    fn receive(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<Reception, RadioError> {
        Err(RadioError::RecvFailed)
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<EgressEvent>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &EgressEvent) {
        self.events.lock().unwrap().push(*event);
    }
}

// ── Sensor / clock ────────────────────────────────────────────

/// Returns a fixed reading, bumping the timestamp each call.
pub struct ScriptedSensor {
    pub next: TelemetrySample,
}

impl SensorPort for ScriptedSensor {
    fn take_reading(&mut self) -> TelemetrySample {
        let r = self.next;
        self.next.timestamp += 1;
        r
    }
}

#[derive(Clone, Copy)]
pub struct FixedClock(pub u32);

impl ClockPort for FixedClock {
    fn uptime_secs(&self) -> u32 {
        self.0
    }

    fn uptime_ms(&self) -> u64 {
        u64::from(self.0) * 1_000
    }
}

// ── Structural frame decoder ──────────────────────────────────

/// A decoded wire frame: the type tag and the data map in wire order.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    pub kind: u32,
    pub fields: Vec<(String, u32)>,
}

/// Decode a frame, insisting on definite-length maps and that the whole
/// input is consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, minicbor::decode::Error> {
    let mut d = Decoder::new(bytes);
    assert_eq!(d.map()?, Some(2), "outer map must be definite with 2 entries");
    assert_eq!(d.str()?, "type");
    let kind = d.u32()?;
    assert_eq!(d.str()?, "data");

    let n = d.map()?.expect("inner map must be definite");
    let mut fields = Vec::new();
    for _ in 0..n {
        let key = d.str()?.to_string();
        let ty = d.datatype()?;
        assert!(
            matches!(ty, Type::U8 | Type::U16 | Type::U32 | Type::U64),
            "field {key} must be unsigned, got {ty:?}"
        );
        fields.push((key, d.u32()?));
    }
    assert_eq!(d.position(), bytes.len(), "trailing bytes after frame");
    Ok(DecodedFrame { kind, fields })
}

/// Owned `(name, value)` pairs for comparisons.
pub fn fields(pairs: &[(&str, u32)]) -> Vec<(String, u32)> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
