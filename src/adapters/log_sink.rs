//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured egress events to the
//! logger (UART / USB-CDC on target, stderr on host).

use log::{info, warn};

use crate::app::events::EgressEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`EgressEvent`] as a one-line record.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &EgressEvent) {
        match event {
            EgressEvent::Started(transport) => {
                info!("EGRESS | start | transport={:?}", transport);
            }
            EgressEvent::Sent { kind, len } => {
                info!("EGRESS | sent | type={:?} len={}", kind, len);
            }
            EgressEvent::ReadMissed(e) => {
                warn!("EGRESS | read-miss | {}", e);
            }
            EgressEvent::Malformed(e) => {
                warn!("EGRESS | malformed | {}", e);
            }
            EgressEvent::EncodeFailed { kind, error } => {
                warn!("EGRESS | encode-fail | type={:?} {}", kind, error);
            }
            EgressEvent::TransmitFailed { kind, error } => {
                warn!("EGRESS | tx-fail | type={:?} {}", kind, error);
            }
        }
    }
}
