//! Egress dispatcher — drains a message source and drives the radio.
//!
//! ```text
//!            ┌──────────────────────┐  wait() timed out
//!     ┌─────▶│ AwaitingNotification │─────────────┐
//!     │      └──────────┬───────────┘◀────────────┘
//!     │                 │ token
//!     │      ┌──────────▼───────────┐  Missed / Malformed
//!     │      │       Reading        │───────────────────┐
//!     │      └──────────┬───────────┘                   │
//!     │                 │ message                       │
//!     │      ┌──────────▼───────────┐  BufferTooSmall   │
//!     │      │       Encoding       │───────────────────┤
//!     │      └──────────┬───────────┘                   │
//!     │                 │ bytes                         │
//!     │      ┌──────────▼───────────┐  radio error      │
//!     │      │     Transmitting     │───────────────────┤
//!     │      └──────────┬───────────┘                   │
//!     └─────────────────┴───────────────────────────────┘
//! ```
//!
//! Every failure is logged, counted, emitted as an [`EgressEvent`] and
//! the message dropped.  Nothing is retried and nothing stops the loop.

pub mod source;
pub mod task;

use log::{debug, error, info, warn};

pub use source::{BusSource, MessageSource, ReadError, RingSource};

use crate::app::events::EgressEvent;
use crate::app::ports::{EventSink, Radio};
use crate::messages::MessageKind;
use crate::timeout::Timeout;
use crate::wire::{self, MAX_ENCODED_LEN};

/// Default deadline for reading a topic after its notification.
pub const DEFAULT_READ_TIMEOUT: Timeout = Timeout::millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressState {
    AwaitingNotification,
    Reading,
    Encoding,
    Transmitting,
}

/// Result of one dispatcher cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The wait timed out with nothing to do.
    Idle,
    Sent { kind: MessageKind, len: usize },
    ReadMissed,
    Malformed,
    EncodeFailed,
    TransmitFailed,
}

/// Running totals since the dispatcher was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EgressStats {
    pub sent: u32,
    pub read_misses: u32,
    pub malformed: u32,
    pub encode_failures: u32,
    pub tx_failures: u32,
}

pub struct EgressDispatcher<S, R, E> {
    source: S,
    radio: R,
    sink: E,
    wait_timeout: Timeout,
    read_timeout: Timeout,
    state: EgressState,
    stats: EgressStats,
    scratch: [u8; MAX_ENCODED_LEN],
}

impl<S: MessageSource, R: Radio, E: EventSink> EgressDispatcher<S, R, E> {
    /// Waits indefinitely for notifications; reads with
    /// [`DEFAULT_READ_TIMEOUT`].
    pub fn new(source: S, radio: R, sink: E) -> Self {
        Self {
            source,
            radio,
            sink,
            wait_timeout: Timeout::Forever,
            read_timeout: DEFAULT_READ_TIMEOUT,
            state: EgressState::AwaitingNotification,
            stats: EgressStats::default(),
            scratch: [0; MAX_ENCODED_LEN],
        }
    }

    /// Bound the notification wait, so [`step`](Self::step) returns
    /// [`StepOutcome::Idle`] instead of suspending forever.
    pub fn with_wait_timeout(mut self, timeout: Timeout) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Timeout) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Run one full cycle of the state machine.
    pub async fn step(&mut self) -> StepOutcome {
        self.state = EgressState::AwaitingNotification;
        let Ok(token) = self.source.wait(self.wait_timeout).await else {
            return StepOutcome::Idle;
        };

        self.state = EgressState::Reading;
        let message = match self.source.read(token, self.read_timeout).await {
            Ok(message) => message,
            Err(ReadError::Missed(e)) => {
                self.stats.read_misses = self.stats.read_misses.wrapping_add(1);
                warn!("Egress: read after notification failed ({})", e);
                return self.finish(EgressEvent::ReadMissed(e), StepOutcome::ReadMissed);
            }
            Err(ReadError::Malformed(e)) => {
                self.stats.malformed = self.stats.malformed.wrapping_add(1);
                warn!("Egress: discarded record ({})", e);
                return self.finish(EgressEvent::Malformed(e), StepOutcome::Malformed);
            }
        };
        let kind = message.kind();
        debug!("Received message type {}", kind.tag());

        self.state = EgressState::Encoding;
        let len = match wire::encode(&message, &mut self.scratch) {
            Ok(len) => len,
            Err(error) => {
                self.stats.encode_failures = self.stats.encode_failures.wrapping_add(1);
                error!("Failed to encode {:?} message: {}", kind, error);
                return self.finish(EgressEvent::EncodeFailed { kind, error }, StepOutcome::EncodeFailed);
            }
        };

        self.state = EgressState::Transmitting;
        match self.radio.transmit(&self.scratch[..len]) {
            Ok(()) => {
                self.stats.sent = self.stats.sent.wrapping_add(1);
                debug!("Message sent successfully ({} bytes)", len);
                self.finish(EgressEvent::Sent { kind, len }, StepOutcome::Sent { kind, len })
            }
            Err(error) => {
                self.stats.tx_failures = self.stats.tx_failures.wrapping_add(1);
                error!("Failed to send message: {}", error);
                self.finish(EgressEvent::TransmitFailed { kind, error }, StepOutcome::TransmitFailed)
            }
        }
    }

    /// Loop forever.  Only a device reset ends it.
    pub async fn run(&mut self) {
        let transport = self.source.transport();
        info!("Egress: dispatcher started ({:?} transport)", transport);
        self.sink.emit(&EgressEvent::Started(transport));
        loop {
            self.step().await;
        }
    }

    pub fn state(&self) -> EgressState {
        self.state
    }

    pub fn stats(&self) -> EgressStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    fn finish(&mut self, event: EgressEvent, outcome: StepOutcome) -> StepOutcome {
        self.sink.emit(&event);
        self.state = EgressState::AwaitingNotification;
        outcome
    }
}
