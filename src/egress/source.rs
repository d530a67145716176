//! Where the dispatcher gets its messages from.
//!
//! The channel bus and the packet ring both sit behind [`MessageSource`],
//! so the dispatcher's state machine is identical for either transport.

use std::sync::Arc;

use crate::bus::{Bus, BusError, Subscription, TopicId};
use crate::config::TransportKind;
use crate::messages::OutgoingMessage;
use crate::ring::{PacketError, RingTransport};
use crate::timeout::Timeout;

/// Why a read after a notification produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// Nothing readable in time (timeout, or slot/ring empty).
    Missed(BusError),
    /// A record was present but could not be turned into a message.
    Malformed(PacketError),
}

/// A notify-then-read message source.
#[allow(async_fn_in_trait)]
pub trait MessageSource {
    /// Identifies what fired, handed back to [`read`](Self::read).
    type Token: Copy;

    /// Suspend until something is available.  `Err(BusError::Timeout)`
    /// when `timeout` elapses first.
    async fn wait(&mut self, timeout: Timeout) -> Result<Self::Token, BusError>;

    /// Fetch the message behind `token`.
    async fn read(&mut self, token: Self::Token, timeout: Timeout) -> Result<OutgoingMessage, ReadError>;

    fn transport(&self) -> TransportKind;
}

// ── Bus ───────────────────────────────────────────────────────

/// Reads the latest value of whichever topic notified the subscription.
pub struct BusSource {
    bus: Arc<Bus>,
    subscription: Subscription,
}

impl BusSource {
    pub fn new(bus: Arc<Bus>, subscription: Subscription) -> Self {
        Self { bus, subscription }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl MessageSource for BusSource {
    type Token = TopicId;

    async fn wait(&mut self, timeout: Timeout) -> Result<TopicId, BusError> {
        self.bus.wait(&self.subscription, timeout).await
    }

    async fn read(&mut self, topic: TopicId, timeout: Timeout) -> Result<OutgoingMessage, ReadError> {
        self.bus.read(topic, timeout).await.map_err(ReadError::Missed)
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Bus
    }
}

// ── Ring ──────────────────────────────────────────────────────

/// Claims the oldest committed record of a packet ring.
pub struct RingSource<const N: usize> {
    ring: Arc<RingTransport<N>>,
}

impl<const N: usize> RingSource<N> {
    pub fn new(ring: Arc<RingTransport<N>>) -> Self {
        Self { ring }
    }

    pub fn ring(&self) -> &RingTransport<N> {
        &self.ring
    }
}

impl<const N: usize> MessageSource for RingSource<N> {
    type Token = ();

    async fn wait(&mut self, timeout: Timeout) -> Result<(), BusError> {
        self.ring
            .wait_ready(timeout)
            .await
            .map_err(|_| BusError::Timeout)
    }

    /// Claiming never blocks, so `timeout` is unused.
    async fn read(&mut self, _token: (), _timeout: Timeout) -> Result<OutgoingMessage, ReadError> {
        match self.ring.take() {
            Some(Ok(message)) => Ok(message),
            Some(Err(e)) => Err(ReadError::Malformed(e)),
            None => Err(ReadError::Missed(BusError::Empty)),
        }
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Ring
    }
}
