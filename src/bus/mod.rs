//! Channel bus — named single-slot topics with subscriber notification.
//!
//! ```text
//! ┌────────────┐ publish ┌──────────────────────┐ notify ┌──────────────┐
//! │ Producer A │────────▶│ topic "telemetry"    │───────▶│              │
//! └────────────┘         │  slot: latest value  │        │ Subscription │
//! ┌────────────┐ publish ├──────────────────────┤ notify │  (depth 2)   │
//! │ Producer B │────────▶│ topic "node_status"  │───────▶│              │
//! └────────────┘         └──────────────────────┘        └──────┬───────┘
//!                                  ▲                            │ wait()
//!                                  └──────── read() ────────────┘
//! ```
//!
//! A topic holds at most one value; a publish overwrites whatever has not
//! been read yet.  Waiting for an event and reading the value are separate
//! steps, so a slow consumer coalesces a burst of publishes into a single
//! read of the freshest data.
//!
//! The shape of the bus (topics and subscriptions) is fixed by a
//! [`BusBuilder`] before the pipeline starts.  The built [`Bus`] is shared
//! by reference between threads.

mod subscription;

pub use subscription::{MAX_NOTIFY_DEPTH, Subscription};

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use futures_lite::future::block_on;
use heapless::Vec;
use log::{info, warn};

use crate::messages::{MessageKind, OutgoingMessage};
use crate::timeout::{Timeout, with_timeout};
use subscription::Subscriber;

/// Maximum number of topics on one bus.
pub const MAX_TOPICS: usize = 8;

/// Maximum number of subscriptions on one bus.
pub const MAX_SUBSCRIPTIONS: usize = 4;

/// Identifies a topic on the bus that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicId(pub(crate) u8);

impl TopicId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bus failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The topic is write-locked and the caller asked not to wait.
    Busy,
    /// The lock or a notification did not arrive within the timeout.
    Timeout,
    /// Message kind does not match the topic, or the handle is foreign.
    Invalid,
    /// Nothing has been published to the topic yet.
    Empty,
    /// Registration exceeded a fixed capacity.
    Capacity,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "topic busy"),
            Self::Timeout => write!(f, "timed out"),
            Self::Invalid => write!(f, "invalid topic or message"),
            Self::Empty => write!(f, "topic empty"),
            Self::Capacity => write!(f, "bus capacity exceeded"),
        }
    }
}

struct Topic {
    name: &'static str,
    kind: MessageKind,
    slot: Mutex<CriticalSectionRawMutex, Option<OutgoingMessage>>,
    subscribers: Vec<usize, MAX_SUBSCRIPTIONS>,
    published: AtomicU32,
}

// ═══════════════════════════════════════════════════════════════
//  Registration
// ═══════════════════════════════════════════════════════════════

/// Collects topics and subscriptions before steady-state operation.
pub struct BusBuilder {
    topics: Vec<Topic, MAX_TOPICS>,
    subscribers: Vec<Subscriber, MAX_SUBSCRIPTIONS>,
}

impl Default for BusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BusBuilder {
    pub fn new() -> Self {
        Self {
            topics: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Declare a topic carrying messages of `kind`.
    pub fn topic(&mut self, name: &'static str, kind: MessageKind) -> Result<TopicId, BusError> {
        if self.topics.iter().any(|t| t.name == name) {
            return Err(BusError::Invalid);
        }
        let id = TopicId(self.topics.len() as u8);
        self.topics
            .push(Topic {
                name,
                kind,
                slot: Mutex::new(None),
                subscribers: Vec::new(),
                published: AtomicU32::new(0),
            })
            .map_err(|_| BusError::Capacity)?;
        info!("Bus: topic '{}' ({:?}) registered", name, kind);
        Ok(id)
    }

    /// Register a new subscription on `topic` with a notification queue of
    /// `depth` entries.
    pub fn subscribe(&mut self, topic: TopicId, depth: usize) -> Result<Subscription, BusError> {
        if depth == 0 || depth > MAX_NOTIFY_DEPTH || topic.index() >= self.topics.len() {
            return Err(BusError::Invalid);
        }
        let index = self.subscribers.len();
        self.subscribers
            .push(Subscriber::new(depth))
            .map_err(|_| BusError::Capacity)?;
        let subscription = Subscription { index };
        self.attach(&subscription, topic)?;
        Ok(subscription)
    }

    /// Additionally observe `topic` with an existing subscription.
    ///
    /// A subscription observes at most `depth` topics; one more is
    /// [`BusError::Capacity`].
    pub fn attach(&mut self, subscription: &Subscription, topic: TopicId) -> Result<(), BusError> {
        let sub = self
            .subscribers
            .get_mut(subscription.index)
            .ok_or(BusError::Invalid)?;
        let t = self.topics.get_mut(topic.index()).ok_or(BusError::Invalid)?;
        if t.subscribers.contains(&subscription.index) {
            return Ok(());
        }
        if t.subscribers.is_full() || !sub.observe() {
            return Err(BusError::Capacity);
        }
        t.subscribers
            .push(subscription.index)
            .map_err(|_| BusError::Capacity)?;
        info!("Bus: subscription {} observes '{}'", subscription.index, t.name);
        Ok(())
    }

    pub fn build(self) -> Bus {
        Bus {
            topics: self.topics,
            subscribers: self.subscribers,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Steady state
// ═══════════════════════════════════════════════════════════════

/// The running bus.  `Sync`; share it behind an `Arc` or a `'static`.
pub struct Bus {
    topics: Vec<Topic, MAX_TOPICS>,
    subscribers: Vec<Subscriber, MAX_SUBSCRIPTIONS>,
}

impl Bus {
    /// Write `message` into the topic slot and notify its subscribers.
    ///
    /// The slot lock is the only backpressure: [`BusError::Busy`] when it
    /// is held and `timeout` is [`Timeout::NoWait`], [`BusError::Timeout`]
    /// when it stays held for the whole timeout.
    pub async fn publish(
        &self,
        topic: TopicId,
        message: OutgoingMessage,
        timeout: Timeout,
    ) -> Result<(), BusError> {
        let t = self.topic(topic)?;
        if message.kind() != t.kind {
            warn!(
                "Bus: {:?} message rejected by '{}' ({:?})",
                message.kind(),
                t.name,
                t.kind
            );
            return Err(BusError::Invalid);
        }

        {
            let mut slot = with_timeout(timeout, t.slot.lock())
                .await
                .map_err(|_| lock_failure(timeout))?;
            *slot = Some(message);
        }
        t.published.fetch_add(1, Ordering::Relaxed);

        for &index in &t.subscribers {
            self.subscribers[index].notify(topic);
        }
        Ok(())
    }

    /// Suspend until one of the subscription's topics fires.
    pub async fn wait(&self, subscription: &Subscription, timeout: Timeout) -> Result<TopicId, BusError> {
        let sub = self
            .subscribers
            .get(subscription.index)
            .ok_or(BusError::Invalid)?;
        with_timeout(timeout, sub.next())
            .await
            .map_err(|_| BusError::Timeout)
    }

    /// Copy out the latest value of `topic`.
    pub async fn read(&self, topic: TopicId, timeout: Timeout) -> Result<OutgoingMessage, BusError> {
        let t = self.topic(topic)?;
        let slot = with_timeout(timeout, t.slot.lock())
            .await
            .map_err(|_| BusError::Timeout)?;
        (*slot).ok_or(BusError::Empty)
    }

    // ── Blocking wrappers for synchronous threads ─────────────

    pub fn publish_blocking(
        &self,
        topic: TopicId,
        message: OutgoingMessage,
        timeout: Timeout,
    ) -> Result<(), BusError> {
        block_on(self.publish(topic, message, timeout))
    }

    pub fn wait_blocking(&self, subscription: &Subscription, timeout: Timeout) -> Result<TopicId, BusError> {
        block_on(self.wait(subscription, timeout))
    }

    pub fn read_blocking(&self, topic: TopicId, timeout: Timeout) -> Result<OutgoingMessage, BusError> {
        block_on(self.read(topic, timeout))
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn topic_name(&self, topic: TopicId) -> Option<&'static str> {
        self.topics.get(topic.index()).map(|t| t.name)
    }

    pub fn topic_kind(&self, topic: TopicId) -> Option<MessageKind> {
        self.topics.get(topic.index()).map(|t| t.kind)
    }

    /// Look a topic up by name.
    pub fn find(&self, name: &str) -> Option<TopicId> {
        self.topics
            .iter()
            .position(|t| t.name == name)
            .map(|i| TopicId(i as u8))
    }

    /// Total successful publishes to `topic` since boot.
    pub fn publish_count(&self, topic: TopicId) -> u32 {
        self.topics
            .get(topic.index())
            .map_or(0, |t| t.published.load(Ordering::Relaxed))
    }

    /// Publishes folded into a notification that was already pending.
    pub fn coalesced_count(&self, subscription: &Subscription) -> u32 {
        self.subscribers
            .get(subscription.index)
            .map_or(0, Subscriber::coalesced)
    }

    pub fn pending_notifications(&self, subscription: &Subscription) -> usize {
        self.subscribers
            .get(subscription.index)
            .map_or(0, Subscriber::pending_len)
    }

    fn topic(&self, topic: TopicId) -> Result<&Topic, BusError> {
        self.topics.get(topic.index()).ok_or(BusError::Invalid)
    }
}

fn lock_failure(timeout: Timeout) -> BusError {
    match timeout {
        Timeout::NoWait => BusError::Busy,
        _ => BusError::Timeout,
    }
}
