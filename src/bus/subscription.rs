//! Subscriber side of the channel bus.
//!
//! Each subscriber owns a small fixed-depth queue of pending topic
//! notifications plus a wake signal.  A topic is pending at most once per
//! subscriber: a publish to a topic that is already queued is coalesced
//! (counted, not queued again), and the subscriber later reads the
//! freshest value once.  The builder never lets a subscription observe
//! more topics than its depth, so a queued notification cannot push
//! another topic's out.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::Deque;

use super::TopicId;

/// Upper bound on a subscription's notification queue depth.
pub const MAX_NOTIFY_DEPTH: usize = 8;

/// Handle bound to exactly one registered subscriber.
///
/// Only [`BusBuilder`](super::BusBuilder) hands these out; the handle is
/// deliberately not `Clone` so exactly one task waits on it.
#[derive(Debug)]
pub struct Subscription {
    pub(super) index: usize,
}

impl Subscription {
    pub fn index(&self) -> usize {
        self.index
    }
}

pub(super) struct Subscriber {
    depth: usize,
    observed: usize,
    pending: BlockingMutex<CriticalSectionRawMutex, RefCell<Deque<TopicId, MAX_NOTIFY_DEPTH>>>,
    wake: Signal<CriticalSectionRawMutex, ()>,
    coalesced: AtomicU32,
}

impl Subscriber {
    pub(super) fn new(depth: usize) -> Self {
        Self {
            depth,
            observed: 0,
            pending: BlockingMutex::new(RefCell::new(Deque::new())),
            wake: Signal::new(),
            coalesced: AtomicU32::new(0),
        }
    }

    /// Count one more observed topic; fails once every queue slot is spoken for.
    pub(super) fn observe(&mut self) -> bool {
        if self.observed >= self.depth {
            return false;
        }
        self.observed += 1;
        true
    }

    /// Queue a notification for `topic` unless one is already pending, and
    /// wake the subscriber.
    pub(super) fn notify(&self, topic: TopicId) {
        let queued = self.pending.lock(|q| {
            let mut q = q.borrow_mut();
            !q.iter().any(|&t| t == topic) && q.len() < self.depth && q.push_back(topic).is_ok()
        });
        if !queued {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        self.wake.signal(());
    }

    /// Suspend until a notification is pending, then dequeue it.
    pub(super) async fn next(&self) -> TopicId {
        loop {
            if let Some(topic) = self.pending.lock(|q| q.borrow_mut().pop_front()) {
                return topic;
            }
            // A stale signal only costs one extra spin of this loop.
            self.wake.wait().await;
        }
    }

    pub(super) fn pending_len(&self) -> usize {
        self.pending.lock(|q| q.borrow().len())
    }

    pub(super) fn coalesced(&self) -> u32 {
        self.coalesced.load(Ordering::Relaxed)
    }
}
