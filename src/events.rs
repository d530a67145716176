//! Timer-driven work queue.
//!
//! Work items are zero-argument jobs submitted from timer context and
//! executed by the producer worker thread.
//!
//! ```text
//! ┌──────────────┐ submit ┌──────────────┐ next ┌──────────────────┐
//! │ sensor timer │───────▶│              │─────▶│  producer worker │
//! │ status timer │───────▶│  Work Queue  │      │  (take_reading,  │
//! └──────────────┘        │  (bounded)   │      │   report_status) │
//!                         └──────────────┘      └──────────────────┘
//! ```
//!
//! A job that is already queued is not queued again: the second
//! submission is coalesced.  The pending flag is cleared as the worker
//! dequeues the job, so a submission that arrives while the job runs
//! queues exactly one more run.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future::block_on;
use log::warn;

/// Maximum number of queued jobs.
const WORK_QUEUE_CAP: usize = 4;

/// Jobs the worker knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Work {
    /// Sample the sensor and publish the reading.
    TakeReading = 0,
    /// Build and publish a node status report.
    ReportStatus = 1,
}

impl Work {
    const COUNT: usize = 2;
}

pub struct WorkQueue {
    channel: Channel<CriticalSectionRawMutex, Work, WORK_QUEUE_CAP>,
    pending: [AtomicBool; Work::COUNT],
    coalesced: AtomicU32,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            pending: [AtomicBool::new(false), AtomicBool::new(false)],
            coalesced: AtomicU32::new(0),
        }
    }

    /// Queue `work` unless it is already pending.  Never blocks; safe from
    /// timer callbacks.  Returns `false` if nothing was queued.
    pub fn submit(&self, work: Work) -> bool {
        if self.pending[work as usize].swap(true, Ordering::AcqRel) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.channel.try_send(work).is_err() {
            self.pending[work as usize].store(false, Ordering::Release);
            warn!("WorkQueue: full, dropped {:?}", work);
            return false;
        }
        true
    }

    /// Suspend until a job is queued, then dequeue it.
    pub async fn next(&self) -> Work {
        let work = self.channel.receive().await;
        self.pending[work as usize].store(false, Ordering::Release);
        work
    }

    pub fn next_blocking(&self) -> Work {
        block_on(self.next())
    }

    pub fn try_next(&self) -> Option<Work> {
        let work = self.channel.try_receive().ok()?;
        self.pending[work as usize].store(false, Ordering::Release);
        Some(work)
    }

    /// Submissions dropped because the job was already pending.
    pub fn coalesced(&self) -> u32 {
        self.coalesced.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}
