//! Message producers and the worker that runs them.
//!
//! ```text
//!  PeriodicTimer ─▶ WorkQueue ─▶ Worker ─┬─▶ SensorProducer ─┐
//!                                        └─▶ StatusReporter ─┴─▶ Outbox ─▶ bus | ring
//! ```
//!
//! Producers never see the transport: they hand finished messages to an
//! [`Outbox`], which either publishes to the channel bus or packs a record
//! into the packet ring.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::app::ports::{ClockPort, SensorPort};
use crate::bus::Bus;
use crate::error::{Error, Result};
use crate::events::{Work, WorkQueue};
use crate::messages::{NodeStatus, OutgoingMessage, Status, TelemetrySample};
use crate::pipeline::Topics;
use crate::ring::{PacketError, RingTransport};
use crate::timeout::Timeout;

/// Ring allocation attempts before a message is given up.
pub const RING_POST_ATTEMPTS: u32 = 3;

/// Transport-side entry point for producers.
pub trait Outbox {
    fn post(&self, message: OutgoingMessage) -> Result<()>;
}

// ── Bus outbox ────────────────────────────────────────────────

/// Publishes each message on the topic of its kind.
#[derive(Clone)]
pub struct BusOutbox {
    bus: Arc<Bus>,
    topics: Topics,
    timeout: Timeout,
}

impl BusOutbox {
    pub fn new(bus: Arc<Bus>, topics: Topics, timeout: Timeout) -> Self {
        Self { bus, topics, timeout }
    }
}

impl Outbox for BusOutbox {
    fn post(&self, message: OutgoingMessage) -> Result<()> {
        let topic = self.topics.for_kind(message.kind());
        self.bus.publish_blocking(topic, message, self.timeout)?;
        Ok(())
    }
}

// ── Ring outbox ───────────────────────────────────────────────

/// Packs each message into a ring record, backing off while the ring is
/// full.
///
/// The back-off sleeps on the calling thread.  On the node that is the
/// single worker thread, so a post that keeps finding the ring full holds
/// up the next queued job by as much as `(RING_POST_ATTEMPTS - 1)` times
/// the retry delay.
pub struct RingOutbox<const N: usize> {
    ring: Arc<RingTransport<N>>,
    retry_delay: Duration,
}

impl<const N: usize> Clone for RingOutbox<N> {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring.clone(),
            retry_delay: self.retry_delay,
        }
    }
}

impl<const N: usize> RingOutbox<N> {
    pub fn new(ring: Arc<RingTransport<N>>, retry_delay: Duration) -> Self {
        Self { ring, retry_delay }
    }
}

impl<const N: usize> Outbox for RingOutbox<N> {
    fn post(&self, message: OutgoingMessage) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.ring.post(&message) {
                Err(PacketError::NoSpace) if attempt < RING_POST_ATTEMPTS => {
                    warn!("Failed to allocate buffer space, retrying ({}/{})", attempt, RING_POST_ATTEMPTS);
                    std::thread::sleep(self.retry_delay);
                    attempt += 1;
                }
                other => return other.map_err(Error::from),
            }
        }
    }
}

// ── Producers ─────────────────────────────────────────────────

/// Samples the sensor and posts the reading.
pub struct SensorProducer<S, O> {
    sensor: S,
    outbox: O,
}

impl<S: SensorPort, O: Outbox> SensorProducer<S, O> {
    pub fn new(sensor: S, outbox: O) -> Self {
        Self { sensor, outbox }
    }

    pub fn run_once(&mut self) -> Result<TelemetrySample> {
        let reading = self.sensor.take_reading();
        info!(
            "Sensor reading: t={} temp={} hum={} press={}",
            reading.timestamp, reading.temperature, reading.humidity, reading.pressure
        );
        self.outbox.post(reading.into())?;
        Ok(reading)
    }
}

/// Builds the periodic node health report.
pub struct StatusReporter<C, O> {
    clock: C,
    outbox: O,
}

impl<C: ClockPort, O: Outbox> StatusReporter<C, O> {
    pub fn new(clock: C, outbox: O) -> Self {
        Self { clock, outbox }
    }

    pub fn report(&mut self) -> Result<NodeStatus> {
        let uptime = self.clock.uptime_secs();
        let status = NodeStatus {
            timestamp: uptime,
            uptime,
            status: Status::Ok,
        };
        self.outbox.post(status.into())?;
        info!("Node status published (uptime {}s)", uptime);
        Ok(status)
    }
}

// ── Worker ────────────────────────────────────────────────────

/// Counts of jobs run by the [`Worker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub readings: u32,
    pub reports: u32,
    pub failures: u32,
}

/// Executes queued jobs on the producer thread.
pub struct Worker<S, C, O> {
    sensor: SensorProducer<S, O>,
    status: StatusReporter<C, O>,
    stats: WorkerStats,
}

impl<S: SensorPort, C: ClockPort, O: Outbox> Worker<S, C, O> {
    pub fn new(sensor: SensorProducer<S, O>, status: StatusReporter<C, O>) -> Self {
        Self {
            sensor,
            status,
            stats: WorkerStats::default(),
        }
    }

    /// Run one job.  Failures are logged and counted; the message is lost.
    pub fn handle(&mut self, work: Work) {
        let result = match work {
            Work::TakeReading => self
                .sensor
                .run_once()
                .map(|_| self.stats.readings = self.stats.readings.wrapping_add(1)),
            Work::ReportStatus => self
                .status
                .report()
                .map(|_| self.stats.reports = self.stats.reports.wrapping_add(1)),
        };
        if let Err(e) = result {
            self.stats.failures = self.stats.failures.wrapping_add(1);
            warn!("Worker: {:?} failed: {}", work, e);
        }
    }

    /// Execute jobs forever.
    pub fn run(&mut self, queue: &WorkQueue) {
        loop {
            let work = queue.next_blocking();
            self.handle(work);
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }
}
