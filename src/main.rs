//! TerraSCOPE Node Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimSensor      MonotonicClock   LoraDevice<MockModem>         │
//! │  (SensorPort)   (ClockPort)      (Radio)        LogEventSink   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  timers ─▶ WorkQueue ─▶ Worker ─▶ Outbox ─▶ Bus | Ring         │
//! │                                                 │              │
//! │                       EgressDispatcher ◀────────┘              │
//! │                       (encode CBOR ─▶ transmit)                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Result, bail};
use log::info;

use terranode::Error;
use terranode::adapters::log_sink::LogEventSink;
use terranode::adapters::lora::LoraDevice;
use terranode::adapters::mock_modem::MockModem;
use terranode::adapters::sim_sensor::SimSensor;
use terranode::adapters::time::MonotonicClock;
use terranode::config::{NodeConfig, TransportKind};
use terranode::drivers::hw_timer::PeriodicTimer;
use terranode::drivers::task_pin::{Core, spawn_on_core};
use terranode::egress::{self, BusSource, EgressDispatcher, RingSource};
use terranode::events::{Work, WorkQueue};
use terranode::pipeline::build_bus;
use terranode::producer::{BusOutbox, Outbox, RingOutbox, SensorProducer, StatusReporter, Worker};
use terranode::ring::{ARENA_WORDS, RingTransport};

const SENSOR_SEED: u64 = 0x7e55_c0de;

const WORKER_PRIORITY: u8 = 8;
const WORKER_STACK_KB: usize = 8;

// ── Platform bootstrap ────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn init_platform() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn init_platform() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    Ok(())
}

/// Defaults, or a JSON override file named on the command line (host only).
#[cfg(not(target_os = "espidf"))]
fn load_config() -> Result<NodeConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(NodeConfig::default());
    };
    let json = std::fs::read_to_string(&path)?;
    let config = NodeConfig::from_json(&json).map_err(Error::from)?;
    info!("Config loaded from {}", path);
    Ok(config)
}

#[cfg(target_os = "espidf")]
fn load_config() -> Result<NodeConfig> {
    Ok(NodeConfig::default())
}

// ── Producer side ─────────────────────────────────────────────

fn spawn_worker<O>(config: &NodeConfig, outbox: O, queue: Arc<WorkQueue>) -> Result<JoinHandle<()>>
where
    O: Outbox + Clone + Send + 'static,
{
    let clock = MonotonicClock::new();
    let mut worker = Worker::new(
        SensorProducer::new(SimSensor::new(SENSOR_SEED, clock), outbox.clone()),
        StatusReporter::new(clock, outbox),
    );
    let handle = spawn_on_core(Core::App, WORKER_PRIORITY, WORKER_STACK_KB, "producer\0", move || {
        worker.run(&queue);
    })?;
    info!(
        "Producer worker started (sensor every {} ms, status every {} ms)",
        config.timing.sensor_period_ms, config.timing.status_period_ms
    );
    Ok(handle)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Bootstrap ──────────────────────────────────────────
    init_platform()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  TerraSCOPE node v{}               ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let config = load_config()?;
    config.validate().map_err(Error::from)?;
    let timing = config.timing;

    // ── 3. Radio ──────────────────────────────────────────────
    let mut radio = LoraDevice::new(MockModem::new(), config.radio);
    radio.init().map_err(Error::from)?;

    // ── 4. Transport, producers and egress ────────────────────
    let queue = Arc::new(WorkQueue::new());
    let sink = LogEventSink::new();

    let (worker, egress) = match config.transport {
        TransportKind::Bus => {
            let (bus, topics, subscription) = build_bus(&config.bus).map_err(Error::from)?;
            let bus = Arc::new(bus);

            let outbox = BusOutbox::new(bus.clone(), topics, timing.publish_timeout());
            let worker = spawn_worker(&config, outbox, queue.clone())?;

            let dispatcher = EgressDispatcher::new(BusSource::new(bus, subscription), radio, sink)
                .with_read_timeout(timing.read_timeout());
            (worker, egress::task::spawn(dispatcher, timing.consumer_start_delay())?)
        }
        TransportKind::Ring => {
            let ring = Arc::new(RingTransport::<ARENA_WORDS>::new(config.ring_overwrite));
            info!(
                "Ring transport: {} words, overwrite={}",
                ARENA_WORDS, config.ring_overwrite
            );

            let outbox = RingOutbox::new(ring.clone(), timing.producer_retry());
            let worker = spawn_worker(&config, outbox, queue.clone())?;

            let dispatcher = EgressDispatcher::new(RingSource::new(ring), radio, sink)
                .with_read_timeout(timing.read_timeout());
            (worker, egress::task::spawn(dispatcher, timing.consumer_start_delay())?)
        }
    };

    // ── 5. Timers ─────────────────────────────────────────────
    let _sensor_timer = PeriodicTimer::start(
        "t-sensor\0",
        timing.sensor_start_delay(),
        timing.sensor_period(),
        queue.clone(),
        Work::TakeReading,
    )?;
    let _status_timer = PeriodicTimer::start(
        "t-status\0",
        timing.status_period(),
        timing.status_period(),
        queue,
        Work::ReportStatus,
    )?;

    info!("Node running ({:?} transport)", config.transport);

    // Neither thread returns unless it panics.
    if egress.join().is_err() {
        bail!("egress thread panicked");
    }
    if worker.join().is_err() {
        bail!("producer thread panicked");
    }
    Ok(())
}
