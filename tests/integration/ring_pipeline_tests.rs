//! End-to-end tests: producer → packet ring → egress → radio.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use futures_lite::future::block_on;
use terranode::app::events::EgressEvent;
use terranode::bus::BusError;
use terranode::egress::{EgressDispatcher, MessageSource, ReadError, RingSource, StepOutcome};
use terranode::events::{Work, WorkQueue};
use terranode::messages::{NodeStatus, OutgoingMessage, Status, TelemetrySample};
use terranode::producer::{Outbox, RingOutbox, SensorProducer, StatusReporter, Worker};
use terranode::ring::{PacketBuffer, PacketError, RingTransport};
use terranode::timeout::Timeout;

use crate::mock_hw::{FixedClock, RecordingRadio, RecordingSink, ScriptedSensor, decode_frame, fields};

const TEST_WAIT: Timeout = Timeout::millis(50);

fn ring_node(
    overwrite: bool,
) -> (
    Arc<RingTransport<64>>,
    EgressDispatcher<RingSource<64>, RecordingRadio, RecordingSink>,
    RecordingRadio,
    RecordingSink,
) {
    let ring = Arc::new(RingTransport::<64>::new(overwrite));
    let radio = RecordingRadio::new();
    let sink = RecordingSink::new();
    let d = EgressDispatcher::new(RingSource::new(ring.clone()), radio.clone(), sink.clone())
        .with_wait_timeout(TEST_WAIT);
    (ring, d, radio, sink)
}

// ── Scenarios over the ring ───────────────────────────────────

#[test]
fn telemetry_through_ring_is_framed_with_four_fields() {
    let (ring, mut d, radio, _sink) = ring_node(false);
    let outbox = RingOutbox::new(ring.clone(), Duration::from_millis(1));
    let mut producer = SensorProducer::new(
        ScriptedSensor {
            next: TelemetrySample {
                timestamp: 100,
                temperature: 2500,
                humidity: 6000,
                pressure: 101_300,
            },
        },
        outbox,
    );
    producer.run_once().unwrap();

    assert!(matches!(block_on(d.step()), StepOutcome::Sent { .. }));
    let frame = decode_frame(&radio.frames()[0]).unwrap();
    assert_eq!(frame.kind, 0);
    assert_eq!(
        frame.fields,
        fields(&[
            ("timestamp", 100),
            ("temperature", 2500),
            ("humidity", 6000),
            ("pressure", 101_300),
        ])
    );
    assert_eq!(ring.buffer().used_words(), 0);
}

#[test]
fn status_through_ring_is_framed_with_three_fields() {
    let (ring, mut d, radio, _sink) = ring_node(false);
    let status = NodeStatus {
        timestamp: 50,
        uptime: 3600,
        status: Status::Ok,
    };
    ring.post(&status.into()).unwrap();
    block_on(d.step());

    let frame = decode_frame(&radio.frames()[0]).unwrap();
    assert_eq!(frame.kind, 1);
    assert_eq!(
        frame.fields,
        fields(&[("timestamp", 50), ("uptime", 3600), ("status", 0)])
    );
}

#[test]
fn radio_failure_frees_the_record_and_the_loop_continues() {
    let (ring, mut d, radio, sink) = ring_node(false);
    radio.fail_next(1);
    let mut reporter = StatusReporter::new(FixedClock(3), RingOutbox::new(ring.clone(), Duration::ZERO));

    reporter.report().unwrap();
    assert_eq!(block_on(d.step()), StepOutcome::TransmitFailed);
    assert_eq!(ring.buffer().used_words(), 0);
    assert_eq!(block_on(d.step()), StepOutcome::Idle);
    assert_eq!(radio.attempts(), 1);

    reporter.report().unwrap();
    assert!(matches!(block_on(d.step()), StepOutcome::Sent { .. }));
    assert_eq!(radio.frames().len(), 1);
    assert!(matches!(sink.events()[0], EgressEvent::TransmitFailed { .. }));
}

#[test]
fn records_are_sent_oldest_first() {
    let (ring, mut d, radio, _sink) = ring_node(false);
    for ts in 0..4 {
        ring.post(&TelemetrySample { timestamp: ts, ..TelemetrySample::default() }.into())
            .unwrap();
    }
    for _ in 0..4 {
        assert!(matches!(block_on(d.step()), StepOutcome::Sent { .. }));
    }
    let stamps: Vec<u32> = radio
        .frames()
        .iter()
        .map(|f| decode_frame(f).unwrap().fields[0].1)
        .collect();
    assert_eq!(stamps, vec![0, 1, 2, 3]);
}

#[test]
fn garbage_record_is_reported_and_dropped() {
    let (ring, mut d, radio, sink) = ring_node(false);
    let mut handle = ring.buffer().allocate(2).unwrap();
    handle.write_words(0, &[0xdead, 0]);
    ring.buffer().commit(handle);

    assert_eq!(block_on(d.step()), StepOutcome::Malformed);
    assert_eq!(
        sink.events(),
        vec![EgressEvent::Malformed(PacketError::UnknownType(0xdead))]
    );
    assert_eq!(radio.attempts(), 0);
    assert_eq!(ring.buffer().used_words(), 0);
    assert_eq!(d.stats().malformed, 1);
}

#[test]
fn empty_ring_after_wake_counts_as_missed_read() {
    let ring = Arc::new(RingTransport::<64>::new(false));
    let mut source = RingSource::new(ring.clone());
    ring.post(&NodeStatus::default().into()).unwrap();
    // Another consumer drains the record between wake-up and read.
    assert!(ring.take().is_some());
    let result = block_on(source.read((), Timeout::NoWait));
    assert_eq!(result, Err(ReadError::Missed(BusError::Empty)));
}

// ── Backpressure and eviction ─────────────────────────────────

#[test]
fn stop_mode_rejects_when_full_and_recovers_after_a_take() {
    let ring = RingTransport::<16>::new(false);
    let msg = OutgoingMessage::from(NodeStatus::default());
    let mut posted = 0;
    while ring.post(&msg).is_ok() {
        posted += 1;
    }
    assert!(posted > 0);
    assert_eq!(ring.post(&msg), Err(PacketError::NoSpace));
    assert_eq!(ring.buffer().dropped(), 0);

    assert_eq!(ring.take(), Some(Ok(msg)));
    assert!(ring.post(&msg).is_ok());
}

#[test]
fn ring_outbox_gives_up_after_bounded_retries() {
    let ring = Arc::new(RingTransport::<16>::new(false));
    let outbox = RingOutbox::new(ring.clone(), Duration::ZERO);
    let msg = OutgoingMessage::from(NodeStatus::default());
    while ring.post(&msg).is_ok() {}
    assert!(outbox.post(msg).is_err());
}

#[test]
fn overwrite_mode_keeps_the_newest_records() {
    let ring = RingTransport::<16>::new(true);
    for ts in 0..10 {
        let msg = OutgoingMessage::from(TelemetrySample { timestamp: ts, ..TelemetrySample::default() });
        ring.post(&msg).unwrap();
    }
    assert!(ring.buffer().dropped() > 0);

    let mut stamps = Vec::new();
    while let Some(result) = ring.take() {
        stamps.push(result.unwrap().timestamp());
    }
    assert_eq!(stamps.last(), Some(&9));
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(stamps.len() as u32 + ring.buffer().dropped(), 10);
}

// ── Concurrency ───────────────────────────────────────────────

const PER_PRODUCER: u32 = 2_000;

fn pattern(producer: u32, seq: u32) -> [u32; 3] {
    [producer, seq, (producer << 24) ^ seq ^ 0x5a5a_5a5a]
}

#[test]
fn concurrent_producers_never_overlap_and_keep_their_order() {
    let buffer = Arc::new(PacketBuffer::<64>::new(false));

    let producers: Vec<_> = (0..2u32)
        .map(|id| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    loop {
                        if let Some(mut handle) = buffer.allocate(3) {
                            handle.write_words(0, &pattern(id, seq));
                            buffer.commit(handle);
                            break;
                        }
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut next: HashMap<u32, u32> = HashMap::new();
    let mut received = 0;
    while received < 2 * PER_PRODUCER {
        let Some(record) = buffer.claim() else {
            thread::yield_now();
            continue;
        };
        let mut words = [0u32; 3];
        assert_eq!(record.copy_payload(&mut words), 3);
        buffer.free(record);

        let (id, seq) = (words[0], words[1]);
        assert_eq!(words, pattern(id, seq), "record contents corrupted");
        let expected = next.entry(id).or_insert(0);
        assert_eq!(seq, *expected, "producer {id} out of order");
        *expected += 1;
        received += 1;
    }

    for p in producers {
        p.join().unwrap();
    }
    assert_eq!(buffer.used_words(), 0);
    assert!(buffer.claim().is_none());
}

const OVERWRITE_PRODUCERS: u32 = 3;
const OVERWRITE_PER_PRODUCER: u32 = 5_000;

/// Record of 1..=4 words: a `(producer, seq)` tag word followed by words
/// derived from it.
fn varied_record(producer: u32, seq: u32) -> Vec<u32> {
    let tag = (producer << 24) | seq;
    let len = 1 + (seq % 4) as usize;
    (0..len)
        .map(|i| if i == 0 { tag } else { tag.rotate_left(7 * i as u32) ^ 0xa5a5_a5a5 })
        .collect()
}

#[test]
fn overwrite_mode_under_contention_loses_nothing_silently() {
    let buffer = Arc::new(PacketBuffer::<32>::new(true));
    let finished = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..OVERWRITE_PRODUCERS)
        .map(|id| {
            let buffer = buffer.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                for seq in 0..OVERWRITE_PER_PRODUCER {
                    let words = varied_record(id, seq);
                    // Eviction stops at a claimed record, so allocation can
                    // still fail briefly.
                    loop {
                        if let Some(mut handle) = buffer.allocate(words.len()) {
                            handle.write_words(0, &words);
                            buffer.commit(handle);
                            break;
                        }
                        thread::yield_now();
                    }
                }
                finished.fetch_add(1, Ordering::Release);
            })
        })
        .collect();

    let mut last: HashMap<u32, u32> = HashMap::new();
    let mut consumed = 0u32;
    let mut take = |buffer: &PacketBuffer<32>| -> bool {
        let Some(record) = buffer.claim() else {
            return false;
        };
        let mut words = [0u32; 8];
        let n = record.copy_payload(&mut words);
        buffer.free(record);

        let (id, seq) = (words[0] >> 24, words[0] & 0x00ff_ffff);
        assert_eq!(&words[..n], varied_record(id, seq).as_slice(), "torn record");
        if let Some(prev) = last.insert(id, seq) {
            assert!(seq > prev, "producer {id}: {seq} after {prev}");
        }
        consumed += 1;
        true
    };

    while finished.load(Ordering::Acquire) < OVERWRITE_PRODUCERS as usize {
        if !take(&buffer) {
            thread::yield_now();
        }
    }
    for p in producers {
        p.join().unwrap();
    }
    while take(&buffer) {}

    let produced = OVERWRITE_PRODUCERS * OVERWRITE_PER_PRODUCER;
    assert!(consumed > 0);
    assert_eq!(consumed + buffer.dropped(), produced);
    assert_eq!(buffer.used_words(), 0);
}

// ── Worker end to end ─────────────────────────────────────────

#[test]
fn worker_jobs_reach_the_radio_through_the_ring() {
    let (ring, mut d, radio, _sink) = ring_node(false);
    let outbox = RingOutbox::new(ring.clone(), Duration::from_millis(1));
    let mut worker = Worker::new(
        SensorProducer::new(
            ScriptedSensor {
                next: TelemetrySample {
                    timestamp: 7,
                    temperature: 2000,
                    humidity: 5000,
                    pressure: 100_000,
                },
            },
            outbox.clone(),
        ),
        StatusReporter::new(FixedClock(42), outbox),
    );

    let queue = Arc::new(WorkQueue::new());
    queue.submit(Work::TakeReading);
    queue.submit(Work::ReportStatus);
    while let Some(work) = queue.try_next() {
        worker.handle(work);
    }
    assert_eq!(worker.stats().readings, 1);
    assert_eq!(worker.stats().reports, 1);

    block_on(d.step());
    block_on(d.step());
    let kinds: Vec<u32> = radio
        .frames()
        .iter()
        .map(|f| decode_frame(f).unwrap().kind)
        .collect();
    assert_eq!(kinds, vec![0, 1]);

    let status = decode_frame(&radio.frames()[1]).unwrap();
    assert_eq!(status.fields, fields(&[("timestamp", 42), ("uptime", 42), ("status", 0)]));
}

#[test]
fn worker_thread_drains_timer_jobs() {
    let ring = Arc::new(RingTransport::<64>::new(false));
    let queue = Arc::new(WorkQueue::new());
    let stop = Arc::new(AtomicBool::new(false));

    let outbox = RingOutbox::new(ring.clone(), Duration::from_millis(1));
    let mut worker = Worker::new(
        SensorProducer::new(ScriptedSensor { next: TelemetrySample::default() }, outbox.clone()),
        StatusReporter::new(FixedClock(1), outbox),
    );
    let handle = {
        let queue = queue.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                if let Some(work) = queue.try_next() {
                    worker.handle(work);
                } else {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
    };

    queue.submit(Work::TakeReading);
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !ring.buffer().has_pending() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    stop.store(true, Ordering::Release);
    handle.join().unwrap();

    assert!(matches!(ring.take(), Some(Ok(OutgoingMessage::Telemetry(_)))));
}
