//! End-to-end tests: producer → channel bus → egress → radio.

use std::sync::Arc;

use futures_lite::future::block_on;
use terranode::adapters::lora::LoraDevice;
use terranode::adapters::mock_modem::MockModem;
use terranode::app::events::EgressEvent;
use terranode::bus::{Bus, Subscription};
use terranode::config::{BusConfig, RadioConfig};
use terranode::egress::{BusSource, EgressDispatcher, EgressState, StepOutcome};
use terranode::messages::{MessageKind, NodeStatus, OutgoingMessage, Status, TelemetrySample};
use terranode::pipeline::{Topics, build_bus};
use terranode::producer::{BusOutbox, SensorProducer, StatusReporter};
use terranode::timeout::Timeout;
use terranode::RadioError;

use crate::mock_hw::{FixedClock, RecordingRadio, RecordingSink, ScriptedSensor, decode_frame, fields};

const TEST_WAIT: Timeout = Timeout::millis(50);

fn node() -> (Arc<Bus>, Topics, Subscription) {
    let (bus, topics, sub) = build_bus(&BusConfig::default()).unwrap();
    (Arc::new(bus), topics, sub)
}

fn dispatcher(
    bus: &Arc<Bus>,
    sub: Subscription,
) -> (EgressDispatcher<BusSource, RecordingRadio, RecordingSink>, RecordingRadio, RecordingSink) {
    let radio = RecordingRadio::new();
    let sink = RecordingSink::new();
    let d = EgressDispatcher::new(BusSource::new(bus.clone(), sub), radio.clone(), sink.clone())
        .with_wait_timeout(TEST_WAIT);
    (d, radio, sink)
}

#[test]
fn scenario_a_telemetry_is_framed_with_four_fields() {
    let (bus, topics, sub) = node();
    let (mut d, radio, _sink) = dispatcher(&bus, sub);

    let sample = TelemetrySample {
        timestamp: 100,
        temperature: 2500,
        humidity: 6000,
        pressure: 101_300,
    };
    let mut producer = SensorProducer::new(
        ScriptedSensor { next: sample },
        BusOutbox::new(bus.clone(), topics, Timeout::millis(200)),
    );
    producer.run_once().unwrap();

    assert!(matches!(
        block_on(d.step()),
        StepOutcome::Sent { kind: MessageKind::Telemetry, .. }
    ));

    let frames = radio.frames();
    assert_eq!(frames.len(), 1);
    let frame = decode_frame(&frames[0]).unwrap();
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
}

#[test]
fn scenario_b_node_status_is_framed_with_three_fields() {
    let (bus, topics, sub) = node();
    let (mut d, radio, _sink) = dispatcher(&bus, sub);

    let status = NodeStatus {
        timestamp: 50,
        uptime: 3600,
        status: Status::Ok,
    };
    bus.publish_blocking(topics.node_status, status.into(), Timeout::NoWait)
        .unwrap();
    block_on(d.step());

    let frame = decode_frame(&radio.frames()[0]).unwrap();
    assert_eq!(frame.kind, 1);
    assert_eq!(
        frame.fields,
        fields(&[("timestamp", 50), ("uptime", 3600), ("status", 0)])
    );
}

#[test]
fn scenario_c_radio_failure_drops_message_and_resumes() {
    let (bus, topics, sub) = node();
    let (mut d, radio, sink) = dispatcher(&bus, sub);
    radio.fail_next(1);

    let mut reporter = StatusReporter::new(FixedClock(9), BusOutbox::new(bus.clone(), topics, Timeout::NoWait));
    reporter.report().unwrap();

    assert_eq!(block_on(d.step()), StepOutcome::TransmitFailed);
    assert_eq!(d.state(), EgressState::AwaitingNotification);
    // Dropped, not retried: the next cycle finds nothing.
    assert_eq!(block_on(d.step()), StepOutcome::Idle);
    assert_eq!(radio.attempts(), 1);
    assert!(radio.frames().is_empty());

    reporter.report().unwrap();
    assert!(matches!(block_on(d.step()), StepOutcome::Sent { .. }));
    assert_eq!(radio.frames().len(), 1);

    let events = sink.events();
    assert_eq!(
        events[0],
        EgressEvent::TransmitFailed {
            kind: MessageKind::NodeStatus,
            error: RadioError::SendFailed
        }
    );
    assert_eq!(d.stats().tx_failures, 1);
    assert_eq!(d.stats().sent, 1);
}

#[test]
fn wait_times_out_when_idle() {
    let (bus, _topics, sub) = node();
    let (mut d, radio, sink) = dispatcher(&bus, sub);
    let start = std::time::Instant::now();
    assert_eq!(block_on(d.step()), StepOutcome::Idle);
    assert!(start.elapsed() >= std::time::Duration::from_millis(50));
    assert_eq!(radio.attempts(), 0);
    assert!(sink.events().is_empty());
}

#[test]
fn wait_returns_promptly_on_publish_from_another_thread() {
    let (bus, topics, sub) = node();
    let radio = RecordingRadio::new();
    let mut d = EgressDispatcher::new(BusSource::new(bus.clone(), sub), radio.clone(), RecordingSink::new())
        .with_wait_timeout(Timeout::millis(2_000));

    let publisher = {
        let bus = bus.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            let msg = OutgoingMessage::from(NodeStatus::default());
            bus.publish_blocking(topics.node_status, msg, Timeout::millis(200))
                .unwrap();
        })
    };

    let start = std::time::Instant::now();
    assert!(matches!(block_on(d.step()), StepOutcome::Sent { .. }));
    assert!(start.elapsed() < std::time::Duration::from_millis(1_000));
    publisher.join().unwrap();
}

#[test]
fn publishes_without_reads_leave_only_the_last_value() {
    let (bus, topics, _sub) = node();
    for ts in 0..10 {
        let msg = OutgoingMessage::from(TelemetrySample {
            timestamp: ts,
            ..TelemetrySample::default()
        });
        bus.publish_blocking(topics.telemetry, msg, Timeout::NoWait).unwrap();
    }
    let read = bus.read_blocking(topics.telemetry, Timeout::NoWait).unwrap();
    assert_eq!(read, OutgoingMessage::from(TelemetrySample { timestamp: 9, ..TelemetrySample::default() }));
    // Reading does not consume.
    assert_eq!(bus.read_blocking(topics.telemetry, Timeout::NoWait), Ok(read));
}

#[test]
fn telemetry_burst_does_not_hide_a_status_report() {
    let (bus, topics, sub) = node();
    let (mut d, radio, _sink) = dispatcher(&bus, sub);

    for ts in [1, 2] {
        let msg = OutgoingMessage::from(TelemetrySample { timestamp: ts, ..TelemetrySample::default() });
        bus.publish_blocking(topics.telemetry, msg, Timeout::NoWait).unwrap();
    }
    let status = NodeStatus { timestamp: 8, uptime: 8, status: Status::Ok };
    bus.publish_blocking(topics.node_status, status.into(), Timeout::NoWait)
        .unwrap();

    while block_on(d.step()) != StepOutcome::Idle {}

    let frames: Vec<_> = radio
        .frames()
        .iter()
        .map(|f| decode_frame(f).unwrap())
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].kind, 0);
    assert_eq!(frames[0].fields[0], ("timestamp".to_string(), 2));
    assert_eq!(frames[1].kind, 1);
}

#[test]
fn lora_device_over_mock_modem_transmits_frames() {
    let (bus, topics, sub) = node();
    let mut lora = LoraDevice::new(MockModem::new(), RadioConfig::default());
    lora.init().unwrap();
    let mut d = EgressDispatcher::new(BusSource::new(bus.clone(), sub), lora, RecordingSink::new())
        .with_wait_timeout(TEST_WAIT);

    let status = NodeStatus {
        timestamp: 50,
        uptime: 3600,
        status: Status::Ok,
    };
    bus.publish_blocking(topics.node_status, status.into(), Timeout::NoWait)
        .unwrap();
    block_on(d.step());

    let modem = d.radio().modem();
    assert_eq!(modem.sent_count(), 1);
    let frame = decode_frame(modem.last_frame().unwrap()).unwrap();
    assert_eq!(frame.kind, 1);
}
