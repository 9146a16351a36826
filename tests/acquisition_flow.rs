use std::sync::{Arc, Mutex};
use std::time::Duration;

use dass_acquisition::config::AcquisitionMode;
use dass_acquisition::{
    AcquisitionError, AcquisitionService, ChannelConfig, ChannelQuality, Config, ConnectionState, CsvLogSink, DataType,
    ErrorKind, MockTransport, RegisterEntry, Sample, SampleSink, SchedulerState, StopReason, Transport,
};

#[derive(Debug, Clone)]
enum Event {
    Sample(Sample),
    State(ConnectionState),
    Error(ErrorKind),
    Closed,
}

#[derive(Clone, Default)]
struct Collector {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Collector {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn samples(&self) -> Vec<Sample> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Sample(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn states(&self) -> Vec<ConnectionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl SampleSink for Collector {
    fn name(&self) -> &str {
        "collector"
    }

    fn on_sample(&mut self, sample: Sample) {
        self.events.lock().unwrap().push(Event::Sample(sample));
    }

    fn on_state_change(&mut self, state: ConnectionState) {
        self.events.lock().unwrap().push(Event::State(state));
    }

    fn on_error(&mut self, kind: ErrorKind, _detail: &str) {
        self.events.lock().unwrap().push(Event::Error(kind));
    }

    fn on_close(&mut self) {
        self.events.lock().unwrap().push(Event::Closed);
    }
}

/// Takes a long time over every sample.
struct SlowSink;

impl SampleSink for SlowSink {
    fn name(&self) -> &str {
        "slow"
    }

    fn on_sample(&mut self, _sample: Sample) {
        std::thread::sleep(Duration::from_millis(200));
    }
}

fn config(registers: Vec<RegisterEntry>, interval_ms: u64, threshold: u32) -> Config {
    let mut config = Config::default();
    config.registers = registers;
    config.channels = Vec::new();
    config.serial.timeout_ms = 50;
    config.acquisition.polling_interval_ms = interval_ms;
    config.acquisition.failure_threshold = threshold;
    config.logging.csv_enabled = false;
    config
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_reads_hold_the_last_good_value() {
    let mock = MockTransport::new();
    mock.push_response(1, 0, Ok(vec![10]));
    mock.push_response(1, 0, Err(AcquisitionError::Timeout));
    mock.push_response(1, 0, Err(AcquisitionError::CrcMismatch { received: 1, calculated: 2 }));
    mock.set_registers(1, 0, vec![12]);

    let mut service =
        AcquisitionService::new(config(vec![RegisterEntry::new(1, 0, DataType::Uint16, "Level")], 20, 3)).unwrap();
    let collector = Collector::default();
    service.add_sink(Box::new(collector.clone())).unwrap();
    service.connect_with(Box::new(mock.clone())).unwrap();

    service.start().await.unwrap();
    wait_until("four samples", || collector.samples().len() >= 4).await;
    service.stop().await.unwrap();
    assert_eq!(service.connection_state(), ConnectionState::Connected);
    let stats = service.shutdown().await;

    let samples = collector.samples();
    let values: Vec<f64> = samples.iter().take(4).map(|s| s.values[0]).collect();
    let quality: Vec<ChannelQuality> = samples.iter().take(4).map(|s| s.quality[0]).collect();
    assert_eq!(values, vec![10.0, 10.0, 10.0, 12.0]);
    assert_eq!(
        quality,
        vec![ChannelQuality::Fresh, ChannelQuality::Held, ChannelQuality::Held, ChannelQuality::Fresh]
    );
    assert_eq!(samples[0].channel_names, vec!["Level"]);
    assert_eq!(stats.read_errors, 2);

    let errors: Vec<ErrorKind> = collector
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Error(kind) => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![ErrorKind::Timeout, ErrorKind::CrcMismatch]);
    assert!(matches!(collector.events().last(), Some(Event::Closed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consecutive_failures_escalate_to_error() {
    // No registers configured on the mock: every read times out.
    let mock = MockTransport::new();
    let mut service = AcquisitionService::new(config(
        vec![
            RegisterEntry::new(1, 0, DataType::Uint16, "A"),
            RegisterEntry::new(1, 1, DataType::Uint16, "B"),
        ],
        10,
        3,
    ))
    .unwrap();
    let collector = Collector::default();
    service.add_sink(Box::new(collector.clone())).unwrap();
    service.connect_with(Box::new(mock.clone())).unwrap();
    service.start().await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(5), service.wait()).await.unwrap();
    assert_eq!(reason, Some(StopReason::FailureThreshold));
    assert_eq!(service.connection_state(), ConnectionState::Error);
    assert_eq!(service.scheduler_state(), SchedulerState::Idle);
    assert!(!mock.is_open());

    // An explicit reconnect is required after escalation.
    assert_eq!(service.start().await.unwrap_err(), AcquisitionError::NotConnected);

    let stats = service.shutdown().await;
    assert_eq!(stats.ticks, 3);
    assert_eq!(stats.read_errors, 6);

    let samples = collector.samples();
    assert_eq!(samples.len(), 3);
    for sample in &samples {
        assert!(sample.values.iter().all(|v| v.is_nan()));
        assert!(sample.quality.iter().all(|q| *q == ChannelQuality::Missing));
    }
    assert_eq!(
        collector.states(),
        vec![
            ConnectionState::Connected,
            ConnectionState::Acquiring,
            ConnectionState::Error,
            ConnectionState::Disconnected
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reads_run_in_slave_then_address_order() {
    let mock = MockTransport::new();
    mock.set_registers(2, 0, vec![7]);
    mock.set_registers(1, 10, vec![5]);
    mock.set_registers(1, 2, vec![0x4049, 0x0FDB]);

    let registers = vec![
        RegisterEntry::new(2, 0, DataType::Int16, "Valve"),
        RegisterEntry::new(1, 10, DataType::Uint16, "Pump"),
        RegisterEntry::new(1, 2, DataType::Float32, "Temp"),
    ];
    let mut service = AcquisitionService::new(config(registers, 10, 3)).unwrap();
    let collector = Collector::default();
    service.add_sink(Box::new(collector.clone())).unwrap();
    service.connect_with(Box::new(mock.clone())).unwrap();
    assert_eq!(service.channel_names(), vec!["Temp", "Pump", "Valve"]);

    service.start().await.unwrap();
    wait_until("two samples", || collector.samples().len() >= 2).await;
    service.shutdown().await;

    let order: Vec<(u8, u16, u16)> = mock
        .requests()
        .iter()
        .take(6)
        .map(|r| (r.slave_id, r.address, r.count))
        .collect();
    assert_eq!(order, vec![(1, 2, 2), (1, 10, 1), (2, 0, 1), (1, 2, 2), (1, 10, 1), (2, 0, 1)]);

    let first = &collector.samples()[0];
    assert_eq!(first.channel_names, vec!["Temp", "Pump", "Valve"]);
    assert!((first.values[0] - std::f64::consts::PI).abs() < 1e-6);
    assert_eq!(first.values[1..], [5.0, 7.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_sink_does_not_stall_acquisition() {
    let mock = MockTransport::new();
    mock.set_registers(1, 0, vec![1]);

    let mut config = config(vec![RegisterEntry::new(1, 0, DataType::Uint16, "A")], 10, 3);
    config.acquisition.sink_queue_capacity = 8;
    let mut service = AcquisitionService::new(config).unwrap();
    let collector = Collector::default();
    service.add_sink(Box::new(SlowSink)).unwrap();
    service.add_sink(Box::new(collector.clone())).unwrap();
    service.connect_with(Box::new(mock)).unwrap();

    service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let stats = service.shutdown().await;

    // 30 periods fit in the window; a scheduler held up by the slow sink
    // would manage one tick per 200 ms sample instead.
    assert!(stats.ticks >= 20, "only {} ticks in 300 ms", stats.ticks);
    assert!(stats.sink_overruns > 0);

    // The fast sink sees every sample, in publication order.
    let samples = collector.samples();
    let sequences: Vec<u64> = samples.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, (0..stats.samples_published).collect::<Vec<_>>());

    // Ticks are spaced by the period: never bunched up, and on average no
    // slower than one and a half periods.
    let period = Duration::from_millis(10);
    for pair in samples.windows(2) {
        let gap = pair[1].elapsed - pair[0].elapsed;
        assert!(gap >= period / 2, "ticks {} and {} only {:?} apart", pair[0].sequence, pair[1].sequence, gap);
    }
    let span = samples[samples.len() - 1].elapsed - samples[0].elapsed;
    let mean = span / (samples.len() as u32 - 1);
    assert!(mean <= period * 3 / 2, "mean tick spacing {:?} for a {:?} period", mean, period);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configuration_is_locked_while_running() {
    let mock = MockTransport::new();
    mock.set_registers(1, 0, vec![1]);
    let mut service =
        AcquisitionService::new(config(vec![RegisterEntry::new(1, 0, DataType::Uint16, "A")], 10, 3)).unwrap();

    assert_eq!(service.start().await.unwrap_err(), AcquisitionError::NotConnected);

    service.connect_with(Box::new(mock.clone())).unwrap();
    let session = service.start().await.unwrap();
    assert_eq!(service.session_id(), Some(session));
    assert_eq!(service.connection_state(), ConnectionState::Acquiring);
    assert_eq!(service.scheduler_state(), SchedulerState::Running);

    let locked = Err(AcquisitionError::ConfigurationLocked);
    assert_eq!(service.set_register_map(vec![RegisterEntry::new(1, 5, DataType::Int16, "B")]), locked);
    assert_eq!(service.set_channel_config(vec![ChannelConfig::new(0, "A")]), locked);
    assert_eq!(service.add_sink(Box::new(Collector::default())), locked);
    assert_eq!(service.connect_with(Box::new(MockTransport::new())), locked);
    assert_eq!(service.start().await, Err(AcquisitionError::ConfigurationLocked));

    service.stop().await.unwrap();
    assert_eq!(service.scheduler_state(), SchedulerState::Idle);
    assert_eq!(service.connection_state(), ConnectionState::Connected);
    service
        .set_register_map(vec![RegisterEntry::new(1, 5, DataType::Int16, "B")])
        .unwrap();

    // The transport came back from the session and can be reused.
    mock.set_registers(1, 5, vec![0xFFFF]);
    service.start().await.unwrap();
    service.stop().await.unwrap();
    assert!(mock.requests().iter().any(|r| r.address == 5));
    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn slow_reads_are_counted_as_overruns() {
    let latency = Duration::from_millis(30);
    let mock = MockTransport::new().with_latency(latency);
    mock.set_registers(1, 0, vec![1]);
    // The paused clock outruns the sink thread; queue every event.
    let mut config = config(vec![RegisterEntry::new(1, 0, DataType::Uint16, "A")], 10, 3);
    config.acquisition.sink_queue_capacity = 256;
    let mut service = AcquisitionService::new(config).unwrap();
    let collector = Collector::default();
    service.add_sink(Box::new(collector.clone())).unwrap();
    service.connect_with(Box::new(mock)).unwrap();

    service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    let stats = service.shutdown().await;

    assert!(stats.overruns >= 7, "expected overruns, got {:?}", stats);
    assert_eq!(stats.read_errors, 0);

    // An overrun re-anchors on the late tick: no burst of catch-up ticks,
    // each tick starts as soon as the previous read returns.
    let samples = collector.samples();
    assert!(samples.len() >= 7, "only {} samples", samples.len());
    for sample in &samples {
        let expected = latency * (sample.sequence as u32 + 1);
        let skew = if sample.elapsed > expected { sample.elapsed - expected } else { expected - sample.elapsed };
        assert!(skew <= Duration::from_millis(1), "sample {} at {:?}", sample.sequence, sample.elapsed);
    }
}

#[tokio::test(start_paused = true)]
async fn ticks_do_not_drift_when_reads_take_part_of_the_period() {
    let period = Duration::from_millis(10);
    let latency = Duration::from_millis(4);
    let mock = MockTransport::new().with_latency(latency);
    mock.set_registers(1, 0, vec![1]);
    // The paused clock outruns the sink thread; queue every event.
    let mut config = config(vec![RegisterEntry::new(1, 0, DataType::Uint16, "A")], 10, 3);
    config.acquisition.sink_queue_capacity = 256;
    let mut service = AcquisitionService::new(config).unwrap();
    let collector = Collector::default();
    service.add_sink(Box::new(collector.clone())).unwrap();
    service.connect_with(Box::new(mock)).unwrap();

    service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(505)).await;
    let stats = service.shutdown().await;

    assert_eq!(stats.overruns, 0);
    let samples = collector.samples();
    assert!(samples.len() >= 50, "only {} samples", samples.len());
    // Sample k is read at k periods plus the read time, however long the
    // session has been running.
    for sample in &samples {
        let expected = period * sample.sequence as u32 + latency;
        let skew = if sample.elapsed > expected { sample.elapsed - expected } else { expected - sample.elapsed };
        assert!(skew <= Duration::from_millis(1), "sample {} at {:?}, expected {:?}", sample.sequence, sample.elapsed, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_finite_values_are_flagged_not_failed() {
    let mock = MockTransport::new();
    mock.push_response(1, 0, Ok(vec![0x4049, 0x0FDB]));
    mock.set_registers(1, 0, vec![0x7FC0, 0x0000]);

    let mut service =
        AcquisitionService::new(config(vec![RegisterEntry::new(1, 0, DataType::Float32, "F")], 10, 1)).unwrap();
    let collector = Collector::default();
    service.add_sink(Box::new(collector.clone())).unwrap();
    service.connect_with(Box::new(mock)).unwrap();

    service.start().await.unwrap();
    wait_until("three samples", || collector.samples().len() >= 3).await;
    let stats = service.shutdown().await;

    let samples = collector.samples();
    assert_eq!(samples[0].quality[0], ChannelQuality::Fresh);
    assert_eq!(samples[1].quality[0], ChannelQuality::NonFinite);
    assert!(samples[1].values[0].is_nan());
    assert_eq!(samples[2].quality[0], ChannelQuality::NonFinite);
    assert_eq!(stats.read_errors, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn raw_serial_lines_become_samples() {
    let mock = MockTransport::new();
    mock.push_raw(Ok(b"1.5,2,3\n".to_vec()));
    mock.push_raw(Ok(b"4,5".to_vec()));
    mock.push_raw(Ok(b",6\n".to_vec()));
    mock.push_raw(Ok(b"7\n".to_vec()));

    let mut config = config(Vec::new(), 10, 10);
    config.acquisition.mode = AcquisitionMode::RawSerial;
    config.acquisition.raw_channel_count = 3;
    config.channels = vec![ChannelConfig::new(0, "Flow").with_calibration(0.0, 1.0, 2.0)];

    let mut service = AcquisitionService::new(config).unwrap();
    assert_eq!(service.channel_names(), vec!["Flow", "CH2", "CH3"]);
    let collector = Collector::default();
    service.add_sink(Box::new(collector.clone())).unwrap();
    service.connect_with(Box::new(mock)).unwrap();

    service.start().await.unwrap();
    wait_until("four samples", || collector.samples().len() >= 4).await;
    service.shutdown().await;

    let samples = collector.samples();
    let values: Vec<Vec<f64>> = samples.iter().take(4).map(|s| s.values.clone()).collect();
    assert_eq!(
        values,
        vec![vec![3.0, 2.0, 3.0], vec![3.0, 2.0, 3.0], vec![8.0, 5.0, 6.0], vec![14.0, 5.0, 6.0]]
    );
    assert!(samples[1].quality.iter().all(|q| *q == ChannelQuality::Held));
    assert_eq!(
        samples[3].quality,
        vec![ChannelQuality::Fresh, ChannelQuality::Held, ChannelQuality::Held]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn csv_log_receives_every_sample() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockTransport::new();
    mock.set_registers(1, 0, vec![42]);

    let mut service =
        AcquisitionService::new(config(vec![RegisterEntry::new(1, 0, DataType::Uint16, "Level")], 10, 3)).unwrap();
    let sink = CsvLogSink::create(dir.path(), &service.channel_names()).unwrap();
    let path = sink.destination().to_string();
    service.add_sink(Box::new(sink)).unwrap();
    service.connect_with(Box::new(mock)).unwrap();

    service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = service.shutdown().await;

    let content = std::fs::read_to_string(path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("Timestamp,Level"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len() as u64, stats.samples_published);
    assert!(rows.iter().all(|r| r.ends_with(",42")));
}
