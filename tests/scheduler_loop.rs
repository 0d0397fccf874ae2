use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};

use live_overlay::detect::{DetectorBackend, RawDetection, StubBackend};
use live_overlay::ingest::{SourceConfig, SyntheticSource};
use live_overlay::{
    AdaptiveScheduler, Dimensions, RecordingSink, SchedulerConfig, Session, SessionState,
    SystemClock,
};

fn camera(width: u32, height: u32) -> Result<SyntheticSource> {
    let mut source = SyntheticSource::new(SourceConfig {
        url: "stub://loop".to_string(),
        fps: 30,
        width,
        height,
    })?;
    source.connect()?;
    Ok(source)
}

fn scheduler(
    detector: Box<dyn DetectorBackend>,
    sink: &RecordingSink,
) -> Result<AdaptiveScheduler> {
    let config = SchedulerConfig {
        working_size: Dimensions::new(32, 24),
        ..SchedulerConfig::default()
    };
    Ok(AdaptiveScheduler::new(
        config,
        Box::new(camera(64, 48)?),
        detector,
        Arc::new(SystemClock),
    )?
    .with_renderer(Box::new(sink.clone()))
    .with_telemetry(Box::new(sink.clone())))
}

#[test]
fn session_runs_until_closed() -> Result<()> {
    let sink = RecordingSink::new();
    let detector = StubBackend::new().with_latency(Duration::from_millis(5));
    let scheduler = scheduler(Box::new(detector), &sink)?;
    let (session, handle) = Session::new(scheduler, Arc::new(SystemClock));

    handle.connected()?;
    handle.stream_acquired()?;
    let closer = handle.clone();
    let timer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(400));
        closer.close()
    });

    let summary = session.run();
    timer.join().map_err(|_| anyhow!("closer thread panicked"))??;

    assert_eq!(summary.state, SessionState::Closed);
    assert!(summary.id.starts_with("session-"));
    assert!(summary.frames_processed >= 2, "{:?}", summary);
    assert_eq!(summary.stats.completed, summary.frames_processed);
    assert_eq!(summary.stats.failed, 0);

    let renders = sink.renders();
    let snapshots = sink.snapshots();
    assert_eq!(renders.len() as u64, summary.frames_processed);
    assert_eq!(snapshots.len(), renders.len());

    // Default stub object spans x 0.25..0.55; working 32px wide, display 64px.
    let first = &renders[0][0];
    assert_eq!(first.label, "person");
    assert!((first.bbox.x - 16.0).abs() < 0.01, "{:?}", first.bbox);
    assert!((first.bbox.width - 19.2).abs() < 0.01, "{:?}", first.bbox);

    for (i, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.frames_processed, i as u64 + 1);
        assert!(snapshot.p95_latency_ms >= 5);
    }
    Ok(())
}

/// Counts calls and fails every one; asserts it is never entered twice.
struct FailingDetector {
    calls: Arc<AtomicU64>,
    in_flight: AtomicBool,
}

impl DetectorBackend for FailingDetector {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<RawDetection>> {
        assert!(!self.in_flight.swap(true, Ordering::SeqCst));
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
        self.in_flight.store(false, Ordering::SeqCst);
        Err(anyhow!("model unavailable"))
    }
}

#[test]
fn failing_detector_keeps_the_loop_alive() -> Result<()> {
    let sink = RecordingSink::new();
    let calls = Arc::new(AtomicU64::new(0));
    let detector = FailingDetector {
        calls: calls.clone(),
        in_flight: AtomicBool::new(false),
    };
    let scheduler = scheduler(Box::new(detector), &sink)?;
    let (session, handle) = Session::new(scheduler, Arc::new(SystemClock));

    handle.connected()?;
    handle.stream_acquired()?;
    let closer = handle.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(450));
        let _ = closer.error("peer vanished");
    });

    let summary = session.run();
    assert_eq!(summary.state, SessionState::Closed);
    assert_eq!(summary.frames_processed, 0);
    assert!(summary.stats.failed >= 2, "{:?}", summary);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        summary.stats.failed + summary.stats.discarded
    );
    assert!(sink.renders().is_empty());
    Ok(())
}

#[test]
fn stream_before_connection_does_not_start_the_loop() -> Result<()> {
    let sink = RecordingSink::new();
    let scheduler = scheduler(Box::new(StubBackend::new()), &sink)?;
    let (session, handle) = Session::new(scheduler, Arc::new(SystemClock));
    handle.stream_acquired()?;
    let closer = handle.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let _ = closer.close();
    });

    let summary = session.run();
    assert_eq!(summary.state, SessionState::Closed);
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(summary.stats.completed, 0);
    assert!(sink.renders().is_empty());
    Ok(())
}

#[test]
fn dropping_every_handle_closes_the_session() -> Result<()> {
    let sink = RecordingSink::new();
    let scheduler = scheduler(Box::new(StubBackend::new()), &sink)?;
    let (session, handle) = Session::new(scheduler, Arc::new(SystemClock));
    handle.connected()?;
    drop(handle);

    let summary = session.run();
    assert_eq!(summary.state, SessionState::Closed);
    assert_eq!(summary.frames_processed, 0);
    Ok(())
}

#[test]
fn slow_detector_paces_the_loop() -> Result<()> {
    let sink = RecordingSink::new();
    let detector = StubBackend::new().with_latency(Duration::from_millis(250));
    let scheduler = scheduler(Box::new(detector), &sink)?;
    let (session, handle) = Session::new(scheduler, Arc::new(SystemClock));

    handle.connected()?;
    handle.stream_acquired()?;
    let closer = handle.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(600));
        let _ = closer.close();
    });

    let summary = session.run();
    assert!(summary.frames_processed >= 1);
    // 250ms per call plus a delay capped at 200ms leaves room for three calls.
    assert!(summary.frames_processed <= 3, "{:?}", summary);
    for snapshot in sink.snapshots() {
        assert!(snapshot.latency_ms >= 250);
    }
    Ok(())
}
