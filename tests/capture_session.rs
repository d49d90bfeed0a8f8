//! End-to-end capture sessions over the simulated page

use fullshot::agent::CaptureAgent;
use fullshot::artifact::{Artifact, ArtifactSink, MemorySink};
use fullshot::driver::SessionPhase;
use fullshot::geometry::{PageGeometry, ScrollPosition, ViewportGeometry};
use fullshot::sim::{pixel_at, SimulatedBrowser, BACKGROUND};
use fullshot::{CaptureConfig, CaptureOptions, DriverEvent, Error, Result, StartOutcome, TilingDriver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

fn browser(pw: u32, ph: u32, vw: u32, vh: u32) -> SimulatedBrowser {
    SimulatedBrowser::new(
        PageGeometry { width: pw, height: ph },
        ViewportGeometry { width: vw, height: vh },
    )
}

fn drain(rx: &mut UnboundedReceiver<DriverEvent>) -> Vec<DriverEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

fn progress_values(events: &[DriverEvent]) -> Vec<u8> {
    events.iter().filter_map(|e| e.progress()).collect()
}

#[tokio::test]
async fn test_reference_grid_is_captured_and_written_to_disk() {
    // Same proportions as a 2000x3000 page in a 1000x800 window.
    let b = browser(200, 300, 100, 80);
    let tmp = tempfile::tempdir().unwrap();
    let config = CaptureConfig {
        output_dir: tmp.path().to_path_buf(),
        ..CaptureConfig::default().without_delays()
    };
    let (tx, mut rx) = unbounded_channel();
    let driver = TilingDriver::new(b.page(), CaptureAgent::spawn(b.capturer()), config).with_events(tx);

    let artifact = match driver.start_capture(CaptureOptions::default()).await {
        StartOutcome::Completed(a) => a,
        other => panic!("expected completion, got {:?}", other),
    };

    assert_eq!(b.capture_count(), 8);
    assert_eq!((artifact.width, artifact.height), (200, 320));
    assert!(artifact.file_name.starts_with("fullpage-screenshot-"));
    assert!(artifact.file_name.ends_with(".png"));

    let composite = image::open(artifact.path.as_ref().unwrap()).unwrap().to_rgba8();
    assert_eq!(composite.dimensions(), (200, 320));
    // First row is exact.
    assert_eq!(*composite.get_pixel(10, 10), pixel_at(10, 10));
    assert_eq!(*composite.get_pixel(150, 70), pixel_at(150, 70));
    // The last row overhangs the page; the browser clamps the scroll to
    // y=220, so its cell shows page rows 220.. drawn at 240.
    assert_eq!(*composite.get_pixel(150, 250), pixel_at(150, 230));

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&DriverEvent::status("Preparing capture...", 0)));
    assert!(events.contains(&DriverEvent::status("Capturing 8 sections...", 5)));
    assert!(events.contains(&DriverEvent::status("Processing screenshots...", 95)));
    let progress = progress_values(&events);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert_eq!(progress.last(), Some(&100));
    assert!(matches!(events.last(), Some(DriverEvent::Complete { artifact: Some(_) })));
    assert_eq!(events.iter().filter(|e| matches!(e, DriverEvent::Complete { .. })).count(), 1);

    assert_eq!(driver.phase(), SessionPhase::Idle);
    assert!(!driver.is_capturing());
}

#[tokio::test]
async fn test_agent_error_on_fourth_tile_fails_the_session_and_restores_the_page() {
    let b = browser(200, 300, 100, 80);
    b.set_scroll(ScrollPosition::new(37, 120));
    b.set_overflow("auto");
    b.fail_capture_at(3, "Failed to capture tab: image readback failed");

    let sink = MemorySink::new();
    let (tx, mut rx) = unbounded_channel();
    let driver = TilingDriver::new(
        b.page(),
        CaptureAgent::spawn(b.capturer()),
        CaptureConfig::default().without_delays(),
    )
    .with_events(tx)
    .with_sink(Arc::new(sink.clone()));

    let outcome = driver.start_capture(CaptureOptions::default()).await;
    assert_eq!(
        outcome,
        StartOutcome::Failed("Failed to capture tab: image readback failed".into())
    );

    // No more captures after the failing one, nothing delivered.
    assert_eq!(b.capture_count(), 4);
    assert!(sink.is_empty());

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, DriverEvent::Complete { .. })));
    assert_eq!(
        events.last(),
        Some(&DriverEvent::Error { error: "Failed to capture tab: image readback failed".into() })
    );

    // Cleanup ran exactly once: overflow hidden then put back, scroll restored.
    assert_eq!(b.overflow(), "auto");
    assert_eq!(b.overflow_log(), vec!["hidden".to_string(), "auto".to_string()]);
    assert_eq!(b.scroll(), ScrollPosition::new(37, 120));
    assert_eq!(b.scroll_log().last(), Some(&ScrollPosition::new(37, 120)));
    assert!(!driver.is_capturing());

    // The next start runs normally (the injected failure index is behind us).
    match driver.start_capture(CaptureOptions::default()).await {
        StartOutcome::Completed(_) => {}
        other => panic!("expected a fresh session to complete, got {:?}", other),
    }
    assert_eq!(sink.len(), 1);
}

/// Refuses artifacts while the disk is full, then saves into memory.
#[derive(Default)]
struct DiskThatFillsUp {
    full: AtomicBool,
    saved: MemorySink,
}

impl ArtifactSink for DiskThatFillsUp {
    fn deliver(&self, file_name: &str, data: &[u8], width: u32, height: u32) -> Result<Artifact> {
        if self.full.load(Ordering::SeqCst) {
            return Err(Error::Other("disk full".into()));
        }
        self.saved.deliver(file_name, data, width, height)
    }
}

#[tokio::test]
async fn test_failed_save_reports_a_stitching_error_and_restores_the_page() {
    let b = browser(100, 200, 100, 80);
    b.set_scroll(ScrollPosition::new(0, 50));
    b.set_overflow("scroll");

    let disk = Arc::new(DiskThatFillsUp::default());
    disk.full.store(true, Ordering::SeqCst);
    let (tx, mut rx) = unbounded_channel();
    let driver = TilingDriver::new(
        b.page(),
        CaptureAgent::spawn(b.capturer()),
        CaptureConfig::default().without_delays(),
    )
    .with_events(tx)
    .with_sink(disk.clone());

    let error = match driver.start_capture(CaptureOptions::default()).await {
        StartOutcome::Failed(error) => error,
        other => panic!("expected a failure, got {:?}", other),
    };
    assert!(error.starts_with("Stitching failed: could not save fullpage-screenshot-"), "{}", error);
    assert!(error.ends_with("disk full"), "{}", error);
    assert_eq!(b.capture_count(), 3);
    assert!(disk.saved.is_empty());

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, DriverEvent::Complete { .. })));
    assert!(!events.contains(&DriverEvent::status("Screenshot saved", 100)));
    assert_eq!(events.last(), Some(&DriverEvent::Error { error: error.clone() }));

    assert_eq!(b.scroll(), ScrollPosition::new(0, 50));
    assert_eq!(b.overflow(), "scroll");
    assert!(!driver.is_capturing());
    assert_eq!(driver.phase(), SessionPhase::Idle);

    // Space freed up: the next start on the same driver completes.
    disk.full.store(false, Ordering::SeqCst);
    assert!(matches!(
        driver.start_capture(CaptureOptions::default()).await,
        StartOutcome::Completed(_)
    ));
    assert_eq!(disk.saved.len(), 1);
    assert!(matches!(drain(&mut rx).last(), Some(DriverEvent::Complete { artifact: Some(_) })));
    assert_eq!(b.scroll(), ScrollPosition::new(0, 50));
}

#[tokio::test]
async fn test_page_equal_to_viewport_is_one_forced_origin_capture() {
    let b = browser(120, 90, 120, 90);
    b.set_scroll(ScrollPosition::new(0, 0));
    let sink = MemorySink::new();
    let driver = TilingDriver::new(
        b.page(),
        CaptureAgent::spawn(b.capturer()),
        CaptureConfig::default().without_delays(),
    )
    .with_sink(Arc::new(sink.clone()));

    let artifact = match driver.start_capture(CaptureOptions::default()).await {
        StartOutcome::Completed(a) => a,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!((artifact.width, artifact.height), (120, 90));
    assert_eq!(b.capture_count(), 1);
    // Forced scroll to the origin, then the restore.
    assert_eq!(b.scroll_log(), vec![ScrollPosition::new(0, 0), ScrollPosition::new(0, 0)]);
}

#[tokio::test]
async fn test_undecodable_tile_leaves_a_gap_but_completes() {
    let b = browser(200, 80, 100, 80);
    b.corrupt_capture_at(1);
    let sink = MemorySink::new();
    let driver = TilingDriver::new(
        b.page(),
        CaptureAgent::spawn(b.capturer()),
        CaptureConfig::default().without_delays(),
    )
    .with_sink(Arc::new(sink.clone()));

    assert!(matches!(
        driver.start_capture(CaptureOptions::default()).await,
        StartOutcome::Completed(_)
    ));

    let (_, data) = sink.items().pop().unwrap();
    let composite = image::load_from_memory(&data).unwrap().to_rgba8();
    assert_eq!(composite.dimensions(), (200, 80));
    assert_eq!(*composite.get_pixel(50, 40), pixel_at(50, 40));
    assert_eq!(composite.get_pixel(150, 40).0[3], 0);
}

#[tokio::test]
async fn test_off_page_remainder_is_background() {
    // Narrower page than window: the single column shows white past the page.
    let b = browser(60, 50, 100, 80);
    let sink = MemorySink::new();
    let driver = TilingDriver::new(
        b.page(),
        CaptureAgent::spawn(b.capturer()),
        CaptureConfig::default().without_delays(),
    )
    .with_sink(Arc::new(sink.clone()));
    driver.start_capture(CaptureOptions::default()).await;

    let (_, data) = sink.items().pop().unwrap();
    let composite = image::load_from_memory(&data).unwrap().to_rgba8();
    assert_eq!(composite.dimensions(), (100, 80));
    assert_eq!(*composite.get_pixel(90, 70), BACKGROUND);
}

#[tokio::test]
async fn test_scrollbars_left_alone_when_not_requested() {
    let b = browser(100, 100, 100, 50);
    let driver = TilingDriver::new(
        b.page(),
        CaptureAgent::spawn(b.capturer()),
        CaptureConfig::default().without_delays(),
    )
    .with_sink(Arc::new(MemorySink::new()));

    let options = CaptureOptions { include_fixed: true, hide_scrollbars: false };
    assert!(matches!(driver.start_capture(options).await, StartOutcome::Completed(_)));
    assert!(b.overflow_log().is_empty());
}

#[tokio::test]
async fn test_session_survives_a_vanished_control_surface() {
    let b = browser(100, 200, 100, 100);
    let (tx, rx) = unbounded_channel();
    drop(rx);
    let driver = TilingDriver::new(
        b.page(),
        CaptureAgent::spawn(b.capturer()),
        CaptureConfig::default().without_delays(),
    )
    .with_events(tx)
    .with_sink(Arc::new(MemorySink::new()));

    assert!(matches!(
        driver.start_capture(CaptureOptions::default()).await,
        StartOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn test_jpeg_output() {
    let b = browser(100, 100, 100, 100);
    let sink = MemorySink::new();
    let config = CaptureConfig {
        output_format: fullshot::OutputFormat::Jpeg { quality: 85 },
        ..CaptureConfig::default().without_delays()
    };
    let driver = TilingDriver::new(b.page(), CaptureAgent::spawn(b.capturer()), config)
        .with_sink(Arc::new(sink.clone()));

    let artifact = match driver.start_capture(CaptureOptions::default()).await {
        StartOutcome::Completed(a) => a,
        other => panic!("unexpected {:?}", other),
    };
    assert!(artifact.file_name.ends_with(".jpg"));
    let (_, data) = sink.items().pop().unwrap();
    assert_eq!(&data[0..2], &[0xFF, 0xD8]);
}
