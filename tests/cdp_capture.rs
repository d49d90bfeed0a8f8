//! Capture sessions against a real headless Chrome
#![cfg(feature = "cdp")]

use fullshot::agent::{CaptureAgent, ViewportCapturer};
use fullshot::artifact::MemorySink;
use fullshot::cdp::CdpBrowser;
use fullshot::geometry::ScrollPosition;
use fullshot::page::PageContext;
use fullshot::{CaptureConfig, CaptureOptions, StartOutcome, TilingDriver, Viewport};
use std::sync::Arc;

/// 3000px of vertical gradient, no margins.
const TALL_PAGE: &str = "data:text/html,<html><body style='margin:0'>\
<div style='width:100%;height:3000px;background:linear-gradient(red,blue)'></div>\
</body></html>";

fn config() -> CaptureConfig {
    CaptureConfig {
        viewport: Viewport { width: 800, height: 600 },
        ..CaptureConfig::default()
    }
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_page_primitives() {
    let browser = CdpBrowser::launch(&config()).expect("Failed to launch Chrome");
    browser.navigate(TALL_PAGE).expect("Failed to load page");
    let mut page = browser.page();

    let geometry = page.page_metrics().unwrap().page_geometry();
    assert!(geometry.height >= 3000, "measured {:?}", geometry);
    let viewport = page.viewport().unwrap();
    assert!(viewport.width > 0 && viewport.height > 0);

    page.scroll_to(ScrollPosition::new(0, 700)).unwrap();
    assert_eq!(page.scroll_position().unwrap(), ScrollPosition::new(0, 700));

    assert_eq!(page.root_overflow().unwrap(), "");
    page.set_root_overflow("hidden").unwrap();
    assert_eq!(page.root_overflow().unwrap(), "hidden");
    page.set_root_overflow("").unwrap();

    let png = browser.capturer().capture_visible().unwrap();
    assert_eq!(&png[0..8], b"\x89PNG\r\n\x1a\n");

    browser.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Chrome to be installed
async fn test_full_session_on_a_tall_page() {
    let config = config();
    let browser = CdpBrowser::launch(&config).expect("Failed to launch Chrome");
    browser.navigate(TALL_PAGE).expect("Failed to load page");

    let mut page = browser.page();
    let viewport = page.viewport().unwrap();
    page.scroll_to(ScrollPosition::new(0, 250)).unwrap();
    page.set_root_overflow("scroll").unwrap();

    let sink = MemorySink::new();
    let driver = TilingDriver::new(browser.page(), CaptureAgent::spawn(browser.capturer()), config)
        .with_sink(Arc::new(sink.clone()));

    let artifact = match driver.start_capture(CaptureOptions::default()).await {
        StartOutcome::Completed(a) => a,
        other => panic!("expected completion, got {:?}", other),
    };

    // The composite is whole tiles in both directions.
    assert_eq!(artifact.width % viewport.width, 0);
    assert_eq!(artifact.height % viewport.height, 0);
    assert!(artifact.height >= 3000);
    let (_, data) = sink.items().pop().unwrap();
    let composite = image::load_from_memory(&data).unwrap();
    assert_eq!((composite.width(), composite.height()), (artifact.width, artifact.height));

    // Page is back the way it was.
    assert_eq!(page.scroll_position().unwrap(), ScrollPosition::new(0, 250));
    assert_eq!(page.root_overflow().unwrap(), "scroll");

    browser.close().unwrap();
}
