//! Chrome DevTools Protocol backend (uses the `headless_chrome` crate)
//!
//! One launched Chrome with one tab. The tab is shared by a [`CdpPage`]
//! (script evaluation for measuring, scrolling and restyling) and a
//! [`CdpCapturer`] (`Page.captureScreenshot` of the visible viewport).

use crate::agent::ViewportCapturer;
use crate::geometry::{PageMetrics, ScrollPosition, ViewportGeometry};
use crate::page::PageContext;
use crate::{CaptureConfig, Error, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const MEASURE_PAGE: &str = r#"JSON.stringify((function() {
    const body = document.body || document.documentElement;
    const html = document.documentElement;
    return {
        bodyScrollWidth: body.scrollWidth, bodyScrollHeight: body.scrollHeight,
        bodyOffsetWidth: body.offsetWidth, bodyOffsetHeight: body.offsetHeight,
        htmlClientWidth: html.clientWidth, htmlClientHeight: html.clientHeight,
        htmlScrollWidth: html.scrollWidth, htmlScrollHeight: html.scrollHeight,
        htmlOffsetWidth: html.offsetWidth, htmlOffsetHeight: html.offsetHeight
    };
})())"#;

const MEASURE_VIEWPORT: &str =
    "JSON.stringify({ width: window.innerWidth, height: window.innerHeight })";

// Right-to-left pages report a negative scrollX; tiles only live at x >= 0.
const READ_SCROLL: &str = r#"JSON.stringify({
    x: Math.max(0, Math.round(window.pageXOffset || document.documentElement.scrollLeft || 0)),
    y: Math.max(0, Math.round(window.pageYOffset || document.documentElement.scrollTop || 0))
})"#;

/// A launched headless Chrome with a single tab
pub struct CdpBrowser {
    browser: Browser,
    tab: Arc<Tab>,
}

impl CdpBrowser {
    /// Launch Chrome with a window sized to `config.viewport`.
    pub fn launch(config: &CaptureConfig) -> Result<Self> {
        // Size the window so the viewport matches the configured tile size
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        // Launch the browser
        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        // One tab is shared by the page side and the capturer
        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        Ok(Self { browser, tab })
    }

    /// Navigate and wait for the load to settle.
    pub fn navigate(&self, url: &str) -> Result<()> {
        // Navigate and wait for the load event
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::CdpError(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::CdpError(format!("Wait for navigation failed: {}", e)))?;
        // Give late layout a moment before anything is measured.
        std::thread::sleep(Duration::from_millis(500));
        debug!("Navigated to {}", self.tab.get_url());
        Ok(())
    }

    pub fn page(&self) -> CdpPage {
        CdpPage { tab: self.tab.clone() }
    }

    pub fn capturer(&self) -> CdpCapturer {
        CdpCapturer { tab: self.tab.clone() }
    }

    /// Drop the tab and terminate the Chrome process.
    pub fn close(self) -> Result<()> {
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}

/// Page-side primitives over CDP script evaluation
pub struct CdpPage {
    tab: Arc<Tab>,
}

impl CdpPage {
    fn eval_value(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| Error::PageError(format!("Evaluation failed: {}", e)))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    /// Evaluate a script that returns `JSON.stringify(...)` and decode it.
    fn eval_json<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        match self.eval_value(script)? {
            serde_json::Value::String(s) => Ok(serde_json::from_str(&s)?),
            other => Err(Error::PageError(format!("expected a JSON string, got {}", other))),
        }
    }
}

#[derive(Deserialize)]
struct Size {
    width: u32,
    height: u32,
}

impl PageContext for CdpPage {
    fn page_metrics(&mut self) -> Result<PageMetrics> {
        self.eval_json(MEASURE_PAGE)
    }

    fn viewport(&mut self) -> Result<ViewportGeometry> {
        let size: Size = self.eval_json(MEASURE_VIEWPORT)?;
        Ok(ViewportGeometry { width: size.width, height: size.height })
    }

    fn scroll_position(&mut self) -> Result<ScrollPosition> {
        self.eval_json(READ_SCROLL)
    }

    fn scroll_to(&mut self, pos: ScrollPosition) -> Result<()> {
        self.eval_value(&format!("window.scrollTo({}, {})", pos.x, pos.y))?;
        Ok(())
    }

    fn root_overflow(&mut self) -> Result<String> {
        match self.eval_value("document.documentElement.style.overflow")? {
            serde_json::Value::String(s) => Ok(s),
            _ => Ok(String::new()),
        }
    }

    fn set_root_overflow(&mut self, value: &str) -> Result<()> {
        // Round-trip through JSON so the value is a safe JS string literal.
        let literal = serde_json::to_string(value)?;
        self.eval_value(&format!("document.documentElement.style.overflow = {}", literal))?;
        Ok(())
    }
}

/// Agent-side capture of the visible viewport
pub struct CdpCapturer {
    tab: Arc<Tab>,
}

impl ViewportCapturer for CdpCapturer {
    fn capture_visible(&mut self) -> Result<Vec<u8>> {
        // from_surface=true so the shot reflects what is painted right now
        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| Error::CaptureFailed(format!("Screenshot failed: {}", e)))
    }
}
