//! Deterministic in-memory page used by tests and the `demo` command.
//!
//! A [`SimulatedBrowser`] holds one shared window state. It hands out a
//! [`SimulatedPage`] (page-side primitives) and a [`SimulatedCapturer`]
//! (agent-side viewport grabs) that both see the same scroll offset, the way
//! a real content script and a real extension background do.
//!
//! Page content is a pure function of page coordinates ([`pixel_at`]), so a
//! composite can be checked pixel by pixel without storing the whole page.
//! Scrolling is clamped to the scrollable range like a browser does.

use crate::agent::ViewportCapturer;
use crate::geometry::{PageGeometry, PageMetrics, ScrollPosition, ViewportGeometry};
use crate::page::PageContext;
use crate::{Error, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};

/// Colour drawn outside the page's content (past the scrollable extent)
pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Page content at `(x, y)` in page coordinates.
pub fn pixel_at(x: u32, y: u32) -> Rgba<u8> {
    Rgba([(x % 251) as u8, (y % 241) as u8, ((x / 64 + y / 64) % 256) as u8, 255])
}

#[derive(Debug)]
struct SimState {
    page: PageGeometry,
    viewport: ViewportGeometry,
    scroll: ScrollPosition,
    overflow: String,
    scroll_log: Vec<ScrollPosition>,
    overflow_log: Vec<String>,
    captures: usize,
    fail_capture_at: Option<(usize, String)>,
    corrupt_capture_at: Option<usize>,
}

/// Shared window state plus test inspection hooks.
#[derive(Clone)]
pub struct SimulatedBrowser {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBrowser {
    pub fn new(page: PageGeometry, viewport: ViewportGeometry) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                page,
                viewport,
                scroll: ScrollPosition::default(),
                overflow: String::new(),
                scroll_log: Vec::new(),
                overflow_log: Vec::new(),
                captures: 0,
                fail_capture_at: None,
                corrupt_capture_at: None,
            })),
        }
    }

    /// Page-side handle
    pub fn page(&self) -> SimulatedPage {
        SimulatedPage { state: self.state.clone() }
    }

    /// Agent-side handle
    pub fn capturer(&self) -> SimulatedCapturer {
        SimulatedCapturer { state: self.state.clone() }
    }

    /// Make the zero-based `index`-th capture fail with `reason`.
    pub fn fail_capture_at(&self, index: usize, reason: impl Into<String>) {
        if let Ok(mut s) = self.state.lock() {
            s.fail_capture_at = Some((index, reason.into()));
        }
    }

    /// Make the zero-based `index`-th capture return undecodable bytes.
    pub fn corrupt_capture_at(&self, index: usize) {
        if let Ok(mut s) = self.state.lock() {
            s.corrupt_capture_at = Some(index);
        }
    }

    /// Set the scroll offset directly (user scrolled before the session).
    pub fn set_scroll(&self, pos: ScrollPosition) {
        if let Ok(mut s) = self.state.lock() {
            s.scroll = clamp_scroll(&s, pos);
        }
    }

    /// Set the page's inline root overflow without recording it.
    pub fn set_overflow(&self, value: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.overflow = value.to_string();
        }
    }

    pub fn scroll(&self) -> ScrollPosition {
        self.state.lock().map(|s| s.scroll).unwrap_or_default()
    }

    pub fn overflow(&self) -> String {
        self.state.lock().map(|s| s.overflow.clone()).unwrap_or_default()
    }

    /// Every `scroll_to` target requested, in order (before clamping).
    pub fn scroll_log(&self) -> Vec<ScrollPosition> {
        self.state.lock().map(|s| s.scroll_log.clone()).unwrap_or_default()
    }

    /// Every overflow value written through the page handle, in order.
    pub fn overflow_log(&self) -> Vec<String> {
        self.state.lock().map(|s| s.overflow_log.clone()).unwrap_or_default()
    }

    pub fn capture_count(&self) -> usize {
        self.state.lock().map(|s| s.captures).unwrap_or_default()
    }
}

fn clamp_scroll(s: &SimState, pos: ScrollPosition) -> ScrollPosition {
    let max_x = s.page.width.saturating_sub(s.viewport.width);
    let max_y = s.page.height.saturating_sub(s.viewport.height);
    ScrollPosition::new(pos.x.min(max_x), pos.y.min(max_y))
}

fn lock(state: &Mutex<SimState>) -> Result<MutexGuard<'_, SimState>> {
    state
        .lock()
        .map_err(|e| Error::Other(format!("simulated window state poisoned: {}", e)))
}

/// Page-side view of a [`SimulatedBrowser`]
pub struct SimulatedPage {
    state: Arc<Mutex<SimState>>,
}

impl PageContext for SimulatedPage {
    fn page_metrics(&mut self) -> Result<PageMetrics> {
        let s = lock(&self.state)?;
        // Body offset size excludes the part that only overflow reaches.
        Ok(PageMetrics {
            body_scroll_width: s.page.width,
            body_scroll_height: s.page.height,
            body_offset_width: s.page.width.min(s.viewport.width),
            body_offset_height: s.page.height.saturating_sub(16),
            html_client_width: s.viewport.width,
            html_client_height: s.viewport.height,
            html_scroll_width: s.page.width.max(s.viewport.width),
            html_scroll_height: s.page.height.max(s.viewport.height),
            html_offset_width: s.viewport.width,
            html_offset_height: s.page.height,
        })
    }

    fn viewport(&mut self) -> Result<ViewportGeometry> {
        Ok(lock(&self.state)?.viewport)
    }

    fn scroll_position(&mut self) -> Result<ScrollPosition> {
        Ok(lock(&self.state)?.scroll)
    }

    fn scroll_to(&mut self, pos: ScrollPosition) -> Result<()> {
        let mut s = lock(&self.state)?;
        s.scroll_log.push(pos);
        s.scroll = clamp_scroll(&s, pos);
        Ok(())
    }

    fn root_overflow(&mut self) -> Result<String> {
        Ok(lock(&self.state)?.overflow.clone())
    }

    fn set_root_overflow(&mut self, value: &str) -> Result<()> {
        let mut s = lock(&self.state)?;
        s.overflow = value.to_string();
        s.overflow_log.push(value.to_string());
        Ok(())
    }
}

/// Agent-side view of a [`SimulatedBrowser`]: renders the visible window to PNG.
pub struct SimulatedCapturer {
    state: Arc<Mutex<SimState>>,
}

impl ViewportCapturer for SimulatedCapturer {
    fn capture_visible(&mut self) -> Result<Vec<u8>> {
        let (viewport, page, scroll, index, fail, corrupt) = {
            let mut s = lock(&self.state)?;
            let index = s.captures;
            s.captures += 1;
            (s.viewport, s.page, s.scroll, index, s.fail_capture_at.clone(), s.corrupt_capture_at)
        };

        if let Some((at, reason)) = fail {
            if at == index {
                return Err(Error::CaptureFailed(reason));
            }
        }
        if corrupt == Some(index) {
            return Ok(b"\x89PNG\r\n\x1a\nnot really".to_vec());
        }

        let img = RgbaImage::from_fn(viewport.width, viewport.height, |vx, vy| {
            let (x, y) = (scroll.x + vx, scroll.y + vy);
            if x < page.width && y < page.height {
                pixel_at(x, y)
            } else {
                BACKGROUND
            }
        });

        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .map_err(|e| Error::CaptureFailed(format!("failed to encode viewport: {}", e)))?;
        Ok(out.into_inner())
    }
}
