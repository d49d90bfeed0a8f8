//! Tiling driver: one capture session at a time, from measurement to artifact.
//!
//! Lifecycle of a session:
//!
//! ```text
//! Idle -> Preparing -> Capturing(0..n) -> Stitching -> Done
//!                            \------------------------> Failed
//! ```
//!
//! Cleanup (root overflow, scroll position, the capturing flag) runs exactly
//! once on every exit path, before the terminal `complete`/`error` event is
//! emitted, so a control surface reacting to that event can start again.

use crate::agent::AgentHandle;
use crate::artifact::{artifact_file_name, Artifact, ArtifactSink, DownloadDir};
use crate::geometry::{ScrollPosition, Tile, TileGrid};
use crate::message::{ControlMessage, DriverEvent};
use crate::page::{PageContext, HIDDEN_OVERFLOW};
use crate::stitch::{self, CapturedTile};
use crate::{CaptureConfig, CaptureOptions, Error, Result};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// Where a driver currently is in its session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Preparing,
    /// Working on the tile with this capture index
    Capturing(usize),
    Stitching,
    Done,
    Failed,
}

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Completed(Artifact),
    /// The session failed; carries the text of the `error` event
    Failed(String),
    /// A session was already running; nothing happened
    Ignored,
}

/// State owned by one in-flight session.
#[derive(Debug)]
struct CaptureSession {
    options: CaptureOptions,
    /// Scroll offset to return to; `None` until it has been read
    original_scroll: Option<ScrollPosition>,
    /// Root overflow to put back; `None` when nothing was changed
    saved_overflow: Option<String>,
    /// Planned tiles; set once the page has been measured
    grid: Option<TileGrid>,
    captured: Vec<CapturedTile>,
}

impl CaptureSession {
    fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            original_scroll: None,
            saved_overflow: None,
            grid: None,
            captured: Vec::new(),
        }
    }

    fn tiles(&self) -> &[Tile] {
        self.grid.as_ref().map_or(&[], |g| g.tiles.as_slice())
    }
}

/// Outbound event channel; a vanished listener is not an error.
#[derive(Clone, Default)]
struct EventSink {
    tx: Option<UnboundedSender<DriverEvent>>,
}

impl EventSink {
    fn emit(&self, event: DriverEvent) {
        let Some(tx) = &self.tx else { return };
        if let Err(e) = tx.send(event) {
            debug!("No listener for driver event, dropped: {:?}", e.0);
        }
    }

    fn status(&self, status: impl Into<String>, progress: u8) {
        self.emit(DriverEvent::status(status, progress));
    }
}

/// Progress after the tile with capture index `index` (of `total`) is in.
///
/// The capture phase spans 5..=95; the last tile lands exactly on 95.
pub fn capture_progress(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 95;
    }
    let done = (index + 1).min(total);
    (5 + (90 * done + total / 2) / total) as u8
}

/// Clears the capturing flag even if the session future is dropped midway.
struct CapturingFlag<'a>(&'a AtomicBool);

impl Drop for CapturingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives capture sessions for one page context.
pub struct TilingDriver<P: PageContext> {
    page: Mutex<P>,
    agent: AgentHandle,
    sink: Arc<dyn ArtifactSink>,
    config: CaptureConfig,
    events: EventSink,
    capturing: AtomicBool,
    phase: std::sync::Mutex<SessionPhase>,
}

impl<P: PageContext> TilingDriver<P> {
    /// Create a driver that writes artifacts to `config.output_dir`.
    pub fn new(page: P, agent: AgentHandle, config: CaptureConfig) -> Self {
        let sink = Arc::new(DownloadDir::new(&config.output_dir));
        Self {
            page: Mutex::new(page),
            agent,
            sink,
            config,
            events: EventSink::default(),
            capturing: AtomicBool::new(false),
            phase: std::sync::Mutex::new(SessionPhase::Idle),
        }
    }

    /// Send status/complete/error events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<DriverEvent>) -> Self {
        self.events = EventSink { tx: Some(tx) };
        self
    }

    /// Deliver artifacts somewhere other than the output directory.
    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.lock().map(|p| *p).unwrap_or(SessionPhase::Idle)
    }

    fn set_phase(&self, phase: SessionPhase) {
        if let Ok(mut p) = self.phase.lock() {
            debug!("Session phase {:?} -> {:?}", *p, phase);
            *p = phase;
        }
    }

    /// Run one full capture session.
    ///
    /// Returns `StartOutcome::Ignored` straight away when a session is
    /// already active; no events are emitted in that case.
    pub async fn start_capture(&self, options: CaptureOptions) -> StartOutcome {
        if self
            .capturing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Capture already in progress, ignoring start request");
            return StartOutcome::Ignored;
        }
        let flag = CapturingFlag(&self.capturing);

        info!(
            "Starting capture session (hide_scrollbars={}, include_fixed={})",
            options.hide_scrollbars, options.include_fixed
        );
        let mut page = self.page.lock().await;
        let mut session = CaptureSession::new(options);

        self.set_phase(SessionPhase::Preparing);
        self.events.status("Preparing capture...", 0);

        let result = self.run_session(&mut *page, &mut session).await;

        self.set_phase(if result.is_ok() { SessionPhase::Done } else { SessionPhase::Failed });
        restore_page(&mut *page, &session);
        drop(page);
        self.set_phase(SessionPhase::Idle);
        drop(flag);

        match result {
            Ok(artifact) => {
                info!("Capture session finished: {}", artifact.location());
                self.events.emit(DriverEvent::Complete { artifact: Some(artifact.location()) });
                StartOutcome::Completed(artifact)
            }
            Err(e) => {
                let text = e.event_text();
                warn!("Capture session failed: {}", text);
                self.events.emit(DriverEvent::Error { error: text.clone() });
                StartOutcome::Failed(text)
            }
        }
    }

    async fn run_session(&self, page: &mut P, session: &mut CaptureSession) -> Result<Artifact> {
        // Remember where the user was before anything moves
        session.original_scroll = Some(page.scroll_position()?);

        // Hide scrollbars for the duration of the session
        if session.options.hide_scrollbars {
            session.saved_overflow = Some(page.root_overflow()?);
            page.set_root_overflow(HIDDEN_OVERFLOW)?;
        }
        if session.options.include_fixed {
            debug!("include_fixed requested; fixed-position content is captured as rendered");
        }

        // Measure the page and plan the tiles
        let page_geometry = page.page_metrics()?.page_geometry();
        let viewport = page.viewport()?;
        if viewport.width == 0 || viewport.height == 0 {
            return Err(Error::PageError(format!(
                "viewport has no area ({}x{})",
                viewport.width, viewport.height
            )));
        }
        let grid = TileGrid::compute(page_geometry, viewport);
        info!(
            "Page {}x{}, viewport {}x{}: {} cols x {} rows",
            page_geometry.width, page_geometry.height, viewport.width, viewport.height, grid.cols, grid.rows
        );
        session.grid = Some(grid);

        let total = session.tiles().len();
        self.events.status(format!("Capturing {} sections...", total), 5);

        // Scroll, settle and capture each tile in row-major order
        for index in 0..total {
            let tile = session.tiles()[index];
            self.set_phase(SessionPhase::Capturing(index));
            self.settle_at(page, index, &tile).await?;

            let image = self.agent.capture().await?;
            debug!("Captured tile {} ({} bytes)", index, image.len());
            session.captured.push(CapturedTile { image, tile, index });

            self.events.status(
                format!("Captured section {} of {}", index + 1, total),
                capture_progress(index, total),
            );
        }

        self.set_phase(SessionPhase::Stitching);
        self.events.status("Processing screenshots...", 95);

        // Stitch everything that was captured
        let captured = std::mem::take(&mut session.captured);
        let grid = session
            .grid
            .as_ref()
            .ok_or_else(|| Error::StitchFailed("no tile grid was planned".into()))?;
        let composite = stitch::stitch(grid, captured).await?;
        if !composite.missing.is_empty() {
            warn!("Composite has {} blank tile(s): {:?}", composite.missing.len(), composite.missing);
        }

        // Encode off the async workers
        let format = self.config.output_format;
        let (width, height) = composite.dimensions();
        let data = tokio::task::spawn_blocking(move || stitch::encode(&composite, format))
            .await
            .map_err(|e| Error::StitchFailed(format!("encoder task failed: {}", e)))??;

        // Hand the file over
        let file_name = artifact_file_name(&self.config.file_prefix, format);
        let artifact = self
            .sink
            .deliver(&file_name, &data, width, height)
            .map_err(|e| Error::StitchFailed(format!("could not save {}: {}", file_name, e)))?;

        self.events.status("Screenshot saved", 100);
        Ok(artifact)
    }

    /// Bring `tile` into view and wait for the page to paint.
    async fn settle_at(&self, page: &mut P, index: usize, tile: &Tile) -> Result<()> {
        let delay_ms = if index == 0 {
            // Always go to the origin first so every session starts aligned.
            page.scroll_to(ScrollPosition::default())?;
            self.config.first_settle_ms
        } else {
            let target = tile.position();
            let current = page.scroll_position()?;
            if current.is_near(target, self.config.scroll_tolerance_px) {
                self.config.short_settle_ms
            } else {
                page.scroll_to(target)?;
                self.config.scroll_settle_ms
            }
        };
        debug!("Tile {} at {},{}: settling {}ms", index, tile.x, tile.y, delay_ms);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(())
    }
}

impl<P: PageContext + 'static> TilingDriver<P> {
    /// Consume start commands until the channel closes.
    ///
    /// Each start runs as its own task so that commands arriving mid-session
    /// reach the re-entrancy guard (and are dropped) instead of queueing.
    pub async fn serve(self: Arc<Self>, mut rx: UnboundedReceiver<ControlMessage>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                ControlMessage::StartCapture { options } => {
                    let driver = self.clone();
                    tokio::spawn(async move {
                        driver.start_capture(options).await;
                    });
                }
            }
        }
        debug!("Control channel closed, driver loop exiting");
    }
}

/// Put back everything the session changed. Failures are logged, not raised:
/// the session's own outcome is what gets reported.
fn restore_page<P: PageContext>(page: &mut P, session: &CaptureSession) {
    if let Some(overflow) = &session.saved_overflow {
        if let Err(e) = page.set_root_overflow(overflow) {
            warn!("Failed to restore root overflow: {}", e);
        }
    }
    if let Some(pos) = session.original_scroll {
        if let Err(e) = page.scroll_to(pos) {
            warn!("Failed to restore scroll position: {}", e);
        }
    }
}

/// Holds the single driver of a page context.
///
/// Installing twice hands back the driver that is already there, so a second
/// injection never wires up a second set of listeners.
pub struct DriverSlot<P: PageContext> {
    cell: OnceCell<Arc<TilingDriver<P>>>,
}

impl<P: PageContext> DriverSlot<P> {
    pub const fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    /// Return the installed driver, building it with `make` on first use.
    pub fn get_or_install(&self, make: impl FnOnce() -> TilingDriver<P>) -> Arc<TilingDriver<P>> {
        self.cell.get_or_init(|| Arc::new(make())).clone()
    }

    pub fn get(&self) -> Option<Arc<TilingDriver<P>>> {
        self.cell.get().cloned()
    }
}

impl<P: PageContext> Default for DriverSlot<P> {
    fn default() -> Self {
        Self::new()
    }
}
