//! Fullshot
//!
//! Full-page screenshots for pages taller (or wider) than the window: scroll
//! the page tile by tile, capture the visible viewport each time, and stitch
//! the tiles into one composite image.
//!
//! Three parts cooperate only through messages:
//!
//! - the **capture agent** ([`agent`]) owns the privileged "capture visible
//!   viewport" primitive and runs on its own worker thread;
//! - the **tiling driver** ([`driver`]) lives next to the page, measures it,
//!   sequences scroll/settle/capture for every tile and stitches the result;
//! - a **control surface** ([`control`]) starts sessions and renders the
//!   status/progress events the driver emits.
//!
//! Backends plug in at two seams: [`page::PageContext`] for page-side
//! primitives and [`agent::ViewportCapturer`] for the screenshot itself.
//! [`sim`] provides a deterministic in-memory pair; the `cdp` feature adds a
//! headless Chrome pair.
//!
//! # Example
//!
//! ```no_run
//! use fullshot::agent::CaptureAgent;
//! use fullshot::driver::{StartOutcome, TilingDriver};
//! use fullshot::geometry::{PageGeometry, ViewportGeometry};
//! use fullshot::sim::SimulatedBrowser;
//! use fullshot::{CaptureConfig, CaptureOptions};
//!
//! # async fn run() -> fullshot::Result<()> {
//! let browser = SimulatedBrowser::new(
//!     PageGeometry { width: 2000, height: 3000 },
//!     ViewportGeometry { width: 1000, height: 800 },
//! );
//! let agent = CaptureAgent::spawn(browser.capturer());
//! let driver = TilingDriver::new(browser.page(), agent, CaptureConfig::default());
//!
//! if let StartOutcome::Completed(artifact) = driver.start_capture(CaptureOptions::default()).await {
//!     println!("saved {}", artifact.location());
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod error;
pub use error::{Error, Result};

pub mod agent;
pub mod artifact;
pub mod control;
pub mod driver;
pub mod geometry;
pub mod message;
pub mod page;
pub mod sim;
pub mod stitch;

// Headless Chrome backend for both seams
#[cfg(feature = "cdp")]
pub mod cdp;

pub use driver::{StartOutcome, TilingDriver};
pub use message::{ControlMessage, DriverEvent};

/// Per-session options chosen by the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureOptions {
    /// Accepted and carried through the session; does not change tiling.
    pub include_fixed: bool,
    /// Set `overflow: hidden` on the root element while capturing
    pub hide_scrollbars: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            include_fixed: false,
            hide_scrollbars: true,
        }
    }
}

/// Encoding of the composite artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg { quality: u8 },
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg { .. } => "jpg",
        }
    }
}

/// Window size used when a backend has to create the window itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Configuration for capture sessions
///
/// The defaults reproduce the usual browser-extension timings: a long settle
/// after the forced scroll to the origin and after every real scroll, and a
/// short one when the window is already within `scroll_tolerance_px` of the
/// next tile.
///
/// # Examples
///
/// ```
/// let cfg = fullshot::CaptureConfig::default();
/// assert_eq!(cfg.scroll_tolerance_px, 5);
/// assert_eq!(cfg.file_prefix, "fullpage-screenshot");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Settle delay after the forced scroll to the origin for the first tile
    pub first_settle_ms: u64,
    /// Settle delay after an actual scroll
    pub scroll_settle_ms: u64,
    /// Settle delay when no scroll was needed
    pub short_settle_ms: u64,
    /// Distance (per axis, inclusive) at which a scroll is skipped
    pub scroll_tolerance_px: u32,
    /// Directory artifacts are written to
    pub output_dir: PathBuf,
    /// Artifact file name prefix; a millisecond timestamp is appended
    pub file_prefix: String,
    pub output_format: OutputFormat,
    /// Window size for backends that launch their own browser
    pub viewport: Viewport,
    /// Options used when a start command does not carry any
    pub options: CaptureOptions,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            first_settle_ms: 400,
            scroll_settle_ms: 400,
            short_settle_ms: 100,
            scroll_tolerance_px: 5,
            output_dir: PathBuf::from("."),
            file_prefix: "fullpage-screenshot".to_string(),
            output_format: OutputFormat::Png,
            viewport: Viewport::default(),
            options: CaptureOptions::default(),
        }
    }
}

impl CaptureConfig {
    /// Load a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let cfg: CaptureConfig = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        if let OutputFormat::Jpeg { quality } = self.output_format {
            if !(1..=100).contains(&quality) {
                return Err(Error::ConfigError(format!("JPEG quality must be 1..=100, got {}", quality)));
            }
        }
        if self.file_prefix.is_empty() {
            return Err(Error::ConfigError("file_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Same config with every settle delay set to zero.
    pub fn without_delays(mut self) -> Self {
        self.first_settle_ms = 0;
        self.scroll_settle_ms = 0;
        self.short_settle_ms = 0;
        self
    }
}
