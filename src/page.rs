//! Page-embedded primitives the tiling driver needs.
//!
//! A `PageContext` is whatever can see and mutate the page's own DOM: it can
//! measure, scroll and restyle, but it cannot take screenshots. That is the
//! capture agent's job (see [`crate::agent`]).

use crate::geometry::{PageMetrics, ScrollPosition, ViewportGeometry};
use crate::Result;

/// Core trait for page-side backends
pub trait PageContext: Send {
    /// Collect every DOM extent measurement for the document
    fn page_metrics(&mut self) -> Result<PageMetrics>;

    /// Current inner window size
    fn viewport(&mut self) -> Result<ViewportGeometry>;

    /// Current scroll offset
    fn scroll_position(&mut self) -> Result<ScrollPosition>;

    /// Scroll the window to an absolute offset
    fn scroll_to(&mut self, pos: ScrollPosition) -> Result<()>;

    /// Inline `overflow` style on the root element (`""` when unset)
    fn root_overflow(&mut self) -> Result<String>;

    /// Replace the inline `overflow` style on the root element
    fn set_root_overflow(&mut self, value: &str) -> Result<()>;
}

/// Inline style the driver applies to hide scrollbars for a session
pub const HIDDEN_OVERFLOW: &str = "hidden";
