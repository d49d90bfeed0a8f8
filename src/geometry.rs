//! Page/viewport geometry and the tile grid derived from them.
//!
//! Everything here is pure: the driver measures once at session start and
//! hands the numbers to [`TileGrid::compute`], which never looks at the page.

use serde::{Deserialize, Serialize};

/// Raw extents reported by the different DOM measurement sources.
///
/// Browsers disagree on which of these reflects the real scrollable extent
/// (quirks mode, overflow on `<body>` vs `<html>`, margins collapsing out of
/// the body...), so all of them are collected and the maximum wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub body_scroll_width: u32,
    pub body_scroll_height: u32,
    pub body_offset_width: u32,
    pub body_offset_height: u32,
    pub html_client_width: u32,
    pub html_client_height: u32,
    pub html_scroll_width: u32,
    pub html_scroll_height: u32,
    pub html_offset_width: u32,
    pub html_offset_height: u32,
}

impl PageMetrics {
    /// Collapse the measurements into a single page extent (over-approximating).
    pub fn page_geometry(&self) -> PageGeometry {
        let width = [
            self.body_scroll_width,
            self.body_offset_width,
            self.html_client_width,
            self.html_scroll_width,
            self.html_offset_width,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);
        let height = [
            self.body_scroll_height,
            self.body_offset_height,
            self.html_client_height,
            self.html_scroll_height,
            self.html_offset_height,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);
        PageGeometry { width, height }
    }
}

/// Full scrollable content extent of the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: u32,
    pub height: u32,
}

/// Visible window extent at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportGeometry {
    pub width: u32,
    pub height: u32,
}

/// Scroll offset of the page's viewport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: u32,
    pub y: u32,
}

impl ScrollPosition {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Whether both axes are within `tolerance` pixels of `other`.
    pub fn is_near(&self, other: ScrollPosition, tolerance: u32) -> bool {
        self.x.abs_diff(other.x) <= tolerance && self.y.abs_diff(other.y) <= tolerance
    }
}

/// A scroll target in page coordinates plus its grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub row: u32,
    pub col: u32,
}

impl Tile {
    pub fn position(&self) -> ScrollPosition {
        ScrollPosition::new(self.x, self.y)
    }
}

/// Row-major tiling of a page with viewport-sized cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    pub page: PageGeometry,
    pub viewport: ViewportGeometry,
    pub cols: u32,
    pub rows: u32,
    pub tiles: Vec<Tile>,
}

impl TileGrid {
    /// Cover `page` with `viewport`-sized cells, rounding up on both axes.
    ///
    /// A degenerate page (zero on either axis) still yields one tile so a
    /// session always captures at least the origin. A zero-sized viewport
    /// yields an empty grid; callers reject it before getting here.
    pub fn compute(page: PageGeometry, viewport: ViewportGeometry) -> Self {
        if viewport.width == 0 || viewport.height == 0 {
            return Self { page, viewport, cols: 0, rows: 0, tiles: Vec::new() };
        }

        let cols = page.width.div_ceil(viewport.width).max(1);
        let rows = page.height.div_ceil(viewport.height).max(1);

        let tiles = (0..rows)
            .flat_map(|row| {
                (0..cols).map(move |col| Tile {
                    x: col * viewport.width,
                    y: row * viewport.height,
                    row,
                    col,
                })
            })
            .collect();

        Self { page, viewport, cols, rows, tiles }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Composite size: always a whole number of viewports on each axis.
    pub fn composite_size(&self) -> (u32, u32) {
        (self.cols * self.viewport.width, self.rows * self.viewport.height)
    }

    /// Pixel offset in the composite for a tile's grid cell.
    pub fn offset_of(&self, tile: &Tile) -> (u32, u32) {
        (tile.col * self.viewport.width, tile.row * self.viewport.height)
    }
}
