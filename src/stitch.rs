//! Composite assembly: decode every captured tile and draw it at its grid cell.

use crate::geometry::{Tile, TileGrid};
use crate::{Error, OutputFormat, Result};
use futures::future::join_all;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use log::{debug, warn};
use std::io::Cursor;

/// Largest canvas the stitcher will allocate (1 GiB of RGBA).
pub const MAX_COMPOSITE_PIXELS: u64 = 1 << 28;

/// One tile's raw image as returned by the capture agent
#[derive(Debug, Clone)]
pub struct CapturedTile {
    pub image: Vec<u8>,
    pub tile: Tile,
    /// Position in capture order
    pub index: usize,
}

/// The stitched raster plus the tiles that could not be drawn
#[derive(Debug)]
pub struct Composite {
    pub image: RgbaImage,
    /// Capture indices whose image failed to decode (left blank)
    pub missing: Vec<usize>,
}

impl Composite {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Decode all tiles and place each at `(col * vw, row * vh)`.
///
/// Returns only once every tile has either decoded or failed to. A tile that
/// fails to decode is skipped and leaves a transparent hole; that does not
/// fail the stitch.
pub async fn stitch(grid: &TileGrid, tiles: Vec<CapturedTile>) -> Result<Composite> {
    let (width, height) = grid.composite_size();
    if width == 0 || height == 0 {
        return Err(Error::StitchFailed(format!("empty composite {}x{}", width, height)));
    }
    if u64::from(width) * u64::from(height) > MAX_COMPOSITE_PIXELS {
        return Err(Error::StitchFailed(format!(
            "composite {}x{} exceeds the {} pixel limit",
            width, height, MAX_COMPOSITE_PIXELS
        )));
    }

    let decodes = tiles.into_iter().map(|captured| {
        tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&captured.image);
            (captured.index, captured.tile, decoded)
        })
    });

    let mut canvas = RgbaImage::new(width, height);
    let mut missing = Vec::new();

    for joined in join_all(decodes).await {
        let (index, tile, decoded) =
            joined.map_err(|e| Error::StitchFailed(format!("tile decode task failed: {}", e)))?;
        match decoded {
            Ok(img) => {
                let (x, y) = grid.offset_of(&tile);
                debug!("Drawing tile {} (row {}, col {}) at {},{}", index, tile.row, tile.col, x, y);
                imageops::replace(&mut canvas, &img.to_rgba8(), i64::from(x), i64::from(y));
            }
            Err(e) => {
                warn!("Tile {} could not be decoded, leaving it blank: {}", index, e);
                missing.push(index);
            }
        }
    }

    missing.sort_unstable();
    Ok(Composite { image: canvas, missing })
}

/// Encode the composite in the configured output format.
pub fn encode(composite: &Composite, format: OutputFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match format {
        OutputFormat::Png => composite
            .image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| Error::StitchFailed(format!("PNG export failed: {}", e)))?,
        OutputFormat::Jpeg { quality } => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgba8(composite.image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality)
                .encode_image(&rgb)
                .map_err(|e| Error::StitchFailed(format!("JPEG export failed: {}", e)))?
        }
    }
    Ok(out.into_inner())
}
