//! Overlapping tile grid over a large raster

use crate::bbox::Bbox;
use crate::error::{Result, TilingError};
use serde::{Deserialize, Serialize};

/// Tiling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    /// Edge length of a square tile in pixels
    pub tile_size: u32,

    /// Shared border width between adjacent tiles in pixels
    pub overlap: u32,

    /// Tiles whose clamped width or height falls below this are skipped
    pub min_edge_length: u32,

    /// A label survives only if both normalized extents exceed this fraction
    pub min_visibility: f64,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_size: 1024,
            overlap: 100,
            min_edge_length: 400,
            min_visibility: 0.01,
        }
    }
}

impl TilingConfig {
    pub fn new(tile_size: u32, overlap: u32) -> Self {
        Self {
            tile_size,
            overlap,
            ..Self::default()
        }
    }

    pub fn with_min_edge_length(mut self, min_edge_length: u32) -> Self {
        self.min_edge_length = min_edge_length;
        self
    }

    pub fn with_min_visibility(mut self, min_visibility: f64) -> Self {
        self.min_visibility = min_visibility;
        self
    }

    /// Distance between the origins of neighbouring tiles
    pub fn stride(&self) -> u32 {
        self.tile_size.saturating_sub(self.overlap)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(TilingError::invalid_config("tile_size must be positive"));
        }
        if self.overlap >= self.tile_size {
            return Err(TilingError::invalid_config(format!(
                "overlap ({}) must be smaller than tile_size ({})",
                self.overlap, self.tile_size
            )));
        }
        if !(0.0..1.0).contains(&self.min_visibility) {
            return Err(TilingError::invalid_config(format!(
                "min_visibility ({}) must lie in [0, 1)",
                self.min_visibility
            )));
        }
        Ok(())
    }
}

/// One cropped region of the source raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    /// Position among the tiles kept for this raster, starting at 0
    pub index: usize,
    pub x_offset: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
}

impl Tile {
    /// Absolute extent of the tile in raster coordinates
    pub fn bbox(&self) -> Bbox {
        Bbox::from_xywh(
            self.x_offset as f64,
            self.y_offset as f64,
            self.width as f64,
            self.height as f64,
        )
    }

    /// File name for the persisted crop, e.g. `ortho_tile_007.jpg`
    pub fn filename(&self, stem: &str, extension: &str) -> String {
        format!("{}_tile_{:03}.{}", stem, self.index, extension)
    }
}

/// Lazy row-major walk over the tile grid.
///
/// Origins advance by `tile_size - overlap` along each axis while they stay
/// below `size - overlap`. The far edge of every tile is clamped to the raster,
/// and tiles thinner than `min_edge_length` are skipped without consuming an
/// index.
#[derive(Debug, Clone)]
pub struct TileGrid {
    raster_width: u32,
    raster_height: u32,
    tile_size: u32,
    stride: u32,
    min_edge_length: u32,
    x_limit: u32,
    y_limit: u32,
    next_x: u32,
    next_y: u32,
    next_index: usize,
    exhausted: bool,
}

impl TileGrid {
    fn new(raster_size: (u32, u32), config: &TilingConfig) -> Self {
        let (raster_width, raster_height) = raster_size;
        let x_limit = raster_width.saturating_sub(config.overlap);
        let y_limit = raster_height.saturating_sub(config.overlap);

        Self {
            raster_width,
            raster_height,
            tile_size: config.tile_size,
            stride: config.stride(),
            min_edge_length: config.min_edge_length,
            x_limit,
            y_limit,
            next_x: 0,
            next_y: 0,
            next_index: 0,
            exhausted: x_limit == 0 || y_limit == 0,
        }
    }

    pub fn raster_size(&self) -> (u32, u32) {
        (self.raster_width, self.raster_height)
    }

    fn advance(&mut self) {
        self.next_x = self.next_x.saturating_add(self.stride);
        if self.next_x >= self.x_limit {
            self.next_x = 0;
            self.next_y = self.next_y.saturating_add(self.stride);
            if self.next_y >= self.y_limit {
                self.exhausted = true;
            }
        }
    }
}

impl Iterator for TileGrid {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        while !self.exhausted {
            let x = self.next_x;
            let y = self.next_y;
            self.advance();

            let width = x.saturating_add(self.tile_size).min(self.raster_width) - x;
            let height = y.saturating_add(self.tile_size).min(self.raster_height) - y;

            if width < self.min_edge_length || height < self.min_edge_length {
                continue;
            }

            let tile = Tile {
                index: self.next_index,
                x_offset: x,
                y_offset: y,
                width,
                height,
            };
            self.next_index += 1;
            return Some(tile);
        }
        None
    }
}

impl std::iter::FusedIterator for TileGrid {}

/// Enumerate the tiles covering a raster of `raster_size = (width, height)`
pub fn generate_tiles(raster_size: (u32, u32), config: &TilingConfig) -> Result<TileGrid> {
    config.validate()?;
    Ok(TileGrid::new(raster_size, config))
}
