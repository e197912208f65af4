//! Pure Rust tiling geometry for large aerial rasters
//!
//! Splits a raster into a grid of overlapping square tiles and re-expresses
//! absolute ground-truth boxes in each tile's normalized YOLO frame. The crate
//! does no I/O; persisting crops and label files is left to the caller.
//!
//! ```rust
//! use tilegrid::{build_dataset, GroundTruthBox, TilingConfig};
//!
//! let boxes = vec![GroundTruthBox::new(0, 500.0, 500.0, 40.0, 30.0)];
//! let build = build_dataset((2000, 1500), &boxes, &TilingConfig::default()).unwrap();
//!
//! assert_eq!(build.tiles.len(), 4);
//! assert_eq!(build.label_count(), 1);
//! ```

pub mod bbox;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod reproject;
pub mod spatial;

pub use bbox::Bbox;
pub use dataset::{build_dataset, DatasetBuild, TileLabels};
pub use error::{Result, TilingError};
pub use grid::{generate_tiles, Tile, TileGrid, TilingConfig};
pub use reproject::{classify, reproject_box, GroundTruthBox, Reprojection, TileLabel};
pub use spatial::{BoxIndex, BoxIndexStats};
