//! Orthophoto Dataset Toolkit
//!
//! Turns large aerial orthophotos with hand-made ground truth into tiled
//! object-detection datasets. Rasters are cut into overlapping tiles, boxes are
//! reprojected into each tile as normalized YOLO labels, and the result is
//! written with a `dataset.yaml` manifest. Around that core sit COCO export,
//! merging and re-splitting of YOLO datasets, and training-run statistics.
//!
//! The tiling geometry lives in the `tilegrid` crate and is re-exported here.

pub mod annotation;
pub mod batch;
pub mod coco;
pub mod error;
pub mod image_utils;
pub mod labels;
pub mod manifest;
pub mod pipeline;
pub mod split;
pub mod stats;
pub mod types;

pub use annotation::{load_annotation_file, ParsedAnnotations};
pub use batch::{run_batch, BatchSummary};
pub use coco::{build_coco, CocoDataset};
pub use error::{DatasetError, Result};
pub use manifest::DatasetManifest;
pub use pipeline::{RasterReport, TilePipeline};
pub use split::{merge_datasets, MergeSummary};
pub use stats::{RunComparison, RunSummary, TrainingRun};
pub use tilegrid::{
    build_dataset, generate_tiles, reproject_box, GroundTruthBox, Tile, TileLabel, TilingConfig,
};
pub use types::{AnnotationSet, ClassMap, DatasetConfig};

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
