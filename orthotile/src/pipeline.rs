//! Single-raster pipeline: open, tile, reproject, persist
use crate::error::Result;
use crate::image_utils::{crop_tile, open_raster, save_tile};
use crate::labels::{label_path, write_label_file};
use crate::manifest::{TRAIN_IMAGES, TRAIN_LABELS};
use crate::types::{AnnotationSet, DatasetConfig};
use image::GenericImageView;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tilegrid::{build_dataset, TileLabels};

/// Counters for one processed raster
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RasterReport {
    pub image: String,
    pub raster_path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Tiles whose image was written
    pub tiles_created: usize,
    /// Tiles whose image or label write failed
    pub tiles_failed: usize,
    /// Written tiles that carry a label file
    pub annotated_tiles: usize,
    pub labels_written: usize,
    /// Box/tile overlaps dropped as below the visibility threshold
    pub slivers_dropped: usize,
    pub duration_ms: f32,
}

/// Tiles one raster into `<out>/images/train` and `<out>/labels/train`
pub struct TilePipeline {
    config: DatasetConfig,
    images_dir: PathBuf,
    labels_dir: PathBuf,
}

impl TilePipeline {
    /// The output directories are expected to exist, see `manifest::create_layout`
    pub fn new(config: DatasetConfig, output_dir: &Path) -> Self {
        Self {
            config,
            images_dir: output_dir.join(TRAIN_IMAGES),
            labels_dir: output_dir.join(TRAIN_LABELS),
        }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Run one annotation set end to end.
    ///
    /// Raster failures abort this raster with an error. A failing tile write
    /// is logged and counted, and the remaining tiles are still written.
    pub fn process(&self, set: &AnnotationSet) -> Result<RasterReport> {
        let start = Instant::now();
        let raster_path = set.resolve_raster(self.config.raster_root.as_deref());
        let raster = open_raster(&raster_path)?;
        let (width, height) = raster.dimensions();
        log::debug!(
            "Opened {} ({}x{}, {} boxes)",
            raster_path.display(),
            width,
            height,
            set.boxes.len()
        );

        let build = build_dataset((width, height), &set.boxes, &self.config.tiling)?;
        let stem = set.image_stem();
        let total = build.tiles.len();

        let mut report = RasterReport {
            image: set.image.clone(),
            raster_path,
            width,
            height,
            slivers_dropped: build.slivers_dropped,
            ..Default::default()
        };

        for (i, entry) in build.tiles.iter().enumerate() {
            match self.write_tile(&raster, &stem, entry) {
                Ok(labelled) => {
                    report.tiles_created += 1;
                    if labelled {
                        report.annotated_tiles += 1;
                        report.labels_written += entry.labels.len();
                    }
                }
                Err(e) => {
                    log::error!("Tile {} of {}: {}", entry.tile.index, set.image, e);
                    report.tiles_failed += 1;
                }
            }
            if (i + 1) % 10 == 0 {
                log::debug!("{}: {}/{} tiles", stem, i + 1, total);
            }
        }

        report.duration_ms = start.elapsed().as_secs_f32() * 1000.0;
        log::info!(
            "{}: {} tiles, {} labels ({} annotated tiles) in {:.1}ms",
            set.image_name(),
            report.tiles_created,
            report.labels_written,
            report.annotated_tiles,
            report.duration_ms
        );
        Ok(report)
    }

    /// Persist one tile, label first. A failed write leaves neither file behind.
    fn write_tile(
        &self,
        raster: &image::DynamicImage,
        stem: &str,
        entry: &TileLabels,
    ) -> Result<bool> {
        let filename = entry.tile.filename(stem, &self.config.tile_extension);
        let image_path = self.images_dir.join(&filename);
        let label_file = label_path(&self.labels_dir, &filename);

        let labelled = write_label_file(&label_file, &entry.labels)?;
        let crop = crop_tile(raster, &entry.tile);
        if let Err(e) = save_tile(&crop, &image_path, self.config.jpeg_quality) {
            remove_partial(&image_path);
            if labelled {
                remove_partial(&label_file);
            }
            return Err(e);
        }
        Ok(labelled)
    }
}

fn remove_partial(path: &Path) {
    if !path.is_file() {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Could not remove {}: {}", path.display(), e);
    }
}
