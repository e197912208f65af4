//! Batch dataset build over many annotation files and rasters
use crate::annotation::{discover_annotation_files, load_annotation_file};
use crate::error::Result;
use crate::manifest::{create_layout, DatasetManifest};
use crate::pipeline::{RasterReport, TilePipeline};
use crate::types::{AnnotationSet, DatasetConfig};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipKind {
    /// Unreadable or headerless annotation file
    AnnotationFile,
    Raster,
}

/// A raster or annotation file that did not contribute tiles
#[derive(Clone, Debug, PartialEq)]
pub struct Skipped {
    pub kind: SkipKind,
    pub item: String,
    pub reason: String,
}

impl Skipped {
    pub fn new<S: Into<String>, R: fmt::Display>(kind: SkipKind, item: S, reason: R) -> Self {
        Self {
            kind,
            item: item.into(),
            reason: reason.to_string(),
        }
    }

    pub fn raster<S: Into<String>, R: fmt::Display>(item: S, reason: R) -> Self {
        Self::new(SkipKind::Raster, item, reason)
    }

    pub fn file<S: Into<String>, R: fmt::Display>(item: S, reason: R) -> Self {
        Self::new(SkipKind::AnnotationFile, item, reason)
    }
}

/// Aggregate counters of a batch run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub annotation_files: usize,
    pub records_rejected: usize,
    pub rasters_processed: usize,
    pub tiles_created: usize,
    pub tiles_failed: usize,
    pub annotated_tiles: usize,
    pub labels_emitted: usize,
    pub slivers_dropped: usize,
    /// Rasters and annotation files left out, with the reason
    pub skipped: Vec<Skipped>,
    pub manifest: Option<PathBuf>,
    pub duration_ms: f32,
}

impl BatchSummary {
    fn add_report(mut self, report: &RasterReport) -> Self {
        self.rasters_processed += 1;
        self.tiles_created += report.tiles_created;
        self.tiles_failed += report.tiles_failed;
        self.annotated_tiles += report.annotated_tiles;
        self.labels_emitted += report.labels_written;
        self.slivers_dropped += report.slivers_dropped;
        self
    }

    fn skip(mut self, skipped: Skipped) -> Self {
        self.skipped.push(skipped);
        self
    }

    /// Combine two partial summaries. Counters add, skip lists concatenate in order.
    fn merge(mut self, other: Self) -> Self {
        self.annotation_files += other.annotation_files;
        self.records_rejected += other.records_rejected;
        self.rasters_processed += other.rasters_processed;
        self.tiles_created += other.tiles_created;
        self.tiles_failed += other.tiles_failed;
        self.annotated_tiles += other.annotated_tiles;
        self.labels_emitted += other.labels_emitted;
        self.slivers_dropped += other.slivers_dropped;
        self.skipped.extend(other.skipped);
        self
    }

    fn skipped_of(&self, kind: SkipKind) -> usize {
        self.skipped.iter().filter(|s| s.kind == kind).count()
    }

    pub fn files_skipped(&self) -> usize {
        self.skipped_of(SkipKind::AnnotationFile)
    }

    pub fn rasters_skipped(&self) -> usize {
        self.skipped_of(SkipKind::Raster)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset build summary")?;
        writeln!(f, "{}", "=".repeat(40))?;
        writeln!(f, "  Annotation files:   {}", self.annotation_files)?;
        writeln!(f, "  Files skipped:      {}", self.files_skipped())?;
        writeln!(f, "  Records rejected:   {}", self.records_rejected)?;
        writeln!(f, "  Rasters processed:  {}", self.rasters_processed)?;
        writeln!(f, "  Rasters skipped:    {}", self.rasters_skipped())?;
        writeln!(f, "  Tiles created:      {}", self.tiles_created)?;
        writeln!(f, "  Tiles failed:       {}", self.tiles_failed)?;
        writeln!(f, "  Annotated tiles:    {}", self.annotated_tiles)?;
        writeln!(f, "  Labels emitted:     {}", self.labels_emitted)?;
        writeln!(f, "  Slivers dropped:    {}", self.slivers_dropped)?;
        writeln!(f, "  Elapsed:            {:.1}s", self.duration_ms / 1000.0)?;
        if let Some(manifest) = &self.manifest {
            writeln!(f, "  Manifest:           {}", manifest.display())?;
        }
        for skipped in &self.skipped {
            writeln!(f, "  skipped {}: {}", skipped.item, skipped.reason)?;
        }
        Ok(())
    }
}

/// Turn files and directories into the list of annotation files to read
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(discover_annotation_files(input)?);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// Parse every annotation file. Unreadable files and files without a header
/// are skipped; rejected records are counted.
pub fn collect_annotation_sets(
    files: &[PathBuf],
    config: &DatasetConfig,
) -> (Vec<AnnotationSet>, BatchSummary) {
    let classes = config.class_map();
    let mut summary = BatchSummary::default();
    let mut sets = Vec::new();

    for file in files {
        match load_annotation_file(file, &classes) {
            Ok(parsed) => {
                summary.annotation_files += 1;
                summary.records_rejected += parsed.rejected.len();
                sets.extend(parsed.sets);
            }
            Err(e) => {
                log::error!("Skipping {}: {}", file.display(), e);
                summary = summary.skip(Skipped::file(file.display().to_string(), e));
            }
        }
    }
    (sets, summary)
}

/// A raster to tile, or the reason it is left out
enum RasterJob {
    Tile(AnnotationSet),
    Skip(Skipped),
}

/// Merge sets naming the same raster into one set, keeping first-seen order.
///
/// Tiles are named after the raster stem, so two different rasters with the
/// same stem would overwrite each other's output. The later one is skipped.
fn plan_rasters(sets: Vec<AnnotationSet>, raster_root: Option<&Path>) -> Vec<RasterJob> {
    let mut grouped: Vec<(PathBuf, AnnotationSet)> = Vec::new();
    let mut by_raster: HashMap<PathBuf, usize> = HashMap::new();
    for set in sets {
        let raster = set.resolve_raster(raster_root);
        match by_raster.get(&raster) {
            Some(&i) => {
                log::debug!(
                    "{}: adding {} boxes from {}",
                    set.image,
                    set.boxes.len(),
                    set.source.display()
                );
                grouped[i].1.boxes.extend(set.boxes);
            }
            None => {
                by_raster.insert(raster.clone(), grouped.len());
                grouped.push((raster, set));
            }
        }
    }

    let mut stems: HashMap<String, PathBuf> = HashMap::new();
    grouped
        .into_iter()
        .map(|(raster, set)| {
            if set.boxes.is_empty() {
                log::warn!("Skipping {}: no ground-truth boxes", set.image);
                return RasterJob::Skip(Skipped::raster(set.image, "no ground-truth boxes"));
            }
            let stem = set.image_stem();
            if let Some(owner) = stems.get(&stem) {
                let reason = format!("tile names collide with {}", owner.display());
                log::error!("Skipping {}: {}", raster.display(), reason);
                return RasterJob::Skip(Skipped::raster(set.image, reason));
            }
            stems.insert(stem, raster);
            RasterJob::Tile(set)
        })
        .collect()
}

/// Build a tiled YOLO dataset under `output_dir` from annotation files and
/// directories. Sets naming the same raster are tiled together. Rasters run
/// in parallel; one failing raster does not stop the others. The manifest is
/// written once at the end.
pub fn run_batch(
    inputs: &[PathBuf],
    output_dir: &Path,
    config: &DatasetConfig,
) -> Result<BatchSummary> {
    config.validate()?;
    let start = Instant::now();

    let files = expand_inputs(inputs)?;
    log::info!("Reading {} annotation file(s)", files.len());
    let (sets, parsed) = collect_annotation_sets(&files, config);

    create_layout(output_dir)?;
    let pipeline = TilePipeline::new(config.clone(), output_dir);

    let jobs = plan_rasters(sets, config.raster_root.as_deref());

    let processed = jobs
        .par_iter()
        .fold(BatchSummary::default, |summary, job| match job {
            RasterJob::Skip(skipped) => summary.skip(skipped.clone()),
            RasterJob::Tile(set) => match pipeline.process(set) {
                Ok(report) => summary.add_report(&report),
                Err(e) => {
                    log::error!("Skipping {}: {}", set.image, e);
                    summary.skip(Skipped::raster(set.image.clone(), e))
                }
            },
        })
        .reduce(BatchSummary::default, BatchSummary::merge);

    let mut summary = parsed.merge(processed);

    let manifest = DatasetManifest::new(output_dir, &config.class_names)
        .with_stat("rasters", summary.rasters_processed)
        .with_stat("tiles", summary.tiles_created)
        .with_stat("annotated_tiles", summary.annotated_tiles)
        .with_stat("labels", summary.labels_emitted);
    summary.manifest = Some(manifest.write()?);
    summary.duration_ms = start.elapsed().as_secs_f32() * 1000.0;
    Ok(summary)
}
