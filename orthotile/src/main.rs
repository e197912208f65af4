use anyhow::{Context, Result};
use argh::FromArgs;
use orthotile::annotation::write_summary;
use orthotile::batch::{collect_annotation_sets, expand_inputs};
use orthotile::coco::{build_coco, write_classes_txt, write_coco};
use orthotile::stats::{RunComparison, TrainingRun};
use orthotile::{merge_datasets, run_batch, DatasetConfig};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(FromArgs, Debug)]
/// Build object-detection datasets from annotated orthophotos.
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    Tile(TileCmd),
    Export(ExportCmd),
    Merge(MergeCmd),
    Stats(StatsCmd),
}

#[derive(FromArgs, Debug)]
/// Tile rasters and write a YOLO dataset
#[argh(subcommand, name = "tile")]
struct TileCmd {
    #[argh(positional)]
    /// annotation files or directories holding them
    inputs: Vec<PathBuf>,
    #[argh(option, short = 'o')]
    /// dataset output directory
    output: PathBuf,
    #[argh(option, short = 'c')]
    /// JSON configuration file
    config: Option<PathBuf>,
    #[argh(option)]
    /// tile edge length in pixels
    tile_size: Option<u32>,
    #[argh(option)]
    /// overlap between neighbouring tiles in pixels
    overlap: Option<u32>,
    #[argh(option)]
    /// drop tiles with an edge shorter than this
    min_edge_length: Option<u32>,
    #[argh(option)]
    /// minimum normalized label extent kept in a tile
    min_visibility: Option<f64>,
    #[argh(option)]
    /// directory that relative raster paths resolve against
    raster_root: Option<PathBuf>,
    #[argh(option)]
    /// tile image extension (jpg, png, ...)
    extension: Option<String>,
    #[argh(option)]
    /// JPEG quality 1-100
    quality: Option<u8>,
    #[argh(switch)]
    /// also write classes.txt into the output directory
    classes_txt: bool,
    #[argh(option)]
    /// write all parsed ground truth to this file in the text grammar
    summary: Option<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Export whole-raster ground truth as COCO JSON
#[argh(subcommand, name = "export")]
struct ExportCmd {
    #[argh(positional)]
    /// annotation files or directories holding them
    inputs: Vec<PathBuf>,
    #[argh(option, short = 'o')]
    /// COCO JSON file to write
    output: PathBuf,
    #[argh(option, short = 'c')]
    /// JSON configuration file
    config: Option<PathBuf>,
    #[argh(option)]
    /// directory that relative raster paths resolve against
    raster_root: Option<PathBuf>,
    #[argh(option)]
    /// directory to write classes.txt into
    classes_txt: Option<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Merge YOLO datasets into one with a fresh train/val split
#[argh(subcommand, name = "merge")]
struct MergeCmd {
    #[argh(positional)]
    /// dataset roots containing images/train and labels/train
    sources: Vec<PathBuf>,
    #[argh(option, short = 'o')]
    /// merged dataset directory, must be empty or absent
    output: PathBuf,
    #[argh(option, default = "String::from(\"merged\")")]
    /// file name prefix of merged samples
    prefix: String,
    #[argh(option, short = 'c')]
    /// JSON configuration file
    config: Option<PathBuf>,
    #[argh(option)]
    /// fraction of samples used for validation
    val_fraction: Option<f64>,
    #[argh(option)]
    /// shuffle seed
    seed: Option<u64>,
}

#[derive(FromArgs, Debug)]
/// Summarize an Ultralytics results.csv
#[argh(subcommand, name = "stats")]
struct StatsCmd {
    #[argh(positional)]
    /// results.csv of the run
    results: PathBuf,
    #[argh(option)]
    /// results.csv of a baseline run to compare against
    baseline: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<DatasetConfig> {
    match path {
        Some(path) => DatasetConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(DatasetConfig::default()),
    }
}

fn run_tile(cmd: TileCmd) -> Result<()> {
    let mut config = load_config(cmd.config.as_deref())?;
    if let Some(v) = cmd.tile_size {
        config.tiling.tile_size = v;
    }
    if let Some(v) = cmd.overlap {
        config.tiling.overlap = v;
    }
    if let Some(v) = cmd.min_edge_length {
        config.tiling.min_edge_length = v;
    }
    if let Some(v) = cmd.min_visibility {
        config.tiling.min_visibility = v;
    }
    if cmd.raster_root.is_some() {
        config.raster_root = cmd.raster_root;
    }
    if let Some(v) = cmd.extension {
        config.tile_extension = v;
    }
    if let Some(v) = cmd.quality {
        config.jpeg_quality = v;
    }
    config.validate().context("invalid configuration")?;

    if let Some(path) = &cmd.summary {
        let files = expand_inputs(&cmd.inputs)?;
        let (sets, _) = collect_annotation_sets(&files, &config);
        let out = BufWriter::new(File::create(path)?);
        write_summary(out, &sets, &config.class_map())
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("Wrote ground-truth summary {}", path.display());
    }

    let summary = run_batch(&cmd.inputs, &cmd.output, &config)
        .with_context(|| format!("building dataset in {}", cmd.output.display()))?;
    if cmd.classes_txt {
        write_classes_txt(&cmd.output, &config.class_map())?;
    }
    println!("{summary}");
    Ok(())
}

fn run_export(cmd: ExportCmd) -> Result<()> {
    let mut config = load_config(cmd.config.as_deref())?;
    if cmd.raster_root.is_some() {
        config.raster_root = cmd.raster_root;
    }
    config.validate().context("invalid configuration")?;

    let files = expand_inputs(&cmd.inputs)?;
    let (sets, parsed) = collect_annotation_sets(&files, &config);
    let classes = config.class_map();
    let export = build_coco(&sets, &classes, config.raster_root.as_deref());
    write_coco(&cmd.output, &export.dataset)
        .with_context(|| format!("writing {}", cmd.output.display()))?;
    if let Some(dir) = &cmd.classes_txt {
        write_classes_txt(dir, &classes)?;
    }

    println!(
        "COCO export: {} images, {} annotations, {} records rejected -> {}",
        export.dataset.images.len(),
        export.dataset.annotations.len(),
        parsed.records_rejected,
        cmd.output.display()
    );
    for skipped in parsed.skipped.iter().chain(&export.skipped) {
        println!("  skipped {}: {}", skipped.item, skipped.reason);
    }
    Ok(())
}

fn run_merge(cmd: MergeCmd) -> Result<()> {
    let mut config = load_config(cmd.config.as_deref())?;
    if let Some(v) = cmd.val_fraction {
        config.val_fraction = v;
    }
    if let Some(v) = cmd.seed {
        config.split_seed = v;
    }
    let summary = merge_datasets(&cmd.sources, &cmd.output, &cmd.prefix, &config)
        .with_context(|| format!("merging into {}", cmd.output.display()))?;
    println!("{summary}");
    Ok(())
}

fn run_stats(cmd: StatsCmd) -> Result<()> {
    let run = TrainingRun::from_path(&cmd.results)
        .with_context(|| format!("reading {}", cmd.results.display()))?;
    println!("{}", run.summary());

    if let Some(path) = &cmd.baseline {
        let baseline = TrainingRun::from_path(path)
            .with_context(|| format!("reading {}", path.display()))?;
        println!("{}", RunComparison::from_runs(&baseline, &run));
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli: Cli = argh::from_env();
    log::debug!("orthotile {}", orthotile::version());

    match cli.command {
        Command::Tile(cmd) => run_tile(cmd),
        Command::Export(cmd) => run_export(cmd),
        Command::Merge(cmd) => run_merge(cmd),
        Command::Stats(cmd) => run_stats(cmd),
    }
}
