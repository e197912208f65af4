//! Merge YOLO datasets and re-split them into train and validation

use crate::error::{DatasetError, Result};
use crate::labels::count_label_lines;
use crate::manifest::{
    create_layout, DatasetManifest, TRAIN_IMAGES, TRAIN_LABELS, VAL_IMAGES, VAL_LABELS,
};
use crate::types::DatasetConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// An image with a non-empty label file
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub image: PathBuf,
    pub label: PathBuf,
    pub source: String,
    pub annotations: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeSummary {
    pub train_images: usize,
    pub train_annotations: usize,
    pub val_images: usize,
    pub val_annotations: usize,
    /// Images contributed per source dataset
    pub per_source: BTreeMap<String, usize>,
    pub manifest: Option<PathBuf>,
}

impl MergeSummary {
    pub fn total_images(&self) -> usize {
        self.train_images + self.val_images
    }

    pub fn total_annotations(&self) -> usize {
        self.train_annotations + self.val_annotations
    }
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Merged dataset")?;
        writeln!(f, "{}", "=".repeat(40))?;
        for (source, count) in &self.per_source {
            writeln!(f, "  {source}: {count} images")?;
        }
        writeln!(
            f,
            "  Total: {} images, {} annotations",
            self.total_images(),
            self.total_annotations()
        )?;
        writeln!(
            f,
            "  Train: {} images, {} annotations",
            self.train_images, self.train_annotations
        )?;
        writeln!(
            f,
            "  Val:   {} images, {} annotations",
            self.val_images, self.val_annotations
        )?;
        if let Some(manifest) = &self.manifest {
            writeln!(f, "  Manifest: {}", manifest.display())?;
        }
        Ok(())
    }
}

fn source_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

/// Images under `<root>/images/train` whose label file has at least one
/// record, in file-name order
pub fn collect_samples(root: &Path) -> Result<Vec<Sample>> {
    let images_dir = root.join(TRAIN_IMAGES);
    let labels_dir = root.join(TRAIN_LABELS);
    let source = source_name(root);

    let mut images: Vec<PathBuf> = std::fs::read_dir(&images_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    images.sort();

    let mut samples = Vec::new();
    for image in images {
        let Some(stem) = image.file_stem() else {
            continue;
        };
        let label = labels_dir.join(format!("{}.txt", stem.to_string_lossy()));
        let annotations = count_label_lines(&label);
        if annotations > 0 {
            samples.push(Sample {
                image,
                label,
                source: source.clone(),
                annotations,
            });
        }
    }
    log::info!("{}: {} labelled images", source, samples.len());
    Ok(samples)
}

/// Shuffle with a seeded RNG and cut at `floor(n * (1 - val_fraction))`.
///
/// `val_fraction` is clamped to `[0, 1]`; NaN counts as 0.
pub fn split_samples(
    mut samples: Vec<Sample>,
    val_fraction: f64,
    seed: u64,
) -> (Vec<Sample>, Vec<Sample>) {
    let val_fraction = if val_fraction.is_nan() {
        0.0
    } else {
        val_fraction.clamp(0.0, 1.0)
    };
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);
    let train_len = (samples.len() as f64 * (1.0 - val_fraction)).floor() as usize;
    let val = samples.split_off(train_len.min(samples.len()));
    (samples, val)
}

fn copy_samples(
    samples: &[Sample],
    images_dir: &Path,
    labels_dir: &Path,
    prefix: &str,
) -> Result<usize> {
    let mut annotations = 0;
    for (i, sample) in samples.iter().enumerate() {
        let name = format!("{prefix}_{i:04}");
        let image_name = match sample.image.extension() {
            Some(ext) => format!("{name}.{}", ext.to_string_lossy()),
            None => name.clone(),
        };
        std::fs::copy(&sample.image, images_dir.join(image_name))?;
        std::fs::copy(&sample.label, labels_dir.join(format!("{name}.txt")))?;
        annotations += sample.annotations;
    }
    Ok(annotations)
}

/// Merge YOLO dataset roots into `output` with a fresh train/val split.
///
/// Training samples are named `<prefix>_NNNN`, validation samples
/// `<prefix>_val_NNNN`. The output directory must be empty or absent.
pub fn merge_datasets(
    sources: &[PathBuf],
    output: &Path,
    prefix: &str,
    config: &DatasetConfig,
) -> Result<MergeSummary> {
    config.validate()?;
    if output.is_dir() && std::fs::read_dir(output)?.next().is_some() {
        return Err(DatasetError::config(format!(
            "output directory {} is not empty",
            output.display()
        )));
    }

    let mut summary = MergeSummary::default();
    let mut samples = Vec::new();
    for root in sources {
        let found = collect_samples(root)?;
        *summary.per_source.entry(source_name(root)).or_default() += found.len();
        samples.extend(found);
    }

    let (train, val) = split_samples(samples, config.val_fraction, config.split_seed);

    create_layout(output)?;
    summary.train_images = train.len();
    summary.train_annotations = copy_samples(
        &train,
        &output.join(TRAIN_IMAGES),
        &output.join(TRAIN_LABELS),
        prefix,
    )?;
    summary.val_images = val.len();
    summary.val_annotations = copy_samples(
        &val,
        &output.join(VAL_IMAGES),
        &output.join(VAL_LABELS),
        &format!("{prefix}_val"),
    )?;

    let mut manifest = DatasetManifest::new(output, &config.class_names)
        .with_stat("total_images", summary.total_images())
        .with_stat("total_annotations", summary.total_annotations())
        .with_stat("train_images", summary.train_images)
        .with_stat("train_annotations", summary.train_annotations)
        .with_stat("val_images", summary.val_images)
        .with_stat("val_annotations", summary.val_annotations);
    for (source, count) in &summary.per_source {
        manifest = manifest.with_stat(format!("source_{source}"), *count);
    }
    summary.manifest = Some(manifest.write()?);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_root(parent: &Path, name: &str, labelled: usize, empty: usize) -> PathBuf {
        let root = parent.join(name);
        create_layout(&root).unwrap();
        for i in 0..labelled {
            std::fs::write(root.join(TRAIN_IMAGES).join(format!("img{i}.jpg")), b"jpg").unwrap();
            std::fs::write(
                root.join(TRAIN_LABELS).join(format!("img{i}.txt")),
                "0 0.5 0.5 0.1 0.1\n0 0.2 0.2 0.1 0.1\n",
            )
            .unwrap();
        }
        for i in 0..empty {
            std::fs::write(root.join(TRAIN_IMAGES).join(format!("bg{i}.jpg")), b"jpg").unwrap();
            std::fs::write(root.join(TRAIN_LABELS).join(format!("bg{i}.txt")), "\n").unwrap();
        }
        root
    }

    fn sample(i: usize) -> Sample {
        Sample {
            image: PathBuf::from(format!("{i}.jpg")),
            label: PathBuf::from(format!("{i}.txt")),
            source: "s".to_string(),
            annotations: 1,
        }
    }

    #[test]
    fn test_collect_skips_unlabelled() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_root(dir.path(), "demo", 3, 2);
        let samples = collect_samples(&root).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.annotations == 2 && s.source == "demo"));
    }

    #[test]
    fn test_split_is_seeded() {
        let samples: Vec<_> = (0..10).map(sample).collect();
        let (train_a, val_a) = split_samples(samples.clone(), 0.2, 42);
        let (train_b, val_b) = split_samples(samples.clone(), 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(val_a, val_b);
        assert_eq!((train_a.len(), val_a.len()), (8, 2));

        let (train, val) = split_samples(samples, 0.25, 7);
        // floor(10 * 0.75) = 7
        assert_eq!((train.len(), val.len()), (7, 3));
    }

    #[test]
    fn test_split_clamps_fraction() {
        let samples: Vec<_> = (0..10).map(sample).collect();
        let (train, val) = split_samples(samples.clone(), -0.5, 1);
        assert_eq!((train.len(), val.len()), (10, 0));
        let (train, val) = split_samples(samples.clone(), 3.0, 1);
        assert_eq!((train.len(), val.len()), (0, 10));
        let (train, val) = split_samples(samples, f64::NAN, 1);
        assert_eq!((train.len(), val.len()), (10, 0));
    }

    #[test]
    fn test_merge_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_root(dir.path(), "demo", 6, 1);
        let b = make_root(dir.path(), "mega", 4, 0);
        let out = dir.path().join("merged");

        let summary = merge_datasets(&[a, b], &out, "ultimate", &DatasetConfig::default()).unwrap();
        assert_eq!(summary.total_images(), 10);
        assert_eq!(summary.train_images, 8);
        assert_eq!(summary.val_images, 2);
        assert_eq!(summary.total_annotations(), 20);
        assert_eq!(summary.per_source["demo"], 6);

        assert!(out.join(TRAIN_IMAGES).join("ultimate_0000.jpg").is_file());
        assert!(out.join(TRAIN_LABELS).join("ultimate_0007.txt").is_file());
        assert!(out.join(VAL_IMAGES).join("ultimate_val_0001.jpg").is_file());

        let manifest = DatasetManifest::read(&out.join("dataset.yaml")).unwrap();
        assert_eq!(manifest.stats["val_annotations"], 4);
        assert_eq!(manifest.stats["source_mega"], 4);

        // A second merge into the same directory is refused
        let again = merge_datasets(&[], &out, "ultimate", &DatasetConfig::default());
        assert!(matches!(again, Err(DatasetError::ConfigError(_))));
    }
}
