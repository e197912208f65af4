//! `dataset.yaml` manifest consumed by YOLO trainers

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "dataset.yaml";
pub const TRAIN_IMAGES: &str = "images/train";
pub const VAL_IMAGES: &str = "images/val";
pub const TRAIN_LABELS: &str = "labels/train";
pub const VAL_LABELS: &str = "labels/val";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Dataset root
    pub path: PathBuf,
    pub train: String,
    pub val: String,
    /// Number of classes
    pub nc: usize,
    pub names: BTreeMap<usize, String>,
    /// Build counters, informational only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, usize>,
}

impl DatasetManifest {
    pub fn new<P: Into<PathBuf>>(root: P, class_names: &[String]) -> Self {
        Self {
            path: root.into(),
            train: TRAIN_IMAGES.to_string(),
            val: VAL_IMAGES.to_string(),
            nc: class_names.len(),
            names: class_names.iter().cloned().enumerate().collect(),
            stats: BTreeMap::new(),
        }
    }

    pub fn with_stat<S: Into<String>>(mut self, key: S, value: usize) -> Self {
        self.stats.insert(key.into(), value);
        self
    }

    /// Write `dataset.yaml` under the dataset root and return its path
    pub fn write(&self) -> Result<PathBuf> {
        let path = self.path.join(MANIFEST_FILE);
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&path, yaml)?;
        log::info!("Wrote manifest {}", path.display());
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// Create `images/{train,val}` and `labels/{train,val}` under `root`
pub fn create_layout(root: &Path) -> Result<()> {
    for dir in [TRAIN_IMAGES, VAL_IMAGES, TRAIN_LABELS, VAL_LABELS] {
        std::fs::create_dir_all(root.join(dir))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let names = vec!["solpanel".to_string(), "byggnad".to_string()];
        let manifest = DatasetManifest::new(dir.path(), &names)
            .with_stat("tiles", 12)
            .with_stat("labels", 30);

        let path = manifest.write().unwrap();
        assert!(path.ends_with(MANIFEST_FILE));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("nc: 2"));
        assert!(text.contains("train: images/train"));

        let back = DatasetManifest::read(&path).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.names[&1], "byggnad");
    }

    #[test]
    fn test_empty_stats_omitted() {
        let manifest = DatasetManifest::new("/data", &["solpanel".to_string()]);
        let yaml = serde_yaml::to_string(&manifest).unwrap();
        assert!(!yaml.contains("stats"));
    }

    #[test]
    fn test_create_layout() {
        let dir = tempfile::tempdir().unwrap();
        create_layout(dir.path()).unwrap();
        for sub in [TRAIN_IMAGES, VAL_IMAGES, TRAIN_LABELS, VAL_LABELS] {
            assert!(dir.path().join(sub).is_dir());
        }
    }
}
