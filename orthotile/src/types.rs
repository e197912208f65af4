//! Configuration and ground-truth types shared across the toolkit

use crate::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tilegrid::{GroundTruthBox, TilingConfig};

/// Dataset build configuration, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Tile geometry and label filtering thresholds
    pub tiling: TilingConfig,

    /// Class names in label-id order
    pub class_names: Vec<String>,

    /// Alternative spellings accepted in annotation files, mapped to a class name
    pub class_aliases: BTreeMap<String, String>,

    /// Directory that relative raster paths resolve against.
    /// Falls back to the annotation file's directory when unset.
    pub raster_root: Option<PathBuf>,

    /// Extension of written tile images
    pub tile_extension: String,

    /// JPEG quality used when `tile_extension` is jpg/jpeg
    pub jpeg_quality: u8,

    /// Fraction of samples routed to validation when merging datasets
    pub val_fraction: f64,

    /// Seed of the merge shuffle
    pub split_seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        let mut class_aliases = BTreeMap::new();
        class_aliases.insert("solcell".to_string(), "solpanel".to_string());

        Self {
            tiling: TilingConfig::default(),
            class_names: vec!["solpanel".to_string(), "byggnad".to_string()],
            class_aliases,
            raster_root: None,
            tile_extension: "jpg".to_string(),
            jpeg_quality: 95,
            val_fraction: 0.2,
            split_seed: 42,
        }
    }
}

impl DatasetConfig {
    /// Load configuration from a JSON file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        log::debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tiling.validate()?;

        if self.class_names.is_empty() {
            return Err(DatasetError::config("class_names must not be empty"));
        }
        let classes = ClassMap::from_config(self);
        for (i, name) in self.class_names.iter().enumerate() {
            if classes.resolve(name) != Some(i as u32) {
                return Err(DatasetError::config(format!(
                    "class name '{name}' is listed more than once"
                )));
            }
        }
        for (alias, target) in &self.class_aliases {
            if classes.resolve(target).is_none() {
                return Err(DatasetError::config(format!(
                    "alias '{alias}' points at unknown class '{target}'"
                )));
            }
        }
        if self.tile_extension.trim().is_empty() {
            return Err(DatasetError::config("tile_extension must not be empty"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(DatasetError::config(format!(
                "jpeg_quality ({}) must lie in 1..=100",
                self.jpeg_quality
            )));
        }
        if !(0.0..1.0).contains(&self.val_fraction) {
            return Err(DatasetError::config(format!(
                "val_fraction ({}) must lie in [0, 1)",
                self.val_fraction
            )));
        }
        Ok(())
    }

    pub fn class_map(&self) -> ClassMap {
        ClassMap::from_config(self)
    }
}

/// Case-insensitive lookup from annotation class names to label ids
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    names: Vec<String>,
    aliases: BTreeMap<String, String>,
}

impl ClassMap {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            aliases: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            names: config.class_names.clone(),
            aliases: config
                .class_aliases
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
                .collect(),
        }
    }

    pub fn with_alias(mut self, alias: &str, target: &str) -> Self {
        self.aliases
            .insert(alias.to_lowercase(), target.to_lowercase());
        self
    }

    pub fn resolve(&self, raw: &str) -> Option<u32> {
        let key = raw.trim().to_lowercase();
        let key = self.aliases.get(&key).cloned().unwrap_or(key);
        self.names
            .iter()
            .position(|n| n.to_lowercase() == key)
            .map(|i| i as u32)
    }

    pub fn name(&self, class_id: u32) -> Option<&str> {
        self.names.get(class_id as usize).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Ground truth for one source raster
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSet {
    /// Annotation file the set was read from
    pub source: PathBuf,
    /// Raster path exactly as written in the annotation file
    pub image: String,
    pub boxes: Vec<GroundTruthBox>,
}

impl AnnotationSet {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(source: P, image: S) -> Self {
        Self {
            source: source.into(),
            image: image.into(),
            boxes: Vec::new(),
        }
    }

    /// File name of the raster without directories
    pub fn image_name(&self) -> String {
        Path::new(&self.image)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image.clone())
    }

    /// File stem of the raster, used to name its tiles
    pub fn image_stem(&self) -> String {
        Path::new(&self.image)
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image.clone())
    }

    /// Locate the raster on disk.
    ///
    /// Absolute paths are used as-is; relative paths resolve against
    /// `raster_root` when given, otherwise against the annotation file's
    /// directory.
    pub fn resolve_raster(&self, raster_root: Option<&Path>) -> PathBuf {
        let image = Path::new(&self.image);
        if image.is_absolute() {
            return image.to_path_buf();
        }
        match raster_root {
            Some(root) => root.join(image),
            None => self
                .source
                .parent()
                .map(|dir| dir.join(image))
                .unwrap_or_else(|| image.to_path_buf()),
        }
    }
}
