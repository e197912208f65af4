//! Error types for the orthophoto dataset tooling

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the dataset tooling
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors that can occur while building or inspecting datasets
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("{}:{line}: malformed annotation record: {message}", source_path.display())]
    Annotation {
        source_path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{}:{line}: unknown class '{class}'", source_path.display())]
    UnknownClass {
        source_path: PathBuf,
        line: usize,
        class: String,
    },

    #[error("{}: missing 'Bild:' header", .0.display())]
    MissingHeader(PathBuf),

    #[error("Source raster not found: {}", .0.display())]
    MissingRaster(PathBuf),

    #[error("Failed to decode raster {}: {source}", path.display())]
    RasterDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write {}: {reason}", path.display())]
    TileWrite { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Training statistics error: {0}")]
    StatsError(String),

    #[error(transparent)]
    Tiling(#[from] tilegrid::TilingError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl DatasetError {
    pub fn annotation<P: Into<PathBuf>, S: Into<String>>(source: P, line: usize, msg: S) -> Self {
        Self::Annotation {
            source_path: source.into(),
            line,
            message: msg.into(),
        }
    }

    pub fn tile_write<P: Into<PathBuf>, E: std::fmt::Display>(path: P, err: E) -> Self {
        Self::TileWrite {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn stats<S: Into<String>>(msg: S) -> Self {
        Self::StatsError(msg.into())
    }

    /// Record-level errors leave the rest of the file usable
    pub fn is_record_error(&self) -> bool {
        matches!(self, Self::Annotation { .. } | Self::UnknownClass { .. })
    }
}
