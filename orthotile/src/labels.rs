//! YOLO label records

use crate::error::{DatasetError, Result};
use std::path::{Path, PathBuf};
use tilegrid::TileLabel;

/// Format one label as `"<class_id> <cx> <cy> <w> <h>"` with six decimals
pub fn format_label(label: &TileLabel) -> String {
    format!(
        "{} {:.6} {:.6} {:.6} {:.6}",
        label.class_id, label.center_x, label.center_y, label.width, label.height
    )
}

/// All labels of a tile, one per line with a trailing newline
pub fn format_labels(labels: &[TileLabel]) -> String {
    let mut out = String::with_capacity(labels.len() * 48);
    for label in labels {
        out.push_str(&format_label(label));
        out.push('\n');
    }
    out
}

/// Label file path for a tile image: same stem, `.txt`, inside `labels_dir`
pub fn label_path(labels_dir: &Path, tile_filename: &str) -> PathBuf {
    labels_dir.join(Path::new(tile_filename).with_extension("txt"))
}

/// Write the label file of one tile.
///
/// Tiles without labels get no file; returns whether a file was written.
pub fn write_label_file(path: &Path, labels: &[TileLabel]) -> Result<bool> {
    if labels.is_empty() {
        return Ok(false);
    }
    std::fs::write(path, format_labels(labels)).map_err(|e| DatasetError::tile_write(path, e))?;
    Ok(true)
}

/// Count the non-blank lines of a label file. Missing files count as zero.
pub fn count_label_lines(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|text| text.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}
