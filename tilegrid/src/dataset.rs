//! Tiling a raster and collecting the labels for every tile

use crate::bbox::Bbox;
use crate::error::Result;
use crate::grid::{generate_tiles, Tile, TilingConfig};
use crate::reproject::{classify, GroundTruthBox, Reprojection, TileLabel};
use crate::spatial::BoxIndex;

/// One tile and the labels that survived reprojection into it
#[derive(Debug, Clone, PartialEq)]
pub struct TileLabels {
    pub tile: Tile,
    pub labels: Vec<TileLabel>,
}

impl TileLabels {
    pub fn is_background(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Result of tiling one raster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetBuild {
    /// Every kept tile in grid order, including tiles without labels
    pub tiles: Vec<TileLabels>,
    /// Overlapping box/tile pairs dropped by the visibility guard
    pub slivers_dropped: usize,
}

impl DatasetBuild {
    pub fn label_count(&self) -> usize {
        self.tiles.iter().map(|t| t.labels.len()).sum()
    }

    pub fn annotated_tiles(&self) -> usize {
        self.tiles.iter().filter(|t| !t.is_background()).count()
    }
}

/// Tile a raster of `raster_size = (width, height)` and reproject `boxes`
/// into every tile.
///
/// Labels within a tile keep the order of `boxes`.
pub fn build_dataset(
    raster_size: (u32, u32),
    boxes: &[GroundTruthBox],
    config: &TilingConfig,
) -> Result<DatasetBuild> {
    let grid = generate_tiles(raster_size, config)?;

    // Only the part of a box inside the raster can reach a tile. Clipping
    // bounds the cells an oversized box occupies by the raster's own grid.
    let extent = Bbox::new(0.0, 0.0, raster_size.0 as f64, raster_size.1 as f64);
    let mut index = BoxIndex::new(config.tile_size as f64);
    for (id, gt) in boxes.iter().enumerate() {
        if let Some(clipped) = gt.bbox().intersection(&extent) {
            index.insert(&clipped, id);
        }
    }

    let mut build = DatasetBuild::default();
    for tile in grid {
        let mut labels = Vec::new();
        for id in index.query(&tile.bbox()) {
            match classify(&boxes[id], &tile, config.min_visibility) {
                Reprojection::Label(label) => labels.push(label),
                Reprojection::BelowVisibility => build.slivers_dropped += 1,
                Reprojection::Disjoint => {}
            }
        }
        build.tiles.push(TileLabels { tile, labels });
    }

    Ok(build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reproject::reproject_box;

    fn scattered_boxes(n: usize) -> Vec<GroundTruthBox> {
        (0..n)
            .map(|i| {
                let x = ((i * 397) % 4800) as f64;
                let y = ((i * 211) % 3600) as f64;
                GroundTruthBox::new((i % 2) as u32, x, y, 30.0 + (i % 7) as f64 * 9.0, 25.0)
            })
            .collect()
    }

    #[test]
    fn test_matches_exhaustive_pairing() {
        let config = TilingConfig::default();
        let boxes = scattered_boxes(300);
        let build = build_dataset((5000, 3800), &boxes, &config).unwrap();

        for entry in &build.tiles {
            let expected: Vec<TileLabel> = boxes
                .iter()
                .filter_map(|b| reproject_box(b, &entry.tile, config.min_visibility))
                .collect();
            assert_eq!(entry.labels, expected, "tile {:?}", entry.tile);
        }
    }

    #[test]
    fn test_build_is_idempotent() {
        let config = TilingConfig::default();
        let boxes = scattered_boxes(120);
        let first = build_dataset((4000, 3000), &boxes, &config).unwrap();
        let second = build_dataset((4000, 3000), &boxes, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_background_tiles_are_kept() {
        let boxes = vec![GroundTruthBox::new(0, 100.0, 100.0, 50.0, 50.0)];
        let build = build_dataset((2000, 1500), &boxes, &TilingConfig::default()).unwrap();

        assert_eq!(build.tiles.len(), 4);
        assert_eq!(build.annotated_tiles(), 1);
        assert_eq!(build.label_count(), 1);
        assert!(build.tiles[3].is_background());
    }

    #[test]
    fn test_box_in_overlap_is_labelled_twice() {
        let boxes = vec![GroundTruthBox::new(0, 950.0, 200.0, 40.0, 40.0)];
        let build = build_dataset((2000, 1500), &boxes, &TilingConfig::default()).unwrap();
        assert_eq!(build.tiles[0].labels.len(), 1);
        assert_eq!(build.tiles[1].labels.len(), 1);
        assert_eq!(build.label_count(), 2);
    }

    #[test]
    fn test_box_outside_raster_yields_nothing() {
        let boxes = vec![GroundTruthBox::new(0, 5000.0, 5000.0, 40.0, 40.0)];
        let build = build_dataset((2000, 1500), &boxes, &TilingConfig::default()).unwrap();
        assert_eq!(build.label_count(), 0);
        assert_eq!(build.slivers_dropped, 0);
    }

    #[test]
    fn test_oversized_box_covers_every_tile() {
        let boxes = vec![GroundTruthBox::new(0, 0.0, 0.0, 3e7, 3e7)];
        let build = build_dataset((2000, 1500), &boxes, &TilingConfig::default()).unwrap();

        assert_eq!(build.tiles.len(), 4);
        for entry in &build.tiles {
            assert_eq!(entry.labels.len(), 1, "tile {:?}", entry.tile);
            assert_eq!(entry.labels[0].width, 1.0);
            assert_eq!(entry.labels[0].height, 1.0);
        }
    }

    #[test]
    fn test_box_hanging_off_raster_keeps_its_position() {
        // Negative origin: only the visible part enters the index, the label
        // is still computed from the full box
        let boxes = vec![
            GroundTruthBox::new(0, -5e6, -5e6, 5e6 + 100.0, 5e6 + 100.0),
            GroundTruthBox::new(1, 300.0, 300.0, 40.0, 40.0),
        ];
        let build = build_dataset((2000, 1500), &boxes, &TilingConfig::default()).unwrap();

        let first: Vec<u32> = build.tiles[0].labels.iter().map(|l| l.class_id).collect();
        assert_eq!(first, vec![0, 1]);
        assert_eq!(build.label_count(), 2);
    }

    #[test]
    fn test_slivers_are_counted() {
        // Right edge of the first tile is x=1024; only 4px of the box reach into it
        let boxes = vec![GroundTruthBox::new(0, 1020.0, 300.0, 60.0, 60.0)];
        let build = build_dataset((2000, 1500), &boxes, &TilingConfig::default()).unwrap();
        assert_eq!(build.slivers_dropped, 1);
        assert!(build.tiles[0].labels.is_empty());
        assert_eq!(build.tiles[1].labels.len(), 1);
    }
}
