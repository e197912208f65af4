//! Re-expressing absolute ground-truth boxes in a tile's normalized frame

use crate::bbox::Bbox;
use crate::grid::Tile;
use serde::{Deserialize, Serialize};

/// Ground-truth box in absolute raster coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthBox {
    pub class_id: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl GroundTruthBox {
    pub fn new(class_id: u32, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            class_id,
            x,
            y,
            w,
            h,
        }
    }

    pub fn bbox(&self) -> Bbox {
        Bbox::from_xywh(self.x, self.y, self.w, self.h)
    }
}

/// YOLO-style label relative to one tile, all values in (0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileLabel {
    pub class_id: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl TileLabel {
    /// Map the label back to absolute raster coordinates
    pub fn to_absolute(&self, tile: &Tile) -> Bbox {
        let tw = tile.width as f64;
        let th = tile.height as f64;
        let w = self.width * tw;
        let h = self.height * th;
        let xmin = self.center_x * tw - w / 2.0 + tile.x_offset as f64;
        let ymin = self.center_y * th - h / 2.0 + tile.y_offset as f64;
        Bbox::from_xywh(xmin, ymin, w, h)
    }
}

/// Outcome of intersecting one box with one tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reprojection {
    Label(TileLabel),
    /// Rectangles do not overlap, or only share an edge
    Disjoint,
    /// Overlap exists but is too thin on at least one axis
    BelowVisibility,
}

impl Reprojection {
    pub fn label(self) -> Option<TileLabel> {
        match self {
            Reprojection::Label(label) => Some(label),
            _ => None,
        }
    }
}

/// Classify the intersection of `gt` with `tile`
pub fn classify(gt: &GroundTruthBox, tile: &Tile, min_visibility: f64) -> Reprojection {
    let tile_box = tile.bbox();
    let Some(inter) = gt.bbox().intersection(&tile_box) else {
        return Reprojection::Disjoint;
    };

    let tw = tile.width as f64;
    let th = tile.height as f64;

    let local_x = inter.xmin - tile_box.xmin;
    let local_y = inter.ymin - tile_box.ymin;
    let local_w = inter.width();
    let local_h = inter.height();

    let width = local_w / tw;
    let height = local_h / th;

    if width <= min_visibility || height <= min_visibility {
        return Reprojection::BelowVisibility;
    }

    Reprojection::Label(TileLabel {
        class_id: gt.class_id,
        center_x: (local_x + local_w / 2.0) / tw,
        center_y: (local_y + local_h / 2.0) / th,
        width,
        height,
    })
}

/// Visible part of `gt` inside `tile` as a normalized label, or `None` when
/// there is no overlap or the overlap is a sliver
pub fn reproject_box(gt: &GroundTruthBox, tile: &Tile, min_visibility: f64) -> Option<TileLabel> {
    classify(gt, tile, min_visibility).label()
}
