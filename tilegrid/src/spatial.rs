//! Coarse grid bucketing of boxes, so each tile only inspects nearby boxes

use crate::bbox::Bbox;
use std::collections::HashMap;

/// Buckets box ids by the grid cells their extent touches
#[derive(Debug, Clone)]
pub struct BoxIndex {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
    len: usize,
}

impl BoxIndex {
    /// Create an empty index.
    ///
    /// # Arguments
    /// * `cell_size` - Edge length of a bucket. The tile size is a good choice.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: HashMap::new(),
            len: 0,
        }
    }

    /// Build an index over `boxes`, using each box's position as its id
    pub fn from_boxes<'a, I>(cell_size: f64, boxes: I) -> Self
    where
        I: IntoIterator<Item = &'a Bbox>,
    {
        let mut index = Self::new(cell_size);
        for (id, bbox) in boxes.into_iter().enumerate() {
            index.insert(bbox, id);
        }
        index
    }

    fn cell_range(&self, bbox: &Bbox) -> (i64, i64, i64, i64) {
        (
            (bbox.xmin / self.cell_size).floor() as i64,
            (bbox.ymin / self.cell_size).floor() as i64,
            (bbox.xmax / self.cell_size).ceil() as i64,
            (bbox.ymax / self.cell_size).ceil() as i64,
        )
    }

    pub fn insert(&mut self, bbox: &Bbox, id: usize) {
        let (x_min, y_min, x_max, y_max) = self.cell_range(bbox);
        for x in x_min..=x_max {
            for y in y_min..=y_max {
                self.cells.entry((x, y)).or_default().push(id);
            }
        }
        self.len += 1;
    }

    /// Ids of boxes that may overlap `bbox`, ascending and without duplicates
    pub fn query(&self, bbox: &Bbox) -> Vec<usize> {
        let (x_min, y_min, x_max, y_max) = self.cell_range(bbox);

        let mut candidates = Vec::new();
        for x in x_min..=x_max {
            for y in y_min..=y_max {
                if let Some(ids) = self.cells.get(&(x, y)) {
                    candidates.extend(ids);
                }
            }
        }

        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stats(&self) -> BoxIndexStats {
        let total_cells = self.cells.len();
        let total_entries: usize = self.cells.values().map(|v| v.len()).sum();
        let max_entries = self.cells.values().map(|v| v.len()).max().unwrap_or(0);

        BoxIndexStats {
            total_cells,
            total_entries,
            max_entries_per_cell: max_entries,
        }
    }
}

/// Occupancy figures for a [`BoxIndex`]
#[derive(Debug, Clone)]
pub struct BoxIndexStats {
    pub total_cells: usize,
    pub total_entries: usize,
    pub max_entries_per_cell: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_finds_nearby_boxes_only() {
        let boxes = vec![
            Bbox::new(0.0, 0.0, 50.0, 50.0),
            Bbox::new(1500.0, 1500.0, 1550.0, 1550.0),
        ];
        let index = BoxIndex::from_boxes(100.0, &boxes);

        let hits = index.query(&Bbox::new(25.0, 25.0, 75.0, 75.0));
        assert!(hits.contains(&0));
        assert!(!hits.contains(&1));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_box_spanning_cells_is_reported_once() {
        let boxes = vec![Bbox::new(0.0, 0.0, 450.0, 450.0)];
        let index = BoxIndex::from_boxes(100.0, &boxes);
        assert_eq!(index.query(&Bbox::new(0.0, 0.0, 1000.0, 1000.0)), vec![0]);
        assert!(index.stats().total_cells > 1);
    }

    #[test]
    fn test_query_returns_sorted_ids() {
        let boxes: Vec<Bbox> = (0..10)
            .rev()
            .map(|i| Bbox::from_xywh(i as f64 * 10.0, 0.0, 5.0, 5.0))
            .collect();
        let index = BoxIndex::from_boxes(64.0, &boxes);
        let hits = index.query(&Bbox::new(0.0, 0.0, 200.0, 10.0));
        assert_eq!(hits, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_box_on_cell_boundary_is_seen_from_both_sides() {
        // Left edge sits on x=100, right edge on x=200, both cell boundaries
        let boxes = vec![Bbox::new(100.0, 0.0, 200.0, 50.0)];
        let index = BoxIndex::from_boxes(100.0, &boxes);

        assert_eq!(index.query(&Bbox::new(0.0, 0.0, 100.0, 100.0)), vec![0]);
        assert_eq!(index.query(&Bbox::new(100.0, 0.0, 200.0, 100.0)), vec![0]);
        assert_eq!(index.query(&Bbox::new(200.0, 0.0, 300.0, 100.0)), vec![0]);
        assert!(index.query(&Bbox::new(350.0, 0.0, 450.0, 100.0)).is_empty());

        // Same on the y axis
        let boxes = vec![Bbox::new(0.0, 100.0, 50.0, 200.0)];
        let index = BoxIndex::from_boxes(100.0, &boxes);
        assert_eq!(index.query(&Bbox::new(0.0, 0.0, 100.0, 100.0)), vec![0]);
        assert_eq!(index.query(&Bbox::new(0.0, 200.0, 100.0, 300.0)), vec![0]);
    }

    #[test]
    fn test_empty_index() {
        let index = BoxIndex::new(100.0);
        assert!(index.is_empty());
        assert!(index.query(&Bbox::new(0.0, 0.0, 10.0, 10.0)).is_empty());
    }
}
