//! COCO JSON export of whole-raster ground truth

use crate::batch::Skipped;
use crate::error::Result;
use crate::image_utils::raster_dimensions;
use crate::types::{AnnotationSet, ClassMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u32,
    /// `[x, y, width, height]` in pixels
    pub bbox: [f64; 4],
    pub area: f64,
    pub iscrowd: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: u32,
    pub name: String,
    pub supercategory: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CocoDataset {
    pub images: Vec<CocoImage>,
    pub annotations: Vec<CocoAnnotation>,
    pub categories: Vec<CocoCategory>,
}

/// Export result: the dataset plus rasters that could not be measured
#[derive(Debug, Clone, Default)]
pub struct CocoExport {
    pub dataset: CocoDataset,
    pub skipped: Vec<Skipped>,
}

/// Category ids equal label ids, so YOLO and COCO output agree
pub fn categories(classes: &ClassMap) -> Vec<CocoCategory> {
    classes
        .names()
        .iter()
        .enumerate()
        .map(|(i, name)| CocoCategory {
            id: i as u32,
            name: name.clone(),
            supercategory: "object".to_string(),
        })
        .collect()
}

/// Convert annotation sets to COCO.
///
/// Image and annotation ids start at 1. Sets naming the same raster share one
/// image entry. Raster sizes come from the file headers; a raster that cannot
/// be read is left out together with its boxes.
pub fn build_coco(
    sets: &[AnnotationSet],
    classes: &ClassMap,
    raster_root: Option<&Path>,
) -> CocoExport {
    let mut export = CocoExport {
        dataset: CocoDataset {
            categories: categories(classes),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut image_ids: HashMap<PathBuf, u64> = HashMap::new();

    for set in sets {
        let raster = set.resolve_raster(raster_root);
        let image_id = match image_ids.get(&raster) {
            Some(&id) => id,
            None => match raster_dimensions(&raster) {
                Ok((width, height)) => {
                    let id = export.dataset.images.len() as u64 + 1;
                    export.dataset.images.push(CocoImage {
                        id,
                        file_name: set.image_name(),
                        width,
                        height,
                    });
                    image_ids.insert(raster, id);
                    id
                }
                Err(e) => {
                    log::warn!("Leaving {} out of COCO export: {}", set.image, e);
                    export.skipped.push(Skipped::raster(set.image.clone(), e));
                    continue;
                }
            },
        };

        for gt in &set.boxes {
            let id = export.dataset.annotations.len() as u64 + 1;
            export.dataset.annotations.push(CocoAnnotation {
                id,
                image_id,
                category_id: gt.class_id,
                bbox: [gt.x, gt.y, gt.w, gt.h],
                area: gt.w * gt.h,
                iscrowd: 0,
            });
        }
    }

    log::info!(
        "COCO export: {} images, {} annotations",
        export.dataset.images.len(),
        export.dataset.annotations.len()
    );
    export
}

pub fn write_coco(path: &Path, dataset: &CocoDataset) -> Result<()> {
    let json = serde_json::to_string_pretty(dataset)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Write `classes.txt`, one class name per line in label-id order
pub fn write_classes_txt(dir: &Path, classes: &ClassMap) -> Result<PathBuf> {
    let path = dir.join("classes.txt");
    std::fs::write(&path, classes.names().join("\n") + "\n")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SkipKind;
    use crate::image_utils::create_test_raster;
    use tilegrid::GroundTruthBox;

    fn classes() -> ClassMap {
        ClassMap::new(vec!["solpanel".to_string(), "byggnad".to_string()])
    }

    #[test]
    fn test_build_coco() {
        let dir = tempfile::tempdir().unwrap();
        create_test_raster(120, 80)
            .save(dir.path().join("a.png"))
            .unwrap();
        let source = dir.path().join("annotations_a.txt");

        let mut a = AnnotationSet::new(&source, "a.png");
        a.boxes.push(GroundTruthBox::new(0, 10.0, 12.0, 20.0, 5.0));
        a.boxes.push(GroundTruthBox::new(1, 40.0, 40.0, 10.0, 10.0));
        let mut missing = AnnotationSet::new(&source, "gone.tif");
        missing.boxes.push(GroundTruthBox::new(0, 1.0, 1.0, 2.0, 2.0));
        let mut again = AnnotationSet::new(&source, "a.png");
        again.boxes.push(GroundTruthBox::new(0, 60.0, 5.0, 4.0, 4.0));

        let export = build_coco(&[a, missing, again], &classes(), None);
        let coco = &export.dataset;

        assert_eq!(coco.images.len(), 1);
        assert_eq!(coco.images[0].id, 1);
        assert_eq!((coco.images[0].width, coco.images[0].height), (120, 80));
        assert_eq!(coco.annotations.len(), 3);
        assert_eq!(coco.annotations[0].id, 1);
        assert!(coco.annotations.iter().all(|a| a.image_id == 1));
        assert_eq!(coco.annotations[0].area, 100.0);
        assert_eq!(coco.annotations[1].category_id, 1);
        assert_eq!(coco.categories[1].supercategory, "object");
        assert_eq!(export.skipped.len(), 1);
        assert_eq!(export.skipped[0].item, "gone.tif");
        assert_eq!(export.skipped[0].kind, SkipKind::Raster);
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let coco = CocoDataset {
            categories: categories(&classes()),
            ..Default::default()
        };
        let path = dir.path().join("coco.json");
        write_coco(&path, &coco).unwrap();
        let back: CocoDataset =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, coco);

        let classes_path = write_classes_txt(dir.path(), &classes()).unwrap();
        assert_eq!(
            std::fs::read_to_string(classes_path).unwrap(),
            "solpanel\nbyggnad\n"
        );
    }
}
