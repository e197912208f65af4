//! Ground-truth annotation files
//!
//! Two input grammars are accepted. The text format written by the annotation
//! tool:
//!
//! ```text
//! Bild: downloaded_orthophotos/63_5_15.tif
//! Totalt markeringar: 2
//!
//! 1. Solpanel: x=3575, y=3067, w=44, h=39
//! 2. Byggnad: x=120, y=88, w=310, h=240
//! ```
//!
//! and line-delimited JSON, one box per line:
//!
//! ```text
//! {"image": "63_5_15.tif", "class": "solpanel", "x": 3575, "y": 3067, "w": 44, "h": 39}
//! ```
//!
//! A malformed record is rejected on its own; the rest of the file is kept.

use crate::error::{DatasetError, Result};
use crate::types::{AnnotationSet, ClassMap};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tilegrid::GroundTruthBox;

const HEADER: &str = "Bild:";
const COUNT_PREFIXES: [&str; 2] = ["Totalt markeringar:", "Annotationer:"];

/// Annotation sets read from one file plus the records that were rejected
#[derive(Debug, Default)]
pub struct ParsedAnnotations {
    pub sets: Vec<AnnotationSet>,
    pub rejected: Vec<DatasetError>,
}

impl ParsedAnnotations {
    pub fn box_count(&self) -> usize {
        self.sets.iter().map(|s| s.boxes.len()).sum()
    }
}

/// Read an annotation file, choosing the grammar by extension (`.jsonl` or text)
pub fn load_annotation_file(path: &Path, classes: &ClassMap) -> Result<ParsedAnnotations> {
    let text = std::fs::read_to_string(path)?;
    let is_jsonl = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("jsonl"))
        .unwrap_or(false);

    let parsed = if is_jsonl {
        parse_jsonl(&text, path, classes)
    } else {
        parse_legacy(&text, path, classes)?
    };

    for err in &parsed.rejected {
        log::warn!("{}", err);
    }
    log::debug!(
        "{}: {} boxes in {} set(s), {} rejected",
        path.display(),
        parsed.box_count(),
        parsed.sets.len(),
        parsed.rejected.len()
    );
    Ok(parsed)
}

/// Collect annotation files in `dir`: `annotations_*.txt` and `*.jsonl`, sorted
pub fn discover_annotation_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let is_text = name.starts_with("annotations_") && name.ends_with(".txt");
        let is_jsonl = name.ends_with(".jsonl");
        if is_text || is_jsonl {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse the text grammar. Several `Bild:` blocks yield several sets.
pub fn parse_legacy(text: &str, source: &Path, classes: &ClassMap) -> Result<ParsedAnnotations> {
    let mut parsed = ParsedAnnotations::default();
    let mut current: Option<(AnnotationSet, Option<usize>)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') || is_separator(line) {
            continue;
        }

        if let Some(image) = line.strip_prefix(HEADER) {
            let image = image.trim();
            if image.is_empty() {
                return Err(DatasetError::MissingHeader(source.to_path_buf()));
            }
            if let Some(done) = current.take() {
                finish_set(&mut parsed, done);
            }
            current = Some((AnnotationSet::new(source, image), None));
            continue;
        }

        let Some((set, declared)) = current.as_mut() else {
            return Err(DatasetError::MissingHeader(source.to_path_buf()));
        };

        if let Some(count) = COUNT_PREFIXES.iter().find_map(|p| line.strip_prefix(p)) {
            match count.trim().parse::<usize>() {
                Ok(n) => *declared = Some(n),
                Err(_) => parsed.rejected.push(DatasetError::annotation(
                    source,
                    line_no,
                    format!("invalid record count '{}'", count.trim()),
                )),
            }
            continue;
        }

        match parse_record(line) {
            Ok((class, x, y, w, h)) => match classes.resolve(&class) {
                Some(class_id) => set
                    .boxes
                    .push(GroundTruthBox::new(class_id, x, y, w, h)),
                None => parsed.rejected.push(DatasetError::UnknownClass {
                    source_path: source.to_path_buf(),
                    line: line_no,
                    class,
                }),
            },
            Err(message) => parsed
                .rejected
                .push(DatasetError::annotation(source, line_no, message)),
        }
    }

    match current {
        Some(done) => finish_set(&mut parsed, done),
        None => return Err(DatasetError::MissingHeader(source.to_path_buf())),
    }
    Ok(parsed)
}

fn finish_set(parsed: &mut ParsedAnnotations, (set, declared): (AnnotationSet, Option<usize>)) {
    if let Some(n) = declared {
        if n != set.boxes.len() {
            log::warn!(
                "{}: header declares {} records for {}, found {} valid",
                set.source.display(),
                n,
                set.image,
                set.boxes.len()
            );
        }
    }
    parsed.sets.push(set);
}

fn is_separator(line: &str) -> bool {
    line.chars().all(|c| c == '-' || c == '=')
}

/// Parse `N. Class: x=.., y=.., w=.., h=..`
fn parse_record(line: &str) -> std::result::Result<(String, f64, f64, f64, f64), String> {
    let (number, rest) = line
        .split_once('.')
        .ok_or_else(|| format!("expected 'N. Class: ...', got '{line}'"))?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("record must start with its number, got '{line}'"));
    }

    let (class, coords) = rest
        .split_once(':')
        .ok_or_else(|| format!("missing ':' after class name in '{line}'"))?;
    let class = class.trim();
    if class.is_empty() {
        return Err("empty class name".to_string());
    }

    let fields: Vec<&str> = coords.split(',').collect();
    if fields.len() != 4 {
        return Err(format!(
            "expected 4 coordinates x, y, w, h, got {}",
            fields.len()
        ));
    }

    let mut values = [0.0f64; 4];
    for ((field, key), value) in fields.iter().zip(["x", "y", "w", "h"]).zip(values.iter_mut()) {
        let (k, v) = field
            .split_once('=')
            .ok_or_else(|| format!("expected '{key}=<number>', got '{}'", field.trim()))?;
        if k.trim() != key {
            return Err(format!("expected '{key}', got '{}'", k.trim()));
        }
        *value = parse_number(key, v.trim())?;
    }

    let [x, y, w, h] = values;
    check_extent(w, h)?;
    Ok((class.to_string(), x, y, w, h))
}

fn parse_number(key: &str, raw: &str) -> std::result::Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("{key} is not a number: '{raw}'")),
    }
}

fn check_extent(w: f64, h: f64) -> std::result::Result<(), String> {
    if w <= 0.0 || h <= 0.0 {
        return Err(format!("width and height must be positive, got w={w}, h={h}"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonRecord {
    image: String,
    class: String,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

/// Parse line-delimited JSON records, grouping them by image in first-seen order
pub fn parse_jsonl(text: &str, source: &Path, classes: &ClassMap) -> ParsedAnnotations {
    let mut parsed = ParsedAnnotations::default();
    let mut by_image: BTreeMap<String, usize> = BTreeMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let record: JsonRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                parsed
                    .rejected
                    .push(DatasetError::annotation(source, line_no, e.to_string()));
                continue;
            }
        };

        if let Err(message) = check_extent(record.w, record.h) {
            parsed
                .rejected
                .push(DatasetError::annotation(source, line_no, message));
            continue;
        }

        let Some(class_id) = classes.resolve(&record.class) else {
            parsed.rejected.push(DatasetError::UnknownClass {
                source_path: source.to_path_buf(),
                line: line_no,
                class: record.class,
            });
            continue;
        };

        let slot = *by_image.entry(record.image.clone()).or_insert_with(|| {
            parsed
                .sets
                .push(AnnotationSet::new(source, record.image.clone()));
            parsed.sets.len() - 1
        });
        parsed.sets[slot].boxes.push(GroundTruthBox::new(
            class_id, record.x, record.y, record.w, record.h,
        ));
    }

    parsed
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Write annotation sets back in the text grammar, followed by per-class totals.
///
/// The output parses again with [`parse_legacy`].
pub fn write_summary<W: Write>(mut out: W, sets: &[AnnotationSet], classes: &ClassMap) -> Result<()> {
    let mut per_class: BTreeMap<u32, usize> = BTreeMap::new();

    for set in sets {
        writeln!(out, "{} {}", HEADER, set.image)?;
        writeln!(out, "{} {}", COUNT_PREFIXES[0], set.boxes.len())?;
        writeln!(out)?;

        for (i, b) in set.boxes.iter().enumerate() {
            let name = classes
                .name(b.class_id)
                .map(capitalize)
                .unwrap_or_else(|| format!("Class{}", b.class_id));
            writeln!(
                out,
                "{}. {}: x={:.0}, y={:.0}, w={:.0}, h={:.0}",
                i + 1,
                name,
                b.x,
                b.y,
                b.w,
                b.h
            )?;
            *per_class.entry(b.class_id).or_insert(0) += 1;
        }

        writeln!(out)?;
        writeln!(out, "{}", "-".repeat(40))?;
        writeln!(out)?;
    }

    let total: usize = per_class.values().sum();
    writeln!(out, "# Images: {}", sets.len())?;
    writeln!(out, "# Records: {}", total)?;
    for (class_id, count) in per_class {
        let name = classes.name(class_id).unwrap_or("?");
        writeln!(out, "# {}: {}", name, count)?;
    }
    out.flush()?;
    Ok(())
}
