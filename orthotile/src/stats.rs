//! Training-run statistics from an Ultralytics `results.csv`
//!
//! Epochs are numbered by row, starting at 1. Loss totals are the sum of the
//! box, classification and distribution-focal terms.

use crate::error::{DatasetError, Result};
use serde::Deserialize;
use std::fmt;
use std::io::Read;
use std::path::Path;

pub const MILESTONES: [usize; 5] = [10, 25, 50, 75, 100];
pub const MAP_THRESHOLDS: [f64; 3] = [0.01, 0.1, 0.2];
const STABILITY_WINDOW: usize = 20;
const TOP_EPOCHS: usize = 5;

/// One row of `results.csv`. Other columns are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EpochRecord {
    #[serde(rename = "train/box_loss")]
    pub train_box_loss: f64,
    #[serde(rename = "train/cls_loss")]
    pub train_cls_loss: f64,
    #[serde(rename = "train/dfl_loss")]
    pub train_dfl_loss: f64,
    #[serde(rename = "metrics/precision(B)")]
    pub precision: f64,
    #[serde(rename = "metrics/recall(B)")]
    pub recall: f64,
    #[serde(rename = "metrics/mAP50(B)")]
    pub map50: f64,
    #[serde(rename = "metrics/mAP50-95(B)")]
    pub map50_95: f64,
    #[serde(rename = "val/box_loss")]
    pub val_box_loss: f64,
    #[serde(rename = "val/cls_loss")]
    pub val_cls_loss: f64,
    #[serde(rename = "val/dfl_loss")]
    pub val_dfl_loss: f64,
    /// Cumulative wall time in seconds, absent in older exports
    #[serde(default)]
    pub time: Option<f64>,
}

impl EpochRecord {
    pub fn train_loss(&self) -> f64 {
        self.train_box_loss + self.train_cls_loss + self.train_dfl_loss
    }

    pub fn val_loss(&self) -> f64 {
        self.val_box_loss + self.val_cls_loss + self.val_dfl_loss
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            map50: self.map50,
            precision: self.precision,
            recall: self.recall,
        }
    }
}

/// Headline detection metrics of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub map50: f64,
    pub precision: f64,
    pub recall: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    High,
    Medium,
    Low,
}

impl Stability {
    pub fn from_std(std: f64) -> Self {
        if std < 0.01 {
            Self::High
        } else if std < 0.02 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossVerdict {
    /// Training loss falls while validation loss rises
    PossibleOverfitting,
    BothImproving,
    Stable,
}

impl LossVerdict {
    pub fn from_trends(train: f64, val: f64) -> Self {
        if train < 0.0 && val > 0.0 {
            Self::PossibleOverfitting
        } else if train < 0.0 && val < 0.0 {
            Self::BothImproving
        } else {
            Self::Stable
        }
    }
}

impl fmt::Display for LossVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PossibleOverfitting => "possible overfitting: validation loss rises",
            Self::BothImproving => "training and validation loss both improving",
            Self::Stable => "stable",
        };
        f.write_str(s)
    }
}

/// Parsed `results.csv`
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRun {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingRun {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Headers and fields are whitespace-trimmed, as Ultralytics pads them
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let epochs = reader
            .deserialize()
            .collect::<std::result::Result<Vec<EpochRecord>, _>>()?;
        if epochs.is_empty() {
            return Err(DatasetError::stats("results contain no epochs"));
        }
        Ok(Self { epochs })
    }

    pub fn first(&self) -> &EpochRecord {
        &self.epochs[0]
    }

    pub fn last(&self) -> &EpochRecord {
        &self.epochs[self.epochs.len() - 1]
    }

    /// 1-based epoch with the highest mAP50; the earliest wins a tie
    pub fn best_map50(&self) -> (usize, f64) {
        self.epochs
            .iter()
            .enumerate()
            .fold((1, f64::NEG_INFINITY), |best, (i, e)| {
                if e.map50 > best.1 {
                    (i + 1, e.map50)
                } else {
                    best
                }
            })
    }

    /// First 1-based epoch whose mAP50 exceeds `threshold`
    pub fn first_epoch_above(&self, threshold: f64) -> Option<usize> {
        self.epochs
            .iter()
            .position(|e| e.map50 > threshold)
            .map(|i| i + 1)
    }

    /// The `n` best epochs by mAP50, best first
    pub fn top_epochs(&self, n: usize) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = self
            .epochs
            .iter()
            .enumerate()
            .map(|(i, e)| (i + 1, e.map50))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }

    pub fn summary(&self) -> RunSummary {
        let first = *self.first();
        let last = *self.last();
        let n = self.epochs.len();

        let total_seconds = last.time;
        let window: Vec<f64> = self.epochs[n.saturating_sub(STABILITY_WINDOW)..]
            .iter()
            .map(|e| e.map50)
            .collect();
        let (mean, std) = mean_std(&window);

        let train_losses: Vec<f64> = self.epochs.iter().map(EpochRecord::train_loss).collect();
        let val_losses: Vec<f64> = self.epochs.iter().map(EpochRecord::val_loss).collect();
        let train_trend = linear_slope(&train_losses);
        let val_trend = linear_slope(&val_losses);

        RunSummary {
            epochs: n,
            total_hours: total_seconds.map(|s| s / 3600.0),
            minutes_per_epoch: total_seconds.map(|s| s / 60.0 / n as f64),
            first,
            last,
            best_map50: self.best_map50(),
            best_precision: self.epochs.iter().map(|e| e.precision).fold(f64::MIN, f64::max),
            best_recall: self.epochs.iter().map(|e| e.recall).fold(f64::MIN, f64::max),
            milestones: MILESTONES
                .iter()
                .filter(|&&m| m <= n)
                .map(|&m| (m, self.epochs[m - 1]))
                .collect(),
            window_mean: mean,
            window_std: std,
            stability: Stability::from_std(std),
            first_above: MAP_THRESHOLDS
                .iter()
                .map(|&t| (t, self.first_epoch_above(t)))
                .collect(),
            top: self.top_epochs(TOP_EPOCHS),
            train_trend,
            val_trend,
            verdict: LossVerdict::from_trends(train_trend, val_trend),
        }
    }
}

/// Population mean and standard deviation
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Least-squares slope of `values` against their index
fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    num / den
}

fn percent_change(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to - from) / from * 100.0)
}

/// Everything reported about one training run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub epochs: usize,
    pub total_hours: Option<f64>,
    pub minutes_per_epoch: Option<f64>,
    pub first: EpochRecord,
    pub last: EpochRecord,
    /// `(epoch, mAP50)`
    pub best_map50: (usize, f64),
    pub best_precision: f64,
    pub best_recall: f64,
    pub milestones: Vec<(usize, EpochRecord)>,
    pub window_mean: f64,
    pub window_std: f64,
    pub stability: Stability,
    pub first_above: Vec<(f64, Option<usize>)>,
    pub top: Vec<(usize, f64)>,
    /// Loss change per epoch
    pub train_trend: f64,
    pub val_trend: f64,
    pub verdict: LossVerdict,
}

impl RunSummary {
    /// Final mAP50 over first-epoch mAP50
    pub fn improvement_factor(&self) -> Option<f64> {
        (self.first.map50 > 0.0).then(|| self.last.map50 / self.first.map50)
    }
}

fn pct(v: f64) -> String {
    format!("{:.4} ({:.2}%)", v, v * 100.0)
}

fn signed_pct(v: Option<f64>) -> String {
    v.map(|v| format!("{v:+.1}%")).unwrap_or_else(|| "n/a".to_string())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Training statistics")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Overview:")?;
        writeln!(f, "   Epochs: {}", self.epochs)?;
        if let (Some(hours), Some(minutes)) = (self.total_hours, self.minutes_per_epoch) {
            writeln!(f, "   Training time: {hours:.1} hours")?;
            writeln!(f, "   Mean time per epoch: {minutes:.1} minutes")?;
        }

        writeln!(f, "\nFinal result (epoch {}):", self.epochs)?;
        writeln!(f, "   mAP50: {}", pct(self.last.map50))?;
        writeln!(f, "   mAP50-95: {}", pct(self.last.map50_95))?;
        writeln!(f, "   Precision: {}", pct(self.last.precision))?;
        writeln!(f, "   Recall: {}", pct(self.last.recall))?;

        let (best_epoch, best_map) = self.best_map50;
        writeln!(f, "\nBest during training:")?;
        writeln!(f, "   mAP50: {} at epoch {}", pct(best_map), best_epoch)?;
        writeln!(f, "   Precision: {}", pct(self.best_precision))?;
        writeln!(f, "   Recall: {}", pct(self.best_recall))?;

        writeln!(f, "\nImprovement from start:")?;
        match self.improvement_factor() {
            Some(factor) => writeln!(
                f,
                "   mAP50: {:.6} -> {:.4} = {:.0}x",
                self.first.map50, self.last.map50, factor
            )?,
            None => writeln!(f, "   mAP50: {:.6} -> {:.4}", self.first.map50, self.last.map50)?,
        }

        let (train_from, train_to) = (self.first.train_loss(), self.last.train_loss());
        let (val_from, val_to) = (self.first.val_loss(), self.last.val_loss());
        writeln!(f, "\nLoss:")?;
        writeln!(
            f,
            "   Training: {:.3} -> {:.3} ({})",
            train_from,
            train_to,
            signed_pct(percent_change(train_from, train_to))
        )?;
        writeln!(
            f,
            "   Validation: {:.3} -> {:.3} ({})",
            val_from,
            val_to,
            signed_pct(percent_change(val_from, val_to))
        )?;

        if !self.milestones.is_empty() {
            writeln!(f, "\nMilestones:")?;
            for (epoch, e) in &self.milestones {
                writeln!(
                    f,
                    "   Epoch {:3}: mAP50={:.4}, P={:.3}, R={:.3}",
                    epoch, e.map50, e.precision, e.recall
                )?;
            }
        }

        writeln!(f, "\nStability (last {} epochs):", STABILITY_WINDOW)?;
        writeln!(f, "   Std dev: {:.4}", self.window_std)?;
        writeln!(f, "   Mean: {:.4}", self.window_mean)?;
        writeln!(f, "   Stability: {}", self.stability)?;

        writeln!(f, "\nFirst epoch above:")?;
        for (threshold, epoch) in &self.first_above {
            match epoch {
                Some(e) => writeln!(f, "   mAP50 > {:.0}%: epoch {}", threshold * 100.0, e)?,
                None => writeln!(f, "   mAP50 > {:.0}%: never", threshold * 100.0)?,
            }
        }

        writeln!(f, "\nTop {} epochs (mAP50):", self.top.len())?;
        for (rank, (epoch, map)) in self.top.iter().enumerate() {
            writeln!(f, "   {}. Epoch {}: {}", rank + 1, epoch, pct(*map))?;
        }

        writeln!(f, "\nOverfitting check:")?;
        writeln!(f, "   Training loss trend: {:+.6}", self.train_trend)?;
        writeln!(f, "   Validation loss trend: {:+.6}", self.val_trend)?;
        writeln!(f, "   Verdict: {}", self.verdict)
    }
}

/// Final metrics of a candidate run against a baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunComparison {
    pub baseline: Metrics,
    pub candidate: Metrics,
}

impl RunComparison {
    pub fn new(baseline: Metrics, candidate: Metrics) -> Self {
        Self {
            baseline,
            candidate,
        }
    }

    pub fn from_runs(baseline: &TrainingRun, candidate: &TrainingRun) -> Self {
        Self::new(baseline.last().metrics(), candidate.last().metrics())
    }

    /// Relative changes in percent: `(mAP50, precision, recall)`
    pub fn changes(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        (
            percent_change(self.baseline.map50, self.candidate.map50),
            percent_change(self.baseline.precision, self.candidate.precision),
            percent_change(self.baseline.recall, self.candidate.recall),
        )
    }

    pub fn map_improved(&self) -> bool {
        self.candidate.map50 > self.baseline.map50
    }
}

impl fmt::Display for RunComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Baseline vs candidate")?;
        writeln!(f, "{}", "=".repeat(50))?;
        for (name, m) in [("Baseline", self.baseline), ("Candidate", self.candidate)] {
            writeln!(f, "{name}:")?;
            writeln!(f, "   mAP50: {}", pct(m.map50))?;
            writeln!(f, "   Precision: {}", pct(m.precision))?;
            writeln!(f, "   Recall: {}", pct(m.recall))?;
        }
        let (map, precision, recall) = self.changes();
        writeln!(f, "Change:")?;
        writeln!(f, "   mAP50: {}", signed_pct(map))?;
        writeln!(f, "   Precision: {}", signed_pct(precision))?;
        writeln!(f, "   Recall: {}", signed_pct(recall))?;
        if self.map_improved() {
            writeln!(f, "Candidate improves mAP50")
        } else {
            writeln!(f, "No mAP50 improvement")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const HEADER: &str = "                  epoch,      train/box_loss,      train/cls_loss,      train/dfl_loss,   metrics/precision(B),      metrics/recall(B),       metrics/mAP50(B),    metrics/mAP50-95(B),        val/box_loss,        val/cls_loss,        val/dfl_loss,              lr/pg0,              time";

    /// Synthetic run: mAP50 = 0.001 + 0.005 * epoch, losses fall linearly
    fn synthetic_csv(epochs: usize) -> String {
        let mut csv = String::from(HEADER);
        csv.push('\n');
        for i in 0..epochs {
            let e = i as f64;
            csv.push_str(&format!(
                "{:>23},{:>20},{:>20},{:>20},{:>23},{:>23},{:>23},{:>23},{:>20},{:>20},{:>20},{:>20},{:>18}\n",
                i + 1,
                2.0 - 0.01 * e,
                3.0 - 0.02 * e,
                1.5 - 0.005 * e,
                0.1 + 0.004 * e,
                0.05 + 0.003 * e,
                0.006 + 0.005 * e,
                0.002 + 0.002 * e,
                2.5 - 0.01 * e,
                3.5 - 0.01 * e,
                1.8 - 0.001 * e,
                0.01,
                120.0 * (e + 1.0),
            ));
        }
        csv
    }

    #[test]
    fn test_parse_padded_headers() {
        let run = TrainingRun::from_reader(synthetic_csv(3).as_bytes()).unwrap();
        assert_eq!(run.epochs.len(), 3);
        assert_abs_diff_eq!(run.first().train_loss(), 6.5, epsilon = 1e-9);
        assert_eq!(run.last().time, Some(360.0));
    }

    #[test]
    fn test_empty_results_rejected() {
        let err = TrainingRun::from_reader(format!("{HEADER}\n").as_bytes()).unwrap_err();
        assert!(matches!(err, DatasetError::StatsError(_)));
    }

    #[test]
    fn test_summary_of_improving_run() {
        let run = TrainingRun::from_reader(synthetic_csv(60).as_bytes()).unwrap();
        let s = run.summary();

        assert_eq!(s.epochs, 60);
        assert_abs_diff_eq!(s.total_hours.unwrap(), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(s.minutes_per_epoch.unwrap(), 2.0, epsilon = 1e-9);
        assert_eq!(s.best_map50.0, 60);
        assert_eq!(
            s.milestones.iter().map(|(m, _)| *m).collect::<Vec<_>>(),
            vec![10, 25, 50]
        );
        assert_eq!(
            s.first_above,
            vec![(0.01, Some(2)), (0.1, Some(20)), (0.2, Some(40))]
        );
        assert_eq!(s.top[0].0, 60);
        assert_eq!(s.top.len(), 5);
        assert_abs_diff_eq!(s.train_trend, -0.035, epsilon = 1e-9);
        assert_abs_diff_eq!(s.val_trend, -0.021, epsilon = 1e-9);
        assert_eq!(s.verdict, LossVerdict::BothImproving);
        assert_abs_diff_eq!(s.improvement_factor().unwrap(), 0.301 / 0.006, epsilon = 1e-6);

        let report = s.to_string();
        assert!(report.contains("Epochs: 60"));
        assert!(report.contains("Epoch  50:"));
    }

    #[test]
    fn test_stability_bands() {
        assert_eq!(Stability::from_std(0.005), Stability::High);
        assert_eq!(Stability::from_std(0.015), Stability::Medium);
        assert_eq!(Stability::from_std(0.05), Stability::Low);

        let (mean, std) = mean_std(&[0.2, 0.2, 0.2]);
        assert_abs_diff_eq!(mean, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(std, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_verdicts() {
        assert_eq!(
            LossVerdict::from_trends(-0.1, 0.05),
            LossVerdict::PossibleOverfitting
        );
        assert_eq!(LossVerdict::from_trends(0.0, -0.1), LossVerdict::Stable);
        assert_abs_diff_eq!(linear_slope(&[1.0, 3.0, 5.0, 7.0]), 2.0, epsilon = 1e-12);
        assert_eq!(linear_slope(&[4.0]), 0.0);
    }

    #[test]
    fn test_comparison() {
        let baseline = Metrics {
            map50: 0.27256,
            precision: 0.44399,
            recall: 0.29412,
        };
        let candidate = Metrics {
            map50: 0.3,
            precision: 0.4,
            recall: 0.29412,
        };
        let cmp = RunComparison::new(baseline, candidate);
        let (map, precision, recall) = cmp.changes();
        assert!(map.unwrap() > 0.0);
        assert!(precision.unwrap() < 0.0);
        assert_abs_diff_eq!(recall.unwrap(), 0.0, epsilon = 1e-12);
        assert!(cmp.map_improved());
        assert!(cmp.to_string().contains("Candidate improves mAP50"));
    }
}
