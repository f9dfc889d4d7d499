//! JSON manifests written next to each stage's output.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::core::dataset::{ClassStatistics, GlobalTotals};
use crate::core::quality::RejectReason;
use crate::error::{CurationError, Result};

pub const CLEAN_MANIFEST: &str = "dataset_stats.json";
pub const BALANCE_MANIFEST: &str = "balance_stats.json";
pub const SPLIT_MANIFEST: &str = "split_stats.json";
pub const REPORT_MANIFEST: &str = "dataset_report.json";

/// A raw file the clean stage turned away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedSample {
    pub file: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanClassStats {
    pub total_images: usize,
    pub valid_images: usize,
    pub invalid_images: usize,
    /// Rejections keyed by reason
    pub rejections: BTreeMap<String, usize>,
    pub rejected: Vec<RejectedSample>,
}

impl CleanClassStats {
    pub fn record_rejection(&mut self, file: String, reason: RejectReason) {
        self.invalid_images += 1;
        *self.rejections.entry(reason.as_str().to_string()).or_insert(0) += 1;
        self.rejected.push(RejectedSample { file, reason });
    }
}

/// `dataset_stats.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanManifest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub created_at: String,
    pub valid_images: usize,
    pub invalid_images: usize,
    pub total_images: usize,
    pub classes: BTreeMap<String, CleanClassStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceClassStats {
    /// Valid originals copied through unchanged
    pub original: usize,
    pub synthesized: usize,
    pub final_count: usize,
    pub failed_attempts: usize,
    /// How far the class stayed below the target
    pub shortfall: usize,
}

/// `balance_stats.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceManifest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub created_at: String,
    pub target: usize,
    pub min_samples_per_class: usize,
    pub max_samples_per_class: usize,
    pub seed: u64,
    pub classes: BTreeMap<String, BalanceClassStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitClassStats {
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub total: usize,
    /// Samples assigned to a split whose copy failed
    #[serde(default)]
    pub failed_copies: usize,
}

/// `split_stats.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub created_at: String,
    pub validation_split: f64,
    pub test_split: f64,
    pub seed: u64,
    pub classes: BTreeMap<String, SplitClassStats>,
}

/// `dataset_report.json`, the terminal artifact of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub dataset_path: PathBuf,
    pub created_at: String,
    pub classes: BTreeMap<String, ClassStatistics>,
    /// Up to five file names per class
    pub samples: BTreeMap<String, Vec<String>>,
    pub totals: GlobalTotals,
    /// File count per lowercase extension
    pub format_distribution: BTreeMap<String, usize>,
    /// File count per `WIDTHxHEIGHT`
    pub size_distribution: BTreeMap<String, usize>,
    pub violations: Vec<String>,
    pub config: PipelineConfig,
}

/// Current local time as RFC 3339
pub fn timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Load a manifest if the file exists.
pub fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CurationError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rejection_groups_by_reason() {
        let mut stats = CleanClassStats::default();
        stats.record_rejection("a.jpg".to_string(), RejectReason::TooBlurry);
        stats.record_rejection("b.jpg".to_string(), RejectReason::TooBlurry);
        stats.record_rejection("c.jpg".to_string(), RejectReason::Undecodable);

        assert_eq!(stats.invalid_images, 3);
        assert_eq!(stats.rejections["too_blurry"], 2);
        assert_eq!(stats.rejections["undecodable"], 1);
        assert_eq!(stats.rejected[2].reason, RejectReason::Undecodable);
    }

    #[test]
    fn test_missing_manifest_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<SplitManifest> = read_manifest(&dir.path().join(SPLIT_MANIFEST)).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_rejection_reason_serializes_snake_case() {
        let sample = RejectedSample {
            file: "x.png".to_string(),
            reason: RejectReason::TooSmall,
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"too_small\""));
    }
}
