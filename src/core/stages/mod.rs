//! The four curation stages and the end-to-end run.
//!
//! Each stage reads the previous stage's output directory and writes a new
//! one plus its manifest. Nothing is carried in memory between stages.

mod balance;
mod clean;
mod report;
mod split;

pub use balance::{balance_dataset, compute_target};
pub use clean::clean_dataset;
pub use report::generate_report;
pub use split::{split_counts, split_dataset, split_samples, SplitAssignment};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

use crate::config::PipelineConfig;
use crate::core::manifest::{BalanceManifest, CleanManifest, DatasetReport, SplitManifest};
use crate::error::{CurationError, Result};

pub const CLEANED_DIR: &str = "cleaned_dataset";
pub const BALANCED_DIR: &str = "balanced_dataset";
pub const DATASET_DIR: &str = "dataset";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Derive the seed for one class in one stage from the master seed.
///
/// Stable across platforms and releases (FNV-1a, not `DefaultHasher`), so a
/// class's random stream never depends on which other classes exist or on
/// processing order.
pub fn derive_seed(master: u64, stage: &str, label: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in master
        .to_le_bytes()
        .iter()
        .chain(stage.as_bytes())
        .chain(b"/")
        .chain(label.as_bytes())
    {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

pub(crate) fn class_rng(master: u64, stage: &str, label: &str) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_seed(master, stage, label))
}

/// Run `op` on a rayon pool sized by `workers` (0 = rayon's default).
pub(crate) fn in_worker_pool<T, F>(workers: usize, op: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| CurationError::Config(format!("failed to start worker pool: {}", e)))?;
    pool.install(op)
}

/// Everything a full run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub clean: CleanManifest,
    pub balance: BalanceManifest,
    pub split: SplitManifest,
    pub report: DatasetReport,
    pub dataset_dir: PathBuf,
}

/// Clean, balance, split and report `input` into `work_dir`.
///
/// Configuration is validated before any stage touches the filesystem.
pub fn run_pipeline(config: &PipelineConfig, input: &Path, work_dir: &Path) -> Result<PipelineRun> {
    config.validate()?;

    let _span = info_span!("pipeline").entered();
    info!("Curating {:?} into {:?}", input, work_dir);

    let cleaned_dir = work_dir.join(CLEANED_DIR);
    let balanced_dir = work_dir.join(BALANCED_DIR);
    let dataset_dir = work_dir.join(DATASET_DIR);

    let clean = clean_dataset(config, input, &cleaned_dir)?;
    let balance = balance_dataset(config, &cleaned_dir, &balanced_dir)?;
    let split = split_dataset(config, &balanced_dir, &dataset_dir)?;
    let report = generate_report(config, &dataset_dir, Some(&cleaned_dir), Some(&balanced_dir))?;

    info!(
        "Pipeline complete: {} classes, {} images ({} train / {} val / {} test)",
        report.totals.classes,
        report.totals.final_images,
        report.totals.train,
        report.totals.val,
        report.totals.test
    );

    Ok(PipelineRun {
        clean,
        balance,
        split,
        report,
        dataset_dir,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::fs;
    use std::path::Path;

    /// A sharp, high-contrast image that passes the default gate
    pub fn checkerboard(w: u32, h: u32, shade: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgb([255, shade, 0])
            } else {
                Rgb([0, 255 - shade, 255])
            }
        }))
    }

    /// Write `count` distinct PNG images into `root/label`.
    pub fn write_class(root: &Path, label: &str, count: usize, w: u32, h: u32) {
        let dir = root.join(label);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            checkerboard(w, h, (i * 37 % 256) as u8)
                .save_with_format(dir.join(format!("img_{:03}.png", i)), ImageFormat::Png)
                .unwrap();
        }
    }

    pub fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().is_file())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .filter(|n| !n.ends_with(".json"))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
