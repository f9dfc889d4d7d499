use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, info_span, warn};

use crate::config::PipelineConfig;
use crate::core::dataset::{list_class_labels, list_images, ClassStatistics, DatasetSplit, GlobalTotals};
use crate::core::manifest::{
    read_manifest, timestamp, BalanceManifest, CleanManifest, DatasetReport, BALANCE_MANIFEST,
    CLEAN_MANIFEST, REPORT_MANIFEST,
};
use crate::core::operations::write_manifest;
use crate::error::Result;

const SAMPLES_PER_CLASS: usize = 5;

/// Class labels present under any split directory. A missing split
/// directory simply contributes nothing.
fn split_labels(dataset_dir: &Path) -> BTreeSet<String> {
    DatasetSplit::all()
        .iter()
        .filter_map(|split| {
            let dir = dataset_dir.join(split.as_str());
            dir.is_dir().then(|| list_class_labels(&dir).ok()).flatten()
        })
        .flatten()
        .collect()
}

/// Aggregate the manifests of earlier stages and the split layout on disk
/// into `dataset_report.json` under `dataset_dir`.
///
/// Split counts come from the files actually present. Earlier manifests are
/// optional; without them the corresponding counts fall back to what the
/// split directories show.
pub fn generate_report(
    config: &PipelineConfig,
    dataset_dir: &Path,
    cleaned_dir: Option<&Path>,
    balanced_dir: Option<&Path>,
) -> Result<DatasetReport> {
    let _span = info_span!("report").entered();

    let clean: Option<CleanManifest> = match cleaned_dir {
        Some(dir) => read_manifest(&dir.join(CLEAN_MANIFEST))?,
        None => None,
    };
    let balance: Option<BalanceManifest> = match balanced_dir {
        Some(dir) => read_manifest(&dir.join(BALANCE_MANIFEST))?,
        None => None,
    };

    let mut labels = split_labels(dataset_dir);
    if let Some(clean) = &clean {
        labels.extend(clean.classes.keys().cloned());
    }
    if let Some(balance) = &balance {
        labels.extend(balance.classes.keys().cloned());
    }

    let extensions = config.accepted_extensions();
    let mut classes = BTreeMap::new();
    let mut samples = BTreeMap::new();
    let mut format_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut size_distribution: BTreeMap<String, usize> = BTreeMap::new();

    for label in &labels {
        let mut stats = ClassStatistics::new();
        let mut names = Vec::new();

        for split in DatasetSplit::all() {
            let files = list_images(&dataset_dir.join(split.as_str()).join(label), &extensions);
            match split {
                DatasetSplit::Train => stats.train = files.len(),
                DatasetSplit::Val => stats.val = files.len(),
                DatasetSplit::Test => stats.test = files.len(),
            }

            for file in &files {
                let ext = file
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                *format_distribution.entry(ext).or_insert(0) += 1;

                let size = match image::image_dimensions(file) {
                    Ok((w, h)) => format!("{}x{}", w, h),
                    Err(e) => {
                        debug!("Could not read dimensions of {:?}: {}", file, e);
                        "unreadable".to_string()
                    }
                };
                *size_distribution.entry(size).or_insert(0) += 1;

                if names.len() < SAMPLES_PER_CLASS {
                    if let Some(name) = file.file_name() {
                        names.push(name.to_string_lossy().to_string());
                    }
                }
            }
        }

        let cleaned = clean.as_ref().and_then(|m| m.classes.get(label));
        let balanced = balance.as_ref().and_then(|m| m.classes.get(label));

        stats.raw_count = cleaned.map_or(0, |c| c.total_images);
        stats.invalid_count = cleaned.map_or(0, |c| c.invalid_images);
        match (balanced, cleaned) {
            (Some(b), _) => {
                stats.valid_count = b.original;
                stats.synthesized_count = b.synthesized;
                stats.final_count = b.final_count;
                stats.shortfall = b.shortfall;
            }
            (None, Some(c)) => {
                stats.valid_count = c.valid_images;
                stats.final_count = c.valid_images;
            }
            (None, None) => {
                stats.valid_count = stats.split_total();
                stats.final_count = stats.split_total();
            }
        }

        classes.insert(label.clone(), stats);
        samples.insert(label.clone(), names);
    }

    let violations: Vec<String> = classes
        .iter()
        .flat_map(|(label, stats)| stats.violations(label))
        .collect();
    for violation in &violations {
        warn!("Invariant violated: {}", violation);
    }

    let totals: GlobalTotals = classes.values().collect();

    let report = DatasetReport {
        dataset_path: dataset_dir.to_path_buf(),
        created_at: timestamp(),
        classes,
        samples,
        totals,
        format_distribution,
        size_distribution,
        violations,
        config: config.clone(),
    };

    write_manifest(&dataset_dir.join(REPORT_MANIFEST), &report)?;
    info!(
        "Report written: {} classes, {} images, {} violations",
        report.totals.classes,
        report.totals.final_images,
        report.violations.len()
    );

    Ok(report)
}
