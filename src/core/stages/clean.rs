use image::imageops::FilterType;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, info_span, warn};

use super::in_worker_pool;
use crate::config::PipelineConfig;
use crate::core::dataset::{load_classes, ClassDirectory, Sample};
use crate::core::manifest::{timestamp, CleanClassStats, CleanManifest, CLEAN_MANIFEST};
use crate::core::operations::{encode_image, prepare_output_dir, read_file, write_atomic, write_manifest};
use crate::core::quality::{QualityGate, RejectReason, Verdict};
use crate::error::{CurationError, Result};

/// Read, gate, resize and encode one raw sample.
fn process_sample(
    sample: &Sample,
    gate: &QualityGate,
    config: &PipelineConfig,
) -> std::result::Result<Vec<u8>, RejectReason> {
    let bytes = read_file(&sample.path, config.io_retries).map_err(|e| {
        warn!("{}", e);
        RejectReason::IoError
    })?;

    let img = gate.inspect(&bytes)?;

    let [width, height] = config.target_size;
    let resized = img.resize_exact(width, height, FilterType::Triangle);

    encode_image(&resized, config.output_format, config.output_quality).map_err(|e| {
        warn!("Failed to encode {:?}: {}", sample.path, e);
        RejectReason::IoError
    })
}

fn clean_class(
    class: &ClassDirectory,
    output: &Path,
    gate: &QualityGate,
    config: &PipelineConfig,
) -> Result<CleanClassStats> {
    let _span = info_span!("class", label = %class.label).entered();

    let class_out = output.join(&class.label);
    prepare_output_dir(&class_out, &config.accepted_extensions())?;

    let ext = config.output_format.extension();
    let mut stats = CleanClassStats {
        total_images: class.len(),
        ..Default::default()
    };

    for batch in class.samples.chunks(config.batch_size) {
        let results: Vec<_> = batch
            .par_iter()
            .map(|sample| (sample, process_sample(sample, gate, config)))
            .collect();

        // Names are handed out in input order so reruns produce the same files
        for (sample, result) in results {
            let verdict = match result {
                Ok(encoded) => {
                    let name = format!("{}_{:04}.{}", class.label, stats.valid_images, ext);
                    match write_atomic(&class_out.join(&name), &encoded, config.io_retries) {
                        Ok(()) => {
                            stats.valid_images += 1;
                            Verdict::Accepted
                        }
                        Err(e) => {
                            warn!("{}", e);
                            Verdict::Rejected(RejectReason::IoError)
                        }
                    }
                }
                Err(reason) => Verdict::Rejected(reason),
            };

            if let Verdict::Rejected(reason) = verdict {
                debug!("Rejected {:?}: {}", sample.path, reason);
                stats.record_rejection(sample.file_name(), reason);
            }
        }
    }

    info!(
        "Class {}: {} valid, {} invalid of {}",
        class.label, stats.valid_images, stats.invalid_images, stats.total_images
    );
    Ok(stats)
}

/// Quality-gate every raw image under `input` and write accepted ones,
/// resized and re-encoded, to `output/<class>/<class>_NNNN.<ext>`.
///
/// Rejected samples never abort the stage; they are counted per reason in
/// `dataset_stats.json`.
pub fn clean_dataset(config: &PipelineConfig, input: &Path, output: &Path) -> Result<CleanManifest> {
    config.validate()?;
    let _span = info_span!("clean").entered();

    let classes = load_classes(input, &config.image_formats)?;
    fs::create_dir_all(output).map_err(|e| CurationError::io(output, e))?;

    let gate = config.quality_gate();
    info!(
        "Cleaning {} classes (min resolution {}, sharpness threshold {})",
        classes.len(),
        gate.min_resolution,
        gate.sharpness_threshold
    );

    let per_class = in_worker_pool(config.workers, || {
        classes
            .iter()
            .map(|class| Ok((class.label.clone(), clean_class(class, output, &gate, config)?)))
            .collect::<Result<BTreeMap<_, _>>>()
    })?;

    let manifest = CleanManifest {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        created_at: timestamp(),
        valid_images: per_class.values().map(|s| s.valid_images).sum(),
        invalid_images: per_class.values().map(|s| s.invalid_images).sum(),
        total_images: per_class.values().map(|s| s.total_images).sum(),
        classes: per_class,
    };

    write_manifest(&output.join(CLEAN_MANIFEST), &manifest)?;
    info!(
        "Cleaning complete: {} valid, {} invalid, {} total",
        manifest.valid_images, manifest.invalid_images, manifest.total_images
    );

    Ok(manifest)
}
