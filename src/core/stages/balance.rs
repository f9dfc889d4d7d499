use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, info_span, warn};

use super::{class_rng, in_worker_pool};
use crate::config::PipelineConfig;
use crate::core::augment::AugmentationEngine;
use crate::core::dataset::{load_classes, ClassDirectory};
use crate::core::manifest::{timestamp, BalanceClassStats, BalanceManifest, BALANCE_MANIFEST};
use crate::core::operations::{
    copy_atomic, encode_image, prepare_output_dir, read_file, write_atomic, write_manifest,
};
use crate::error::{CurationError, Result};

const STAGE: &str = "balance";

/// Number of samples every class should end up with.
///
/// The largest observed class size, raised to `min` and capped at `max`.
/// The cap only lowers the target; classes above it are never trimmed.
pub fn compute_target<I>(counts: I, min: usize, max: usize) -> usize
where
    I: IntoIterator<Item = usize>,
{
    let observed_max = counts.into_iter().max().unwrap_or(0);
    observed_max.max(min).min(max)
}

/// Produce one synthesized sample from `source` using its own seed.
fn synthesize(
    source: &Path,
    engine: &AugmentationEngine,
    seed: u64,
    config: &PipelineConfig,
) -> std::result::Result<Vec<u8>, String> {
    let bytes = read_file(source, config.io_retries).map_err(|e| e.to_string())?;
    let img = image::load_from_memory(&bytes).map_err(|e| {
        CurationError::Decode {
            path: source.to_path_buf(),
            source: e,
        }
        .to_string()
    })?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let outcome = engine.apply_with_outcome(&img, &mut rng);
    if let Some(failure) = outcome.failures.first() {
        return Err(failure.to_string());
    }

    encode_image(&outcome.image, config.output_format, config.output_quality).map_err(|e| e.to_string())
}

fn balance_class(
    class: &ClassDirectory,
    output: &Path,
    target: usize,
    engine: &AugmentationEngine,
    config: &PipelineConfig,
) -> Result<BalanceClassStats> {
    let _span = info_span!("class", label = %class.label).entered();

    let class_out = output.join(&class.label);
    prepare_output_dir(&class_out, &config.accepted_extensions())?;

    // Originals keep their own encoding
    let copied = class
        .samples
        .par_iter()
        .enumerate()
        .map(|(idx, sample)| {
            let ext = sample
                .path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_else(|| config.output_format.extension().to_string());
            let dest = class_out.join(format!("{}_orig_{:04}.{}", class.label, idx, ext));
            match copy_atomic(&sample.path, &dest, config.io_retries) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to copy original: {}", e);
                    false
                }
            }
        })
        .filter(|ok| *ok)
        .count();

    let mut stats = BalanceClassStats {
        original: copied,
        ..Default::default()
    };

    let needed = target.saturating_sub(class.len());
    if needed == 0 {
        stats.final_count = stats.original;
        stats.shortfall = target.saturating_sub(stats.final_count);
        info!("Class {}: {} samples, no synthesis needed", class.label, class.len());
        return Ok(stats);
    }

    if class.is_empty() {
        warn!("Class {} has no valid samples to synthesize from", class.label);
        stats.shortfall = target;
        stats.final_count = stats.original;
        return Ok(stats);
    }

    let ext = config.output_format.extension();
    let mut rng = class_rng(config.seed, STAGE, &class.label);

    // The budget only limits failures; successes never count against it
    'synthesis: while stats.synthesized < needed {
        // Draws happen here, in order, so worker scheduling can't change them
        let batch = (needed - stats.synthesized).min(config.batch_size);
        let plan: Vec<(usize, u64)> = (0..batch)
            .map(|_| (rng.gen_range(0..class.len()), rng.gen()))
            .collect();

        let results: Vec<_> = plan
            .par_iter()
            .map(|&(idx, seed)| (idx, synthesize(&class.samples[idx].path, engine, seed, config)))
            .collect();

        for (idx, result) in results {
            let written = result.and_then(|encoded| {
                let name = format!("{}_aug_{:04}.{}", class.label, stats.synthesized, ext);
                write_atomic(&class_out.join(name), &encoded, config.io_retries).map_err(|e| e.to_string())
            });

            match written {
                Ok(()) => stats.synthesized += 1,
                Err(e) => {
                    stats.failed_attempts += 1;
                    debug!(
                        "Synthesis from {} failed: {}",
                        class.samples[idx].file_name(),
                        e
                    );
                    if stats.failed_attempts >= config.synthesis_retry_budget {
                        break 'synthesis;
                    }
                }
            }
        }
    }

    stats.final_count = stats.original + stats.synthesized;
    // Failed copies of originals fall short too, not just failed synthesis
    stats.shortfall = target.saturating_sub(stats.final_count);

    if stats.shortfall > 0 {
        warn!(
            "Class {}: {} samples short of target {} ({} failed synthesis attempts)",
            class.label, stats.shortfall, target, stats.failed_attempts
        );
    }
    info!(
        "Class {}: {} original + {} synthesized = {}",
        class.label, stats.original, stats.synthesized, stats.final_count
    );

    Ok(stats)
}

/// Top every class under `input` up to the common target with augmented
/// copies of its own samples.
///
/// Originals are copied through as `<class>_orig_NNNN`, synthesized samples
/// are written as `<class>_aug_NNNN`. Classes already at or above the target
/// are copied unchanged.
pub fn balance_dataset(config: &PipelineConfig, input: &Path, output: &Path) -> Result<BalanceManifest> {
    config.validate()?;
    let _span = info_span!("balance").entered();

    let classes = load_classes(input, &config.accepted_extensions())?;
    fs::create_dir_all(output).map_err(|e| CurationError::io(output, e))?;

    let target = compute_target(
        classes.iter().map(|c| c.len()),
        config.min_samples_per_class,
        config.max_samples_per_class,
    );
    info!(
        "Balancing {} classes to {} samples each (min {}, max {})",
        classes.len(),
        target,
        config.min_samples_per_class,
        config.max_samples_per_class
    );

    let engine = AugmentationEngine::new(config.recipe());

    let per_class = in_worker_pool(config.workers, || {
        classes
            .iter()
            .map(|class| {
                let stats = balance_class(class, output, target, &engine, config)?;
                Ok((class.label.clone(), stats))
            })
            .collect::<Result<BTreeMap<_, _>>>()
    })?;

    let manifest = BalanceManifest {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        created_at: timestamp(),
        target,
        min_samples_per_class: config.min_samples_per_class,
        max_samples_per_class: config.max_samples_per_class,
        seed: config.seed,
        classes: per_class,
    };

    write_manifest(&output.join(BALANCE_MANIFEST), &manifest)?;
    info!(
        "Balancing complete: {} samples in total",
        manifest.classes.values().map(|c| c.final_count).sum::<usize>()
    );

    Ok(manifest)
}
