use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

use super::{class_rng, in_worker_pool};
use crate::config::PipelineConfig;
use crate::core::dataset::{load_classes, ClassDirectory, DatasetSplit};
use crate::core::manifest::{timestamp, SplitClassStats, SplitManifest, SPLIT_MANIFEST};
use crate::core::operations::{copy_atomic, prepare_output_dir, write_manifest};
use crate::error::{CurationError, Result};

const STAGE: &str = "split";

/// Slack so that fractions like `0.2 + 0.1` do not round up a whole sample
const ROUNDING_EPSILON: f64 = 1e-9;

fn ceil_count(value: f64) -> usize {
    (value - ROUNDING_EPSILON).ceil().max(0.0) as usize
}

/// `(train, val, test)` sizes for a class of `n` samples.
///
/// Holdout sizes round up: the pool is `ceil(n * (val + test))`, of which
/// `ceil(holdout * test / (val + test))` goes to test and the rest to val.
/// Unless the fractions cover the whole class, train keeps at least one
/// sample.
pub fn split_counts(n: usize, val_fraction: f64, test_fraction: f64) -> (usize, usize, usize) {
    let holdout_fraction = val_fraction + test_fraction;
    if n == 0 || holdout_fraction <= 0.0 {
        return (n, 0, 0);
    }

    let mut holdout = ceil_count(n as f64 * holdout_fraction).min(n);
    if holdout == n && holdout_fraction < 1.0 - ROUNDING_EPSILON {
        holdout = n - 1;
    }
    let test = ceil_count(holdout as f64 * test_fraction / holdout_fraction).min(holdout);
    let val = holdout - test;

    (n - holdout, val, test)
}

/// One class's samples divided over the three splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAssignment<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
    pub test: Vec<T>,
}

impl<T> SplitAssignment<T> {
    pub fn get(&self, split: DatasetSplit) -> &[T] {
        match split {
            DatasetSplit::Train => &self.train,
            DatasetSplit::Val => &self.val,
            DatasetSplit::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Two-stage shuffle split: holdout vs train, then holdout into val and
/// test. Every item lands in exactly one split.
pub fn split_samples<T, R>(
    items: &[T],
    val_fraction: f64,
    test_fraction: f64,
    rng: &mut R,
) -> SplitAssignment<T>
where
    T: Clone,
    R: Rng + ?Sized,
{
    let (train_count, _, test_count) = split_counts(items.len(), val_fraction, test_fraction);

    let mut shuffled = items.to_vec();
    shuffled.shuffle(rng);
    let mut holdout = shuffled.split_off(train_count);
    let train = shuffled;

    holdout.shuffle(rng);
    let val = holdout.split_off(test_count);
    let test = holdout;

    SplitAssignment { train, val, test }
}

fn split_class(
    class: &ClassDirectory,
    output: &Path,
    config: &PipelineConfig,
) -> Result<SplitClassStats> {
    let _span = info_span!("class", label = %class.label).entered();

    let extensions = config.accepted_extensions();
    let paths: Vec<PathBuf> = class.samples.iter().map(|s| s.path.clone()).collect();

    let mut rng = class_rng(config.seed, STAGE, &class.label);
    let assignment = split_samples(&paths, config.validation_split, config.test_split, &mut rng);

    let mut stats = SplitClassStats::default();
    for split in DatasetSplit::all() {
        let dest_dir = output.join(split.as_str()).join(&class.label);
        prepare_output_dir(&dest_dir, &extensions)?;

        let copied = assignment
            .get(split)
            .par_iter()
            .filter(|src| {
                let Some(name) = src.file_name() else {
                    return false;
                };
                match copy_atomic(src, &dest_dir.join(name), config.io_retries) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to copy into {}: {}", split.as_str(), e);
                        false
                    }
                }
            })
            .count();

        stats.failed_copies += assignment.get(split).len() - copied;
        match split {
            DatasetSplit::Train => stats.train = copied,
            DatasetSplit::Val => stats.val = copied,
            DatasetSplit::Test => stats.test = copied,
        }
    }
    stats.total = stats.train + stats.val + stats.test;

    info!(
        "Class {}: {} train / {} val / {} test",
        class.label, stats.train, stats.val, stats.test
    );
    Ok(stats)
}

/// Split every class under `input` into `output/{train,val,test}/<class>`.
///
/// File names are kept, so a sample's split can be read off its path.
pub fn split_dataset(config: &PipelineConfig, input: &Path, output: &Path) -> Result<SplitManifest> {
    config.validate()?;
    let _span = info_span!("split").entered();

    let classes = load_classes(input, &config.accepted_extensions())?;
    fs::create_dir_all(output).map_err(|e| CurationError::io(output, e))?;

    info!(
        "Splitting {} classes (val {}, test {}, seed {})",
        classes.len(),
        config.validation_split,
        config.test_split,
        config.seed
    );

    let per_class = in_worker_pool(config.workers, || {
        classes
            .iter()
            .map(|class| Ok((class.label.clone(), split_class(class, output, config)?)))
            .collect::<Result<BTreeMap<_, _>>>()
    })?;

    let manifest = SplitManifest {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        created_at: timestamp(),
        validation_split: config.validation_split,
        test_split: config.test_split,
        seed: config.seed,
        classes: per_class,
    };

    write_manifest(&output.join(SPLIT_MANIFEST), &manifest)?;
    info!("Split complete");

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::operations::OutputFormat;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn test_hundred_samples_split_exactly() {
        assert_eq!(split_counts(100, 0.2, 0.1), (70, 20, 10));
    }

    #[test]
    fn test_small_class_counts() {
        assert_eq!(split_counts(0, 0.2, 0.1), (0, 0, 0));
        assert_eq!(split_counts(1, 0.2, 0.1), (1, 0, 0));
        assert_eq!(split_counts(2, 0.2, 0.1), (1, 0, 1));
        assert_eq!(split_counts(7, 0.2, 0.1), (4, 2, 1));
        assert_eq!(split_counts(10, 0.2, 0.1), (7, 2, 1));
        assert_eq!(split_counts(10, 0.0, 0.0), (10, 0, 0));
        assert_eq!(split_counts(10, 0.5, 0.5), (0, 5, 5));
        assert_eq!(split_counts(10, 0.3, 0.0), (7, 3, 0));
    }

    #[test]
    fn test_partition_is_exact_and_disjoint() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for n in [0usize, 1, 2, 3, 9, 37, 100, 251] {
            let items: Vec<usize> = (0..n).collect();
            let split = split_samples(&items, 0.2, 0.1, &mut rng);

            assert_eq!(split.len(), n);
            let mut seen = HashSet::new();
            for item in split.train.iter().chain(&split.val).chain(&split.test) {
                assert!(seen.insert(*item), "{} assigned twice", item);
            }
            assert_eq!(seen.len(), n);
        }
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let items: Vec<u32> = (0..50).collect();
        let a = split_samples(&items, 0.2, 0.1, &mut ChaCha8Rng::seed_from_u64(7));
        let b = split_samples(&items, 0.2, 0.1, &mut ChaCha8Rng::seed_from_u64(7));
        let c = split_samples(&items, 0.2, 0.1, &mut ChaCha8Rng::seed_from_u64(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_dataset_copies_into_layout() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_class(input.path(), "rust", 100, 8, 8);
        write_class(input.path(), "empty", 0, 8, 8);

        let config = PipelineConfig {
            output_format: OutputFormat::Png,
            ..PipelineConfig::default()
        };
        let manifest = split_dataset(&config, input.path(), output.path()).unwrap();

        let rust = &manifest.classes["rust"];
        assert_eq!((rust.train, rust.val, rust.test, rust.total), (70, 20, 10, 100));
        assert_eq!(manifest.classes["empty"].total, 0);

        let mut all = Vec::new();
        for split in DatasetSplit::all() {
            all.extend(file_names(&output.path().join(split.as_str()).join("rust")));
        }
        all.sort();
        assert_eq!(all, file_names(&input.path().join("rust")));
        assert!(output.path().join(SPLIT_MANIFEST).is_file());
    }
}
