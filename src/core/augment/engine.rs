use image::{DynamicImage, RgbImage};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use super::recipe::{AugmentationRecipe, Selection, Transform, TransformStage};
use super::sampling::chance;
use super::{color, degrade, geometric};

/// A single transform could not be applied to an image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("invalid parameter for {transform}: {message}")]
    InvalidParameter {
        transform: &'static str,
        message: String,
    },

    #[error("{transform} needs at least {min_width}x{min_height} pixels, image is {width}x{height}")]
    ImageTooSmall {
        transform: &'static str,
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },

    #[error("{0} cannot run on an empty image")]
    EmptyImage(&'static str),

    #[error("{transform} changed resolution from {from:?} to {to:?}")]
    ResolutionChanged {
        transform: &'static str,
        from: (u32, u32),
        to: (u32, u32),
    },
}

/// What a single call to the engine did.
#[derive(Debug, Clone)]
pub struct AugmentOutcome {
    pub image: DynamicImage,
    /// Transforms that ran, in order
    pub applied: Vec<&'static str>,
    /// Transforms that failed and were skipped
    pub failures: Vec<TransformError>,
}

/// Apply a single transform, drawing whatever randomness it needs.
pub fn apply_transform<R: Rng + ?Sized>(
    transform: &Transform,
    img: &RgbImage,
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(TransformError::EmptyImage(transform.name()));
    }

    let out = match *transform {
        Transform::RandomResizedCrop {
            width,
            height,
            scale,
            ratio,
        } => geometric::random_resized_crop(img, width, height, scale, ratio, rng)?,
        Transform::HorizontalFlip => geometric::horizontal_flip(img),
        Transform::VerticalFlip => geometric::vertical_flip(img),
        Transform::RandomRotate90 => geometric::random_rotate90(img, rng),
        Transform::Rotate { limit } => geometric::rotate(img, limit, rng),
        Transform::ShiftScaleRotate {
            shift_limit,
            scale_limit,
            rotate_limit,
        } => geometric::shift_scale_rotate(img, shift_limit, scale_limit, rotate_limit, rng),
        Transform::BrightnessContrast {
            brightness_limit,
            contrast_limit,
        } => color::brightness_contrast(img, brightness_limit, contrast_limit, rng),
        Transform::HueSaturationValue {
            hue_shift_limit,
            sat_shift_limit,
            val_shift_limit,
        } => color::hue_saturation_value(img, hue_shift_limit, sat_shift_limit, val_shift_limit, rng),
        Transform::Clahe {
            clip_limit,
            tile_grid,
        } => color::clahe(img, clip_limit, tile_grid)?,
        Transform::GaussianBlur { blur_limit } => degrade::gaussian_blur(img, blur_limit, rng)?,
        Transform::MotionBlur { blur_limit } => degrade::motion_blur(img, blur_limit, rng)?,
        Transform::MedianBlur { blur_limit } => degrade::median_blur(img, blur_limit, rng)?,
        Transform::GaussNoise { var_limit } => degrade::gauss_noise(img, var_limit, rng),
        Transform::IsoNoise {
            color_shift,
            intensity,
        } => degrade::iso_noise(img, color_shift, intensity, rng),
        Transform::CoarseDropout {
            max_holes,
            max_height,
            max_width,
        } => degrade::coarse_dropout(img, max_holes, max_height, max_width, rng)?,
        Transform::Cutout {
            num_holes,
            max_h_size,
            max_w_size,
        } => degrade::cutout(img, num_holes, max_h_size, max_w_size, rng)?,
        Transform::GridDistortion {
            num_steps,
            distort_limit,
        } => degrade::grid_distortion(img, num_steps, distort_limit, rng)?,
        Transform::ElasticTransform { alpha, sigma } => {
            degrade::elastic_transform(img, alpha, sigma, rng)?
        }
        Transform::OpticalDistortion {
            distort_limit,
            shift_limit,
        } => degrade::optical_distortion(img, distort_limit, shift_limit, rng),
    };

    if !transform.changes_resolution() && out.dimensions() != img.dimensions() {
        return Err(TransformError::ResolutionChanged {
            transform: transform.name(),
            from: img.dimensions(),
            to: out.dimensions(),
        });
    }

    Ok(out)
}

/// Decide which transform (if any) a stage contributes for this image.
fn select<'a, R: Rng + ?Sized>(stage: &'a TransformStage, rng: &mut R) -> Option<&'a Transform> {
    match stage {
        TransformStage::Single {
            transform,
            probability,
        } => chance(rng, *probability).then_some(transform),
        TransformStage::OneOf {
            probability,
            selection,
            alternatives,
        } => {
            if alternatives.is_empty() || !chance(rng, *probability) {
                return None;
            }
            let idx = match selection {
                Selection::Uniform => rng.gen_range(0..alternatives.len()),
                Selection::Weighted => {
                    match WeightedIndex::new(alternatives.iter().map(|a| a.weight.max(0.0))) {
                        Ok(dist) => dist.sample(rng),
                        Err(_) => rng.gen_range(0..alternatives.len()),
                    }
                }
            };
            let chosen = &alternatives[idx];
            chance(rng, chosen.probability).then_some(&chosen.transform)
        }
    }
}

/// Runs an [`AugmentationRecipe`] over images with a caller-supplied random
/// source.
#[derive(Debug, Clone)]
pub struct AugmentationEngine {
    recipe: AugmentationRecipe,
}

impl AugmentationEngine {
    pub fn new(recipe: AugmentationRecipe) -> Self {
        Self { recipe }
    }

    pub fn recipe(&self) -> &AugmentationRecipe {
        &self.recipe
    }

    /// Produce a transformed variant of `image`.
    pub fn apply<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> DynamicImage {
        self.apply_with_outcome(image, rng).image
    }

    /// Like [`apply`](Self::apply) but also reports which transforms ran and
    /// which failed.
    ///
    /// A failing transform is logged and skipped: the image from before that
    /// stage carries on to the next stage.
    pub fn apply_with_outcome<R: Rng + ?Sized>(
        &self,
        image: &DynamicImage,
        rng: &mut R,
    ) -> AugmentOutcome {
        let mut current = image.to_rgb8();
        let mut applied = Vec::new();
        let mut failures = Vec::new();

        for stage in &self.recipe.stages {
            let Some(transform) = select(stage, rng) else {
                continue;
            };

            match apply_transform(transform, &current, rng) {
                Ok(next) => {
                    current = next;
                    applied.push(transform.name());
                }
                Err(e) => {
                    warn!("Transform {} failed, keeping previous image: {}", transform.name(), e);
                    failures.push(e);
                }
            }
        }

        debug!("Applied transforms: {:?}", applied);

        AugmentOutcome {
            image: DynamicImage::ImageRgb8(current),
            applied,
            failures,
        }
    }
}

/// Apply `recipe` to `image` once.
pub fn apply<R: Rng + ?Sized>(
    recipe: &AugmentationRecipe,
    image: &DynamicImage,
    rng: &mut R,
) -> DynamicImage {
    AugmentationEngine::new(recipe.clone()).apply(image, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::augment::recipe::Alternative;
    use image::Rgb;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn textured(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_standard_recipe_output_has_target_size() {
        let engine = AugmentationEngine::new(AugmentationRecipe::standard(64, 48));
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let img = textured(120, 100);
        for _ in 0..5 {
            let out = engine.apply(&img, &mut rng);
            assert_eq!((out.width(), out.height()), (64, 48));
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let engine = AugmentationEngine::new(AugmentationRecipe::standard(32, 32));
        let img = textured(80, 80);
        let a = engine.apply(&img, &mut ChaCha8Rng::seed_from_u64(99));
        let b = engine.apply(&img, &mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(a.to_rgb8(), b.to_rgb8());
    }

    #[test]
    fn test_failed_stage_falls_back_and_continues() {
        let recipe = AugmentationRecipe::new(vec![
            TransformStage::single(Transform::HorizontalFlip, 1.0),
            TransformStage::single(
                Transform::Clahe {
                    clip_limit: 2.0,
                    tile_grid: (64, 64),
                },
                1.0,
            ),
            TransformStage::single(Transform::VerticalFlip, 1.0),
        ]);
        let engine = AugmentationEngine::new(recipe);
        let img = textured(16, 16);
        let outcome = engine.apply_with_outcome(&img, &mut ChaCha8Rng::seed_from_u64(1));

        assert_eq!(outcome.applied, vec!["horizontal_flip", "vertical_flip"]);
        assert_eq!(outcome.failures.len(), 1);
        let expected = image::imageops::flip_vertical(&image::imageops::flip_horizontal(
            &img.to_rgb8(),
        ));
        assert_eq!(outcome.image.to_rgb8(), expected);
    }

    #[test]
    fn test_group_applies_at_most_one_alternative() {
        let recipe = AugmentationRecipe::new(vec![TransformStage::one_of(
            1.0,
            vec![Transform::HorizontalFlip, Transform::VerticalFlip],
        )]);
        let engine = AugmentationEngine::new(recipe);
        let img = textured(10, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..50 {
            let outcome = engine.apply_with_outcome(&img, &mut rng);
            assert_eq!(outcome.applied.len(), 1);
        }
    }

    #[test]
    fn test_group_probability_zero_never_fires() {
        let recipe = AugmentationRecipe::new(vec![TransformStage::one_of(
            0.0,
            vec![Transform::HorizontalFlip],
        )]);
        let engine = AugmentationEngine::new(recipe);
        let img = textured(10, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..20 {
            let outcome = engine.apply_with_outcome(&img, &mut rng);
            assert!(outcome.applied.is_empty());
            assert_eq!(outcome.image.to_rgb8(), img.to_rgb8());
        }
    }

    #[test]
    fn test_weighted_selection_skips_zero_weight() {
        let mut never = Alternative::new(Transform::VerticalFlip);
        never.weight = 0.0;
        let recipe = AugmentationRecipe::new(vec![TransformStage::OneOf {
            probability: 1.0,
            selection: Selection::Weighted,
            alternatives: vec![Alternative::new(Transform::HorizontalFlip), never],
        }]);
        let engine = AugmentationEngine::new(recipe);
        let img = textured(10, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        for _ in 0..30 {
            let outcome = engine.apply_with_outcome(&img, &mut rng);
            assert_eq!(outcome.applied, vec!["horizontal_flip"]);
        }
    }

    #[test]
    fn test_free_apply_matches_engine() {
        let recipe = AugmentationRecipe::standard(24, 24);
        let img = textured(50, 40);
        let a = apply(&recipe, &img, &mut ChaCha8Rng::seed_from_u64(3));
        let b = AugmentationEngine::new(recipe).apply(&img, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a.to_rgb8(), b.to_rgb8());
    }
}
