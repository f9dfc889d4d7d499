//! Augmentation recipes: ordered, probabilistic transform stages.
//!
//! A recipe is plain configuration. It holds no random state and can be
//! shared by every worker; randomness is supplied per call to the engine.

use serde::{Deserialize, Serialize};

/// Broad family of a transform. Stages of a recipe must run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformCategory {
    Geometric,
    Color,
    Degradation,
}

impl TransformCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformCategory::Geometric => "geometric",
            TransformCategory::Color => "color",
            TransformCategory::Degradation => "degradation",
        }
    }
}

/// A single image transform and its parameters.
///
/// Limits are symmetric unless given as a `(low, high)` range. Hue and
/// value shifts use OpenCV's 8-bit units (hue in half degrees, saturation
/// and value on 0-255).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    // Geometric
    RandomResizedCrop {
        width: u32,
        height: u32,
        scale: (f32, f32),
        ratio: (f32, f32),
    },
    HorizontalFlip,
    VerticalFlip,
    RandomRotate90,
    Rotate {
        limit: f32,
    },
    ShiftScaleRotate {
        shift_limit: f32,
        scale_limit: f32,
        rotate_limit: f32,
    },

    // Color / tonal
    BrightnessContrast {
        brightness_limit: f32,
        contrast_limit: f32,
    },
    HueSaturationValue {
        hue_shift_limit: f32,
        sat_shift_limit: f32,
        val_shift_limit: f32,
    },
    Clahe {
        clip_limit: f32,
        tile_grid: (u32, u32),
    },

    // Degradation
    GaussianBlur {
        blur_limit: (u32, u32),
    },
    MotionBlur {
        blur_limit: u32,
    },
    MedianBlur {
        blur_limit: u32,
    },
    GaussNoise {
        var_limit: (f32, f32),
    },
    IsoNoise {
        color_shift: (f32, f32),
        intensity: (f32, f32),
    },
    CoarseDropout {
        max_holes: u32,
        max_height: u32,
        max_width: u32,
    },
    Cutout {
        num_holes: u32,
        max_h_size: u32,
        max_w_size: u32,
    },
    GridDistortion {
        num_steps: u32,
        distort_limit: f32,
    },
    ElasticTransform {
        alpha: f32,
        sigma: f32,
    },
    OpticalDistortion {
        distort_limit: f32,
        shift_limit: f32,
    },
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::RandomResizedCrop { .. } => "random_resized_crop",
            Transform::HorizontalFlip => "horizontal_flip",
            Transform::VerticalFlip => "vertical_flip",
            Transform::RandomRotate90 => "random_rotate90",
            Transform::Rotate { .. } => "rotate",
            Transform::ShiftScaleRotate { .. } => "shift_scale_rotate",
            Transform::BrightnessContrast { .. } => "brightness_contrast",
            Transform::HueSaturationValue { .. } => "hue_saturation_value",
            Transform::Clahe { .. } => "clahe",
            Transform::GaussianBlur { .. } => "gaussian_blur",
            Transform::MotionBlur { .. } => "motion_blur",
            Transform::MedianBlur { .. } => "median_blur",
            Transform::GaussNoise { .. } => "gauss_noise",
            Transform::IsoNoise { .. } => "iso_noise",
            Transform::CoarseDropout { .. } => "coarse_dropout",
            Transform::Cutout { .. } => "cutout",
            Transform::GridDistortion { .. } => "grid_distortion",
            Transform::ElasticTransform { .. } => "elastic_transform",
            Transform::OpticalDistortion { .. } => "optical_distortion",
        }
    }

    pub fn category(&self) -> TransformCategory {
        match self {
            Transform::RandomResizedCrop { .. }
            | Transform::HorizontalFlip
            | Transform::VerticalFlip
            | Transform::RandomRotate90
            | Transform::Rotate { .. }
            | Transform::ShiftScaleRotate { .. } => TransformCategory::Geometric,
            Transform::BrightnessContrast { .. }
            | Transform::HueSaturationValue { .. }
            | Transform::Clahe { .. } => TransformCategory::Color,
            _ => TransformCategory::Degradation,
        }
    }

    /// Whether the output size may differ from the input size
    pub fn changes_resolution(&self) -> bool {
        matches!(self, Transform::RandomResizedCrop { .. })
    }

    /// Static parameter checks, independent of any particular image.
    pub fn validate(&self) -> Result<(), String> {
        fn range(name: &str, (lo, hi): (f32, f32)) -> Result<(), String> {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(format!("{} range ({}, {}) is invalid", name, lo, hi));
            }
            Ok(())
        }
        fn non_negative(name: &str, v: f32) -> Result<(), String> {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, v));
            }
            Ok(())
        }

        match *self {
            Transform::RandomResizedCrop {
                width,
                height,
                scale,
                ratio,
            } => {
                if width == 0 || height == 0 {
                    return Err("crop output size must be non-zero".to_string());
                }
                range("scale", scale)?;
                range("ratio", ratio)?;
                if scale.0 <= 0.0 || scale.1 > 1.0 {
                    return Err(format!("scale must lie in (0, 1], got {:?}", scale));
                }
                if ratio.0 <= 0.0 {
                    return Err(format!("ratio must be positive, got {:?}", ratio));
                }
            }
            Transform::HorizontalFlip | Transform::VerticalFlip | Transform::RandomRotate90 => {}
            Transform::Rotate { limit } => non_negative("limit", limit)?,
            Transform::ShiftScaleRotate {
                shift_limit,
                scale_limit,
                rotate_limit,
            } => {
                non_negative("shift_limit", shift_limit)?;
                non_negative("rotate_limit", rotate_limit)?;
                if !(0.0..1.0).contains(&scale_limit) {
                    return Err(format!("scale_limit must lie in [0, 1), got {}", scale_limit));
                }
            }
            Transform::BrightnessContrast {
                brightness_limit,
                contrast_limit,
            } => {
                non_negative("brightness_limit", brightness_limit)?;
                non_negative("contrast_limit", contrast_limit)?;
            }
            Transform::HueSaturationValue {
                hue_shift_limit,
                sat_shift_limit,
                val_shift_limit,
            } => {
                non_negative("hue_shift_limit", hue_shift_limit)?;
                non_negative("sat_shift_limit", sat_shift_limit)?;
                non_negative("val_shift_limit", val_shift_limit)?;
            }
            Transform::Clahe {
                clip_limit,
                tile_grid,
            } => {
                non_negative("clip_limit", clip_limit)?;
                if tile_grid.0 == 0 || tile_grid.1 == 0 {
                    return Err("tile_grid must be non-zero".to_string());
                }
            }
            Transform::GaussianBlur { blur_limit } => {
                if blur_limit.0 > blur_limit.1 || blur_limit.1 == 0 {
                    return Err(format!("blur_limit {:?} is invalid", blur_limit));
                }
            }
            Transform::MotionBlur { blur_limit } | Transform::MedianBlur { blur_limit } => {
                if blur_limit < 3 {
                    return Err(format!("blur_limit must be at least 3, got {}", blur_limit));
                }
            }
            Transform::GaussNoise { var_limit } => {
                range("var_limit", var_limit)?;
                non_negative("var_limit", var_limit.0)?;
            }
            Transform::IsoNoise {
                color_shift,
                intensity,
            } => {
                range("color_shift", color_shift)?;
                range("intensity", intensity)?;
                non_negative("color_shift", color_shift.0)?;
                non_negative("intensity", intensity.0)?;
            }
            Transform::CoarseDropout {
                max_holes,
                max_height,
                max_width,
            } => {
                if max_holes == 0 || max_height == 0 || max_width == 0 {
                    return Err("dropout holes and sizes must be non-zero".to_string());
                }
            }
            Transform::Cutout {
                num_holes,
                max_h_size,
                max_w_size,
            } => {
                if num_holes == 0 || max_h_size == 0 || max_w_size == 0 {
                    return Err("cutout holes and sizes must be non-zero".to_string());
                }
            }
            Transform::GridDistortion {
                num_steps,
                distort_limit,
            } => {
                if num_steps == 0 {
                    return Err("num_steps must be non-zero".to_string());
                }
                if !(0.0..1.0).contains(&distort_limit) {
                    return Err(format!("distort_limit must lie in [0, 1), got {}", distort_limit));
                }
            }
            Transform::ElasticTransform { alpha, sigma } => {
                non_negative("alpha", alpha)?;
                if !sigma.is_finite() || sigma <= 0.0 {
                    return Err(format!("sigma must be positive, got {}", sigma));
                }
            }
            Transform::OpticalDistortion {
                distort_limit,
                shift_limit,
            } => {
                non_negative("distort_limit", distort_limit)?;
                non_negative("shift_limit", shift_limit)?;
            }
        }
        Ok(())
    }
}

fn one() -> f32 {
    1.0
}

/// One candidate of a selection group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub transform: Transform,
    /// Chance of applying once selected
    #[serde(default = "one")]
    pub probability: f32,
    /// Relative weight, only read with [`Selection::Weighted`]
    #[serde(default = "one")]
    pub weight: f32,
}

impl Alternative {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            probability: 1.0,
            weight: 1.0,
        }
    }
}

/// How a group picks its alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Uniform,
    Weighted,
}

/// One step of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum TransformStage {
    /// Apply `transform` with the given probability
    Single { transform: Transform, probability: f32 },
    /// Fire with `probability`; when fired, pick exactly one alternative
    OneOf {
        probability: f32,
        #[serde(default)]
        selection: Selection,
        alternatives: Vec<Alternative>,
    },
}

impl TransformStage {
    pub fn single(transform: Transform, probability: f32) -> Self {
        TransformStage::Single {
            transform,
            probability,
        }
    }

    pub fn one_of(probability: f32, transforms: Vec<Transform>) -> Self {
        TransformStage::OneOf {
            probability,
            selection: Selection::Uniform,
            alternatives: transforms.into_iter().map(Alternative::new).collect(),
        }
    }

    pub fn transforms(&self) -> Vec<&Transform> {
        match self {
            TransformStage::Single { transform, .. } => vec![transform],
            TransformStage::OneOf { alternatives, .. } => {
                alternatives.iter().map(|a| &a.transform).collect()
            }
        }
    }

    /// Category of the stage; `None` for an empty group or a group that
    /// mixes categories.
    pub fn category(&self) -> Option<TransformCategory> {
        let transforms = self.transforms();
        let first = transforms.first()?.category();
        transforms
            .iter()
            .all(|t| t.category() == first)
            .then_some(first)
    }
}

/// Ordered list of stages applied to synthesize a derived sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationRecipe {
    pub stages: Vec<TransformStage>,
}

impl AugmentationRecipe {
    pub fn new(stages: Vec<TransformStage>) -> Self {
        Self { stages }
    }

    /// The default recipe: crop to `width`x`height`, then flips and
    /// rotations, tonal changes, blur, noise, occlusion and warps.
    pub fn standard(width: u32, height: u32) -> Self {
        Self::new(vec![
            TransformStage::single(
                Transform::RandomResizedCrop {
                    width,
                    height,
                    scale: (0.8, 1.0),
                    ratio: (0.75, 1.33),
                },
                1.0,
            ),
            TransformStage::one_of(
                0.8,
                vec![
                    Transform::HorizontalFlip,
                    Transform::VerticalFlip,
                    Transform::RandomRotate90,
                ],
            ),
            TransformStage::one_of(
                0.7,
                vec![
                    Transform::Rotate { limit: 30.0 },
                    Transform::ShiftScaleRotate {
                        shift_limit: 0.1,
                        scale_limit: 0.2,
                        rotate_limit: 30.0,
                    },
                ],
            ),
            TransformStage::one_of(
                0.8,
                vec![
                    Transform::BrightnessContrast {
                        brightness_limit: 0.3,
                        contrast_limit: 0.3,
                    },
                    Transform::HueSaturationValue {
                        hue_shift_limit: 20.0,
                        sat_shift_limit: 30.0,
                        val_shift_limit: 20.0,
                    },
                    Transform::Clahe {
                        clip_limit: 2.0,
                        tile_grid: (8, 8),
                    },
                ],
            ),
            TransformStage::one_of(
                0.3,
                vec![
                    Transform::GaussianBlur { blur_limit: (1, 3) },
                    Transform::MotionBlur { blur_limit: 3 },
                    Transform::MedianBlur { blur_limit: 3 },
                ],
            ),
            TransformStage::one_of(
                0.3,
                vec![
                    Transform::GaussNoise {
                        var_limit: (10.0, 50.0),
                    },
                    Transform::IsoNoise {
                        color_shift: (0.01, 0.05),
                        intensity: (0.1, 0.5),
                    },
                ],
            ),
            TransformStage::one_of(
                0.3,
                vec![
                    Transform::CoarseDropout {
                        max_holes: 8,
                        max_height: 32,
                        max_width: 32,
                    },
                    Transform::Cutout {
                        num_holes: 8,
                        max_h_size: 16,
                        max_w_size: 16,
                    },
                ],
            ),
            TransformStage::one_of(
                0.2,
                vec![
                    Transform::GridDistortion {
                        num_steps: 5,
                        distort_limit: 0.3,
                    },
                    Transform::ElasticTransform {
                        alpha: 1.0,
                        sigma: 50.0,
                    },
                    Transform::OpticalDistortion {
                        distort_limit: 0.05,
                        shift_limit: 0.05,
                    },
                ],
            ),
        ])
    }

    /// Check probabilities, group structure, stage ordering and parameters.
    pub fn validate(&self) -> Result<(), String> {
        let mut last_category = TransformCategory::Geometric;

        for (idx, stage) in self.stages.iter().enumerate() {
            let probability = match stage {
                TransformStage::Single { probability, .. } => *probability,
                TransformStage::OneOf {
                    probability,
                    selection,
                    alternatives,
                } => {
                    if alternatives.is_empty() {
                        return Err(format!("stage {} has no alternatives", idx));
                    }
                    for alt in alternatives {
                        check_probability(idx, alt.probability)?;
                    }
                    if *selection == Selection::Weighted {
                        if alternatives
                            .iter()
                            .any(|a| !a.weight.is_finite() || a.weight < 0.0)
                        {
                            return Err(format!("stage {} has a negative weight", idx));
                        }
                        if alternatives.iter().map(|a| a.weight).sum::<f32>() <= 0.0 {
                            return Err(format!("stage {} weights sum to zero", idx));
                        }
                    }
                    *probability
                }
            };
            check_probability(idx, probability)?;

            let category = stage.category().ok_or_else(|| {
                format!("stage {} mixes transform categories in one group", idx)
            })?;
            if category < last_category {
                return Err(format!(
                    "stage {} is {} but follows a {} stage",
                    idx,
                    category.as_str(),
                    last_category.as_str()
                ));
            }
            last_category = category;

            for transform in stage.transforms() {
                if transform.changes_resolution()
                    && (idx != 0 || matches!(stage, TransformStage::OneOf { .. }))
                {
                    return Err(format!(
                        "{} may only be the first, single stage",
                        transform.name()
                    ));
                }
                transform
                    .validate()
                    .map_err(|e| format!("stage {} ({}): {}", idx, transform.name(), e))?;
            }
        }

        Ok(())
    }
}

fn check_probability(idx: usize, p: f32) -> Result<(), String> {
    if !(0.0..=1.0).contains(&p) {
        return Err(format!("stage {} probability {} is outside [0, 1]", idx, p));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_recipe_is_valid() {
        let recipe = AugmentationRecipe::standard(224, 224);
        assert_eq!(recipe.stages.len(), 8);
        assert!(recipe.validate().is_ok());
    }

    #[test]
    fn test_color_before_geometric_rejected() {
        let recipe = AugmentationRecipe::new(vec![
            TransformStage::single(
                Transform::BrightnessContrast {
                    brightness_limit: 0.2,
                    contrast_limit: 0.2,
                },
                1.0,
            ),
            TransformStage::single(Transform::HorizontalFlip, 0.5),
        ]);
        let err = recipe.validate().unwrap_err();
        assert!(err.contains("follows"));
    }

    #[test]
    fn test_mixed_group_rejected() {
        let recipe = AugmentationRecipe::new(vec![TransformStage::one_of(
            0.5,
            vec![Transform::HorizontalFlip, Transform::MedianBlur { blur_limit: 3 }],
        )]);
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_late_crop_rejected() {
        let recipe = AugmentationRecipe::new(vec![
            TransformStage::single(Transform::HorizontalFlip, 0.5),
            TransformStage::single(
                Transform::RandomResizedCrop {
                    width: 32,
                    height: 32,
                    scale: (0.5, 1.0),
                    ratio: (1.0, 1.0),
                },
                1.0,
            ),
        ]);
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_bad_probability_rejected() {
        let recipe = AugmentationRecipe::new(vec![TransformStage::single(
            Transform::VerticalFlip,
            1.5,
        )]);
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_weighted_group_needs_positive_weights() {
        let mut alt = Alternative::new(Transform::HorizontalFlip);
        alt.weight = 0.0;
        let recipe = AugmentationRecipe::new(vec![TransformStage::OneOf {
            probability: 1.0,
            selection: Selection::Weighted,
            alternatives: vec![alt],
        }]);
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_recipe_json_uses_tagged_variants() {
        let json = r#"{
            "stages": [
                {"stage": "single", "probability": 1.0,
                 "transform": {"type": "random_resized_crop", "width": 64, "height": 64,
                               "scale": [0.8, 1.0], "ratio": [0.75, 1.33]}},
                {"stage": "one_of", "probability": 0.5,
                 "alternatives": [{"transform": {"type": "horizontal_flip"}},
                                  {"transform": {"type": "rotate", "limit": 15.0}, "probability": 0.5}]}
            ]
        }"#;
        let recipe: AugmentationRecipe = serde_json::from_str(json).unwrap();
        assert!(recipe.validate().is_ok());
        match &recipe.stages[1] {
            TransformStage::OneOf {
                selection,
                alternatives,
                ..
            } => {
                assert_eq!(*selection, Selection::Uniform);
                assert_eq!(alternatives[0].probability, 1.0);
                assert_eq!(alternatives[1].probability, 0.5);
            }
            other => panic!("unexpected stage {:?}", other),
        }
    }
}
