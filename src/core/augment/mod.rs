mod color;
mod degrade;
mod engine;
mod geometric;
mod recipe;
mod sampling;
mod warp;

pub use engine::{apply, apply_transform, AugmentOutcome, AugmentationEngine, TransformError};
pub use recipe::{
    Alternative, AugmentationRecipe, Selection, Transform, TransformCategory, TransformStage,
};
