mod gate;
mod sharpness;

pub use gate::{QualityGate, RejectReason, Verdict, DEFAULT_MIN_RESOLUTION};
pub use sharpness::{laplacian_variance, laplacian_variance_gray, reflect101};
