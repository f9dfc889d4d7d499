use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::sharpness::laplacian_variance;

/// Default minimum width and height in pixels
pub const DEFAULT_MIN_RESOLUTION: u32 = 100;

/// Why the gate turned a sample away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Undecodable,
    TooSmall,
    TooBlurry,
    /// File could not be read or the derived copy could not be written
    IoError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Undecodable => "undecodable",
            RejectReason::TooSmall => "too_small",
            RejectReason::TooBlurry => "too_blurry",
            RejectReason::IoError => "io_error",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Accept/reject filter for raw samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    pub min_resolution: u32,
    /// Minimum Laplacian variance
    pub sharpness_threshold: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_resolution: DEFAULT_MIN_RESOLUTION,
            sharpness_threshold: 50.0,
        }
    }
}

impl QualityGate {
    pub fn new(min_resolution: u32, sharpness_threshold: f64) -> Self {
        Self {
            min_resolution,
            sharpness_threshold,
        }
    }

    /// Judge encoded image bytes.
    pub fn evaluate(&self, image_bytes: &[u8]) -> Verdict {
        match self.inspect(image_bytes) {
            Ok(_) => Verdict::Accepted,
            Err(reason) => Verdict::Rejected(reason),
        }
    }

    /// Like [`evaluate`](Self::evaluate) but hands back the decoded image on
    /// acceptance so callers don't decode twice.
    pub fn inspect(&self, image_bytes: &[u8]) -> Result<DynamicImage, RejectReason> {
        let img = image::load_from_memory(image_bytes).map_err(|_| RejectReason::Undecodable)?;
        self.check_decoded(&img)?;
        Ok(img)
    }

    /// Size and sharpness checks on an already decoded image.
    pub fn check_decoded(&self, img: &DynamicImage) -> Result<(), RejectReason> {
        if img.width() < self.min_resolution || img.height() < self.min_resolution {
            return Err(RejectReason::TooSmall);
        }

        if laplacian_variance(img) < self.sharpness_threshold {
            return Err(RejectReason::TooBlurry);
        }

        Ok(())
    }
}
