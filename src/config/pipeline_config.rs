use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::augment::AugmentationRecipe;
use crate::core::operations::{write_atomic, OutputFormat};
use crate::core::quality::{QualityGate, DEFAULT_MIN_RESOLUTION};
use crate::error::{CurationError, Result};

/// File name looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "preprocessing_config.json";

/// Every option the curation pipeline reads.
///
/// Loaded once per run and never changed afterwards. Keys missing from a
/// config file take the defaults below; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output `[width, height]` of every written image
    pub target_size: [u32; 2],

    pub validation_split: f64,
    pub test_split: f64,

    /// Minimum Laplacian variance for a raw image to count as sharp
    pub quality_threshold: f64,

    /// Minimum width and height of a raw image
    pub min_resolution: u32,

    pub min_samples_per_class: usize,
    pub max_samples_per_class: usize,

    /// Accepted input extensions, case-insensitive
    pub image_formats: Vec<String>,

    pub output_format: OutputFormat,

    /// JPEG quality, 1-100
    pub output_quality: u8,

    /// Master seed for balancing and splitting
    pub seed: u64,

    /// Failed synthesis attempts tolerated per class before giving up
    pub synthesis_retry_budget: usize,

    /// Attempts for file reads/writes hitting transient errors
    pub io_retries: u32,

    /// Samples handed to the worker pool at once
    pub batch_size: usize,

    /// Worker threads; 0 lets rayon decide
    pub workers: usize,

    /// Custom augmentation recipe; the standard one when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub augmentation: Option<AugmentationRecipe>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_size: [224, 224],
            validation_split: 0.2,
            test_split: 0.1,
            quality_threshold: 50.0,
            min_resolution: DEFAULT_MIN_RESOLUTION,
            min_samples_per_class: 100,
            max_samples_per_class: 2000,
            image_formats: [".jpg", ".jpeg", ".png", ".bmp", ".tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_format: OutputFormat::Jpg,
            output_quality: 95,
            seed: 42,
            synthesis_retry_budget: 50,
            io_retries: 3,
            batch_size: 64,
            workers: 0,
            augmentation: None,
        }
    }
}

impl PipelineConfig {
    /// Default config path in the current working directory
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load the config at `path`, or write the defaults there if it doesn't
    /// exist yet. The result is validated either way.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(contents) => {
                info!("Loading configuration from: {:?}", path);
                serde_json::from_str::<PipelineConfig>(&contents).map_err(|e| {
                    CurationError::Config(format!("failed to parse {:?}: {}", path, e))
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration file found, writing defaults to: {:?}", path);
                let config = PipelineConfig::default();
                config.save(path)?;
                config
            }
            Err(e) => return Err(CurationError::io(path, e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Save the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CurationError::io(parent, e))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes(), self.io_retries)?;
        info!("Configuration saved to: {:?}", path);
        Ok(())
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(CurationError::Config(msg));

        for (name, value) in [
            ("validation_split", self.validation_split),
            ("test_split", self.test_split),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return fail(format!("{} must lie in [0, 1], got {}", name, value));
            }
        }
        if self.validation_split + self.test_split > 1.0 {
            return fail(format!(
                "validation_split + test_split must not exceed 1.0, got {}",
                self.validation_split + self.test_split
            ));
        }
        if self.target_size[0] == 0 || self.target_size[1] == 0 {
            return fail(format!("target_size must be non-zero, got {:?}", self.target_size));
        }
        if !self.quality_threshold.is_finite() || self.quality_threshold < 0.0 {
            return fail(format!(
                "quality_threshold must be a non-negative number, got {}",
                self.quality_threshold
            ));
        }
        if self.min_resolution == 0 {
            return fail("min_resolution must be non-zero".to_string());
        }
        if self.max_samples_per_class == 0 {
            return fail("max_samples_per_class must be non-zero".to_string());
        }
        if self.min_samples_per_class > self.max_samples_per_class {
            return fail(format!(
                "min_samples_per_class ({}) exceeds max_samples_per_class ({})",
                self.min_samples_per_class, self.max_samples_per_class
            ));
        }
        if self.image_formats.iter().all(|f| f.trim_start_matches('.').is_empty()) {
            return fail("image_formats must list at least one extension".to_string());
        }
        if !(1..=100).contains(&self.output_quality) {
            return fail(format!("output_quality must lie in 1..=100, got {}", self.output_quality));
        }
        if self.batch_size == 0 {
            return fail("batch_size must be non-zero".to_string());
        }
        if let Some(recipe) = &self.augmentation {
            recipe
                .validate()
                .map_err(|e| CurationError::Config(format!("augmentation: {}", e)))?;
        }
        if !self.image_formats.iter().any(|f| {
            f.trim_start_matches('.')
                .eq_ignore_ascii_case(self.output_format.extension())
        }) {
            // Later stages only pick up files with accepted extensions
            warn!(
                "output_format {:?} is not in image_formats; adding it for downstream stages",
                self.output_format
            );
        }
        Ok(())
    }

    /// Accepted extensions for stage inputs, always including the output
    /// format so later stages see what earlier ones wrote.
    pub fn accepted_extensions(&self) -> Vec<String> {
        let mut extensions = self.image_formats.clone();
        let out = self.output_format.extension();
        if !extensions
            .iter()
            .any(|f| f.trim_start_matches('.').eq_ignore_ascii_case(out))
        {
            extensions.push(format!(".{}", out));
        }
        extensions
    }

    pub fn quality_gate(&self) -> QualityGate {
        QualityGate::new(self.min_resolution, self.quality_threshold)
    }

    /// The configured recipe, or the standard one sized to `target_size`
    pub fn recipe(&self) -> AugmentationRecipe {
        self.augmentation
            .clone()
            .unwrap_or_else(|| AugmentationRecipe::standard(self.target_size[0], self.target_size[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_size, [224, 224]);
        assert_eq!(config.validation_split, 0.2);
        assert_eq!(config.test_split, 0.1);
        assert_eq!(config.min_samples_per_class, 100);
        assert_eq!(config.max_samples_per_class, 2000);
        assert_eq!(config.output_quality, 95);
        assert_eq!(config.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_keys_default_and_unknown_ignored() {
        let json = r#"{"seed": 7, "test_split": 0.15, "augmentation_factor": 3}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.test_split, 0.15);
        assert_eq!(config.validation_split, 0.2);
        assert_eq!(config.output_format, OutputFormat::Jpg);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocessing_config.json");

        let created = PipelineConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, PipelineConfig::default());

        let reloaded = PipelineConfig::load_or_create(&path).unwrap();
        assert_eq!(reloaded, created);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"output_format": "gif"}"#).unwrap();
        assert!(matches!(
            PipelineConfig::load_or_create(&path),
            Err(CurationError::Config(_))
        ));
    }

    #[test]
    fn test_fraction_validation() {
        let mut config = PipelineConfig::default();
        config.validation_split = 0.7;
        config.test_split = 0.5;
        assert!(matches!(config.validate(), Err(CurationError::Config(_))));

        config.validation_split = -0.1;
        config.test_split = 0.1;
        assert!(config.validate().is_err());

        config.validation_split = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_bounds_validation() {
        let mut config = PipelineConfig::default();
        config.min_samples_per_class = 3000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_accepted_extensions_include_output_format() {
        let mut config = PipelineConfig::default();
        config.image_formats = vec![".jpg".to_string()];
        config.output_format = OutputFormat::Png;
        let exts = config.accepted_extensions();
        assert!(exts.contains(&".png".to_string()));
        assert!(exts.contains(&".jpg".to_string()));
    }

    #[test]
    fn test_recipe_defaults_to_standard() {
        let mut config = PipelineConfig::default();
        config.target_size = [64, 32];
        assert_eq!(config.recipe(), AugmentationRecipe::standard(64, 32));
    }
}
