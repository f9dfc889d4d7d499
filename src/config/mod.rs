mod pipeline_config;

pub use pipeline_config::{PipelineConfig, DEFAULT_CONFIG_FILE};
