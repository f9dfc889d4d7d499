pub mod augment;
pub mod dataset;
pub mod manifest;
pub mod operations;
pub mod quality;
pub mod stages;

pub use dataset::*;
pub use stages::{balance_dataset, clean_dataset, generate_report, run_pipeline, split_dataset};
