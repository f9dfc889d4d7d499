//! Curates a class-labelled image collection into a clean, balanced and
//! reproducibly split training dataset.

pub mod config;
pub mod core;
pub mod error;
pub mod infrastructure;

pub use config::PipelineConfig;
pub use error::{CurationError, Result};
