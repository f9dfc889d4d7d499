//! Logging for the dataset curator
//!
//! This module provides:
//! - Custom log formatting with bracketed output
//! - Dual logging (file + stdout)
//! - Log file management with timestamps

mod formatter;
mod setup;

pub use formatter::BracketedFormatter;
pub use setup::{resolve_log_dir, setup_logging, LoggingOptions};
