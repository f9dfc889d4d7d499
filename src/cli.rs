use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Curate a class-labelled image collection into a balanced train/val/test dataset
#[derive(Parser)]
#[command(name = "dataset-curator")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file, created with defaults if missing
    #[arg(short, long, global = true, default_value = "preprocessing_config.json")]
    pub config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory for log files (default: ./logs)
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run clean, balance, split and report in order
    Run {
        /// Raw dataset, one subdirectory per class
        #[arg(short, long)]
        input: PathBuf,

        /// Where cleaned_dataset/, balanced_dataset/ and dataset/ are created
        #[arg(short, long, default_value = ".")]
        work_dir: PathBuf,
    },

    /// Quality-gate, resize and re-encode raw images
    Clean {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Oversample small classes with augmented copies
    Balance {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Split each class into train, val and test
    Split {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write dataset_report.json for a split dataset
    Report {
        /// Split dataset root holding train/, val/ and test/
        #[arg(short, long)]
        dataset: PathBuf,

        /// Clean stage output, for raw and invalid counts
        #[arg(long)]
        cleaned: Option<PathBuf>,

        /// Balance stage output, for synthesized counts
        #[arg(long)]
        balanced: Option<PathBuf>,
    },

    /// Write the default configuration file if it doesn't exist
    InitConfig,
}
