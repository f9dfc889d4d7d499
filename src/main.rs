//! dataset-curator: raw image folders in, balanced training splits out.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use dataset_curator::config::PipelineConfig;
use dataset_curator::core::{balance_dataset, clean_dataset, generate_report, run_pipeline, split_dataset};
use dataset_curator::infrastructure::logging::{setup_logging, LoggingOptions};
use dataset_curator::Result;
use tracing::{error, info};

fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load_or_create(&cli.config)?;

    match cli.command {
        Commands::Run { input, work_dir } => {
            let run = run_pipeline(&config, &input, &work_dir)?;
            info!("Dataset ready at {:?}", run.dataset_dir);
        }
        Commands::Clean { input, output } => {
            clean_dataset(&config, &input, &output)?;
        }
        Commands::Balance { input, output } => {
            balance_dataset(&config, &input, &output)?;
        }
        Commands::Split { input, output } => {
            split_dataset(&config, &input, &output)?;
        }
        Commands::Report {
            dataset,
            cleaned,
            balanced,
        } => {
            generate_report(&config, &dataset, cleaned.as_deref(), balanced.as_deref())?;
        }
        Commands::InitConfig => {
            println!("{}", cli.config.display());
        }
    }

    Ok(())
}

/// Process exit status: 0 on success, 1 for any failure
fn exit_code(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    let options = LoggingOptions {
        verbose: cli.verbose,
        log_dir: cli.log_dir.clone(),
    };
    if let Err(e) = setup_logging(&options) {
        eprintln!("Error: failed to set up logging: {}", e);
        std::process::exit(1);
    }

    info!("Starting dataset curator");

    let result = run(cli);
    if let Err(e) = &result {
        error!("{}", e);
    }
    std::process::exit(exit_code(&result));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset_curator::CurationError;
    use std::ffi::OsStr;
    use std::fs;
    use std::path::Path;

    fn run_command(config: &Path, input: &Path, work_dir: &Path) -> Result<()> {
        let cli = Cli::try_parse_from([
            OsStr::new("dataset-curator"),
            OsStr::new("--config"),
            config.as_os_str(),
            OsStr::new("run"),
            OsStr::new("--input"),
            input.as_os_str(),
            OsStr::new("--work-dir"),
            work_dir.as_os_str(),
        ])
        .unwrap();
        run(cli)
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&Ok(())), 0);
        assert_eq!(exit_code(&Err(CurationError::Config("bad".to_string()))), 1);
    }

    #[test]
    fn test_invalid_config_fails_with_exit_code_one() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        fs::write(&config, r#"{"validation_split": 0.8, "test_split": 0.4}"#).unwrap();
        fs::create_dir_all(dir.path().join("raw").join("rust")).unwrap();

        let result = run_command(&config, &dir.path().join("raw"), dir.path());

        assert!(matches!(result, Err(CurationError::Config(_))));
        assert_eq!(exit_code(&result), 1);
        assert!(!dir.path().join("cleaned_dataset").exists());
    }

    #[test]
    fn test_missing_input_fails_with_exit_code_one() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");

        let result = run_command(&config, &dir.path().join("raw"), dir.path());

        assert!(matches!(result, Err(CurationError::EmptyInput(_))));
        assert_eq!(exit_code(&result), 1);
        assert!(config.is_file());
    }
}
