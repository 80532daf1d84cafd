//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::config::PipelineConfig;

/// Bank customer churn prediction pipeline
///
/// Run with no arguments to use the fixed default paths: the customer CSV is
/// read from `data/bank_data.csv` and all artifacts land under `images/`,
/// `models/` and `logs/`.
#[derive(Parser, Debug)]
#[command(name = "churnforge", version, about, long_about = None)]
pub struct Args {
    /// Path to the input customer CSV
    #[arg(short, long, default_value = "data/bank_data.csv")]
    pub input: PathBuf,

    /// Directory for EDA plot images
    #[arg(long, default_value = "images/eda")]
    pub eda_dir: PathBuf,

    /// Directory for evaluation plots and reports
    #[arg(long, default_value = "images/results")]
    pub results_dir: PathBuf,

    /// Directory for serialized models
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Append-only run log file
    #[arg(long, default_value = "logs/churn_pipeline.log")]
    pub log_file: PathBuf,

    /// Fraction of rows held out for testing
    #[arg(long, default_value = "0.3")]
    pub test_fraction: f64,

    /// Random seed for the split and forest training
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            data_path: self.input.clone(),
            eda_dir: self.eda_dir.clone(),
            results_dir: self.results_dir.clone(),
            models_dir: self.models_dir.clone(),
            log_path: self.log_file.clone(),
            test_fraction: self.test_fraction,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_paths() {
        let args = Args::try_parse_from(["churnforge"]).unwrap();
        let config = args.to_config();

        assert_eq!(config.data_path, PathBuf::from("data/bank_data.csv"));
        assert_eq!(config.eda_dir, PathBuf::from("images/eda"));
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert_eq!(config.test_fraction, 0.3);
        assert_eq!(config.seed, 42);
        assert!(!args.verbose);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "churnforge",
            "--input",
            "other.csv",
            "--seed",
            "7",
            "--verbose",
        ])
        .unwrap();
        let config = args.to_config();

        assert_eq!(config.data_path, PathBuf::from("other.csv"));
        assert_eq!(config.seed, 7);
        assert!(args.verbose);
    }
}
