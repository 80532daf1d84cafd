//! ChurnForge CLI entry point
//!
//! Parses arguments, sets up logging to stdout plus the append-only run log,
//! and drives the pipeline. Exits non-zero on any fatal stage failure.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use churnforge::{run_pipeline, Args};
use tracing::{error, info, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::FmtSubscriber;

fn init_logging(log_path: &Path, verbose: bool) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory for {}", log_path.display()))?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(Arc::new(log_file)))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.to_config();

    init_logging(&config.log_path, args.verbose)?;

    info!("ChurnForge v{}", env!("CARGO_PKG_VERSION"));
    info!("Input: {}", config.data_path.display());

    match run_pipeline(&config) {
        Ok(report) => {
            info!(
                "✓ Run finished: {} rows ({} train / {} test), {} artifacts written, {} failed",
                report.rows,
                report.train_rows,
                report.test_rows,
                report.export.written.len(),
                report.export.failed.len()
            );
            Ok(())
        }
        Err(e) => {
            error!("pipeline aborted: {e}");
            std::process::exit(1);
        }
    }
}
