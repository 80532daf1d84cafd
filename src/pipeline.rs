//! End-to-end pipeline orchestration
//!
//! Strictly linear, single pass: loader, feature engineering, EDA, training,
//! export. Any fatal stage error is logged with the stage name and aborts
//! the run.

use std::time::Instant;

use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::data::load_customer_data;
use crate::error::ChurnError;
use crate::eval::{export_artifacts, ExportSummary};
use crate::features::{build_feature_matrix, derive_label, encode_categoricals, train_test_split};
use crate::model::train_models;

/// Summary of a completed run.
#[derive(Debug)]
pub struct PipelineReport {
    pub rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub export: ExportSummary,
}

fn stage_failed(stage: &str, err: ChurnError) -> ChurnError {
    error!("stage `{stage}` failed: {err}");
    err
}

/// Run the full churn pipeline against the given configuration.
pub fn run_pipeline(config: &PipelineConfig) -> crate::Result<PipelineReport> {
    let started = Instant::now();

    info!("Stage: loader");
    let df = load_customer_data(&config.data_path).map_err(|e| stage_failed("loader", e))?;
    let rows = df.height();

    info!("Stage: feature engineering");
    let df = derive_label(df).map_err(|e| stage_failed("feature engineering", e))?;

    // EDA runs on the labelled record set; its plot failures are logged
    // inside the reporter and never abort the run.
    info!("Stage: eda");
    crate::eda::generate_eda_report(&df, &config.eda_dir).map_err(|e| stage_failed("eda", e))?;

    let df = encode_categoricals(df).map_err(|e| stage_failed("feature engineering", e))?;
    let matrix = build_feature_matrix(&df).map_err(|e| stage_failed("feature engineering", e))?;
    let split = train_test_split(&matrix, config.test_fraction, config.seed)
        .map_err(|e| stage_failed("feature engineering", e))?;
    info!(
        "Split: {} train rows, {} test rows",
        split.x_train.nrows(),
        split.x_test.nrows()
    );

    info!("Stage: training");
    let models = train_models(&split, config).map_err(|e| stage_failed("training", e))?;

    info!("Stage: export");
    let export = export_artifacts(&models, &split, &matrix.column_names, config)
        .map_err(|e| stage_failed("export", e))?;

    info!(
        "Pipeline complete in {:.2}s: {} rows processed, {} artifacts written",
        started.elapsed().as_secs_f64(),
        rows,
        export.written.len()
    );

    Ok(PipelineReport {
        rows,
        train_rows: split.x_train.nrows(),
        test_rows: split.x_test.nrows(),
        export,
    })
}
