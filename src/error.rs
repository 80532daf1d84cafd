use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the churn pipeline.
///
/// `Data`, `MissingColumn` and `Training` are fatal and abort the run.
/// `Artifact` is raised per output file during export and is non-fatal:
/// the exporter logs it and keeps writing the remaining artifacts.
#[derive(Debug, Error)]
pub enum ChurnError {
    #[error("data error: {0}")]
    Data(String),

    #[error("schema error: missing column `{0}`")]
    MissingColumn(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("artifact write failed for {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },
}

impl From<polars::error::PolarsError> for ChurnError {
    fn from(err: polars::error::PolarsError) -> Self {
        ChurnError::Data(err.to_string())
    }
}
