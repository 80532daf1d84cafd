//! Customer data loading using Polars

use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::error::ChurnError;

/// Load the customer record set from a CSV file.
///
/// The file must exist and parse as headered CSV; both conditions are fatal
/// to the run when violated. Column presence is checked later by the feature
/// engineering stage, which knows which columns it needs.
pub fn load_customer_data(path: &Path) -> crate::Result<DataFrame> {
    if !path.exists() {
        return Err(ChurnError::Data(format!(
            "input file not found: {}",
            path.display()
        )));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| ChurnError::Data(format!("failed to open {}: {e}", path.display())))?
        .finish()
        .map_err(|e| ChurnError::Data(format!("failed to parse {}: {e}", path.display())))?;

    if df.height() == 0 {
        return Err(ChurnError::Data(format!(
            "no data rows in {}",
            path.display()
        )));
    }

    info!(
        "Loaded {} rows, {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );

    Ok(df)
}
