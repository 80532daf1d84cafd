//! Pipeline configuration and dataset schema constants

use std::path::PathBuf;

/// Column holding the customer status the label is derived from.
pub const STATUS_COLUMN: &str = "Attrition_Flag";

/// Status value marking a retained customer; every other value counts as churn.
pub const EXISTING_CUSTOMER: &str = "Existing Customer";

/// Name of the derived binary label column.
pub const LABEL_COLUMN: &str = "Churn";

/// Categorical columns that get mean-encoded against the label.
pub const CATEGORICAL_COLUMNS: [&str; 5] = [
    "Gender",
    "Education_Level",
    "Marital_Status",
    "Income_Category",
    "Card_Category",
];

/// Numeric columns used directly as features.
pub const NUMERIC_COLUMNS: [&str; 14] = [
    "Customer_Age",
    "Dependent_count",
    "Months_on_book",
    "Total_Relationship_Count",
    "Months_Inactive_12_mon",
    "Contacts_Count_12_mon",
    "Credit_Limit",
    "Total_Revolving_Bal",
    "Avg_Open_To_Buy",
    "Total_Amt_Chng_Q4_Q1",
    "Total_Trans_Amt",
    "Total_Trans_Ct",
    "Total_Ct_Chng_Q4_Q1",
    "Avg_Utilization_Ratio",
];

/// Suffix appended to a categorical column to name its encoded counterpart.
pub const ENCODED_SUFFIX: &str = "_Churn";

/// File names of the EDA plots, relative to the EDA images directory.
pub const EDA_PLOTS: [&str; 5] = [
    "churn_distribution.png",
    "marital_status_distribution.png",
    "customer_age_distribution.png",
    "heatmap.png",
    "total_transaction_distribution.png",
];

/// File names of the result artifacts, relative to the results directory.
pub const RESULT_PLOTS: [&str; 2] = ["roc_curves.png", "feature_importances.png"];

/// File names of the classification reports, relative to the results directory.
pub const REPORT_FILES: [&str; 2] = [
    "logistic_classification_report.txt",
    "rf_classification_report.txt",
];

/// File names of the serialized models, relative to the models directory.
pub const MODEL_FILES: [&str; 2] = ["logistic_model.json", "rfc_model.json"];

/// The full, fixed feature column set: numerics first, then encoded categoricals.
pub fn feature_columns() -> Vec<String> {
    NUMERIC_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(
            CATEGORICAL_COLUMNS
                .iter()
                .map(|c| format!("{c}{ENCODED_SUFFIX}")),
        )
        .collect()
}

/// Paths and knobs for a single pipeline run.
///
/// Defaults mirror the fixed paths the CLI uses when invoked with no
/// arguments; tests point these at temporary directories instead.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input CSV of customer records
    pub data_path: PathBuf,
    /// Directory for EDA plot images
    pub eda_dir: PathBuf,
    /// Directory for evaluation plots and reports
    pub results_dir: PathBuf,
    /// Directory for serialized models
    pub models_dir: PathBuf,
    /// Append-only run log
    pub log_path: PathBuf,
    /// Fraction of rows held out for testing
    pub test_fraction: f64,
    /// Seed for the split shuffle and forest training
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/bank_data.csv"),
            eda_dir: PathBuf::from("images/eda"),
            results_dir: PathBuf::from("images/results"),
            models_dir: PathBuf::from("models"),
            log_path: PathBuf::from("logs/churn_pipeline.log"),
            test_fraction: 0.3,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_columns_are_fixed() {
        let cols = feature_columns();
        assert_eq!(cols.len(), 19);
        assert_eq!(cols[0], "Customer_Age");
        assert_eq!(cols[14], "Gender_Churn");
        assert_eq!(cols[18], "Card_Category_Churn");
    }

    #[test]
    fn test_default_paths() {
        let config = PipelineConfig::default();
        assert_eq!(config.test_fraction, 0.3);
        assert_eq!(config.seed, 42);
        assert!(config.eda_dir.ends_with("eda"));
    }
}
