//! Label derivation, target encoding and feature matrix assembly

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::config::{
    feature_columns, CATEGORICAL_COLUMNS, ENCODED_SUFFIX, EXISTING_CUSTOMER, LABEL_COLUMN,
    STATUS_COLUMN,
};
use crate::error::ChurnError;

/// Encoded feature matrix with its label vector and column names.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// One row per customer, one column per feature (n_rows, 19)
    pub features: Array2<f64>,
    /// Binary churn labels, one per row
    pub labels: Array1<usize>,
    /// Feature column names in matrix order
    pub column_names: Vec<String>,
}

/// Deterministic train/test partition of a feature matrix.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<usize>,
    pub y_test: Array1<usize>,
}

fn require_column(df: &DataFrame, name: &str) -> crate::Result<()> {
    if df.get_column_names().iter().any(|c| *c == name) {
        Ok(())
    } else {
        Err(ChurnError::MissingColumn(name.to_string()))
    }
}

/// Append the binary churn label derived from the customer status column.
///
/// A customer counts as churned unless their status is exactly
/// "Existing Customer".
pub fn derive_label(df: DataFrame) -> crate::Result<DataFrame> {
    require_column(&df, STATUS_COLUMN)?;

    let df = df
        .lazy()
        .with_column(
            when(col(STATUS_COLUMN).eq(lit(EXISTING_CUSTOMER)))
                .then(lit(0i64))
                .otherwise(lit(1i64))
                .cast(DataType::Int64)
                .alias(LABEL_COLUMN),
        )
        .collect()?;

    Ok(df)
}

/// Mean-encode each categorical column against the churn label.
///
/// Every category value is replaced by the mean label of the rows sharing
/// that category, stored in a new `<column>_Churn` column. The aggregation
/// is order-independent; a category seen once encodes to that row's own
/// label. No smoothing is applied.
pub fn encode_categoricals(df: DataFrame) -> crate::Result<DataFrame> {
    require_column(&df, LABEL_COLUMN)?;

    let mut df = df;
    for cat in CATEGORICAL_COLUMNS {
        require_column(&df, cat)?;
        let encoded = format!("{cat}{ENCODED_SUFFIX}");

        let means = df
            .clone()
            .lazy()
            .group_by([col(cat)])
            .agg([col(LABEL_COLUMN).mean().alias(&encoded)])
            .collect()?;

        // Left join keeps the row order of the record set.
        df = df
            .lazy()
            .join(
                means.lazy(),
                [col(cat)],
                [col(cat)],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
    }

    Ok(df)
}

/// Extract the fixed 19-column feature matrix and the label vector.
pub fn build_feature_matrix(df: &DataFrame) -> crate::Result<FeatureMatrix> {
    require_column(df, LABEL_COLUMN)?;

    let column_names = feature_columns();
    let n_rows = df.height();
    let n_cols = column_names.len();

    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(n_cols);
    for name in &column_names {
        require_column(df, name)?;
        let series = df.column(name)?.cast(&DataType::Float64)?;
        let ca = series.f64()?;
        if ca.null_count() > 0 {
            return Err(ChurnError::Data(format!(
                "column `{name}` has {} missing values after encoding",
                ca.null_count()
            )));
        }
        columns.push(ca.into_no_null_iter().collect());
    }

    let mut data = Vec::with_capacity(n_rows * n_cols);
    for row in 0..n_rows {
        for column in &columns {
            data.push(column[row]);
        }
    }
    let features = Array2::from_shape_vec((n_rows, n_cols), data)
        .map_err(|e| ChurnError::Data(e.to_string()))?;

    let label_series = df.column(LABEL_COLUMN)?.cast(&DataType::Int64)?;
    let labels: Vec<usize> = label_series
        .i64()?
        .into_no_null_iter()
        .map(|v| v as usize)
        .collect();
    let labels = Array1::from_vec(labels);

    info!(
        "Assembled feature matrix: {} rows x {} columns",
        features.nrows(),
        features.ncols()
    );

    Ok(FeatureMatrix {
        features,
        labels,
        column_names,
    })
}

/// Partition the feature matrix into disjoint train and test subsets.
///
/// Row indices are shuffled with a seeded RNG, so the same seed and input
/// always produce the same partition. Test and train sizes sum to the row
/// count; both sides get at least one row.
pub fn train_test_split(
    matrix: &FeatureMatrix,
    test_fraction: f64,
    seed: u64,
) -> crate::Result<TrainTestSplit> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(ChurnError::Data(format!(
            "test fraction {test_fraction} must be in [0, 1)"
        )));
    }
    let n_rows = matrix.features.nrows();
    if n_rows < 2 {
        return Err(ChurnError::Data(format!(
            "need at least 2 rows to split, got {n_rows}"
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n_rows as f64) * test_fraction).round() as usize;
    let n_test = n_test.clamp(1, n_rows - 1);
    let (test_idx, train_idx) = indices.split_at(n_test);

    Ok(TrainTestSplit {
        x_train: matrix.features.select(Axis(0), train_idx),
        x_test: matrix.features.select(Axis(0), test_idx),
        y_train: matrix.labels.select(Axis(0), train_idx),
        y_test: matrix.labels.select(Axis(0), test_idx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled_df() -> DataFrame {
        let df = df![
            STATUS_COLUMN => ["Existing Customer", "Attrited Customer", "Existing Customer", "Attrited Customer"],
            "Gender" => ["M", "M", "F", "F"],
        ]
        .unwrap();
        derive_label(df).unwrap()
    }

    #[test]
    fn test_derive_label_binary() {
        let df = labelled_df();
        let labels: Vec<i64> = df
            .column(LABEL_COLUMN)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(labels, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_derive_label_missing_status_column() {
        let df = df!["Gender" => ["M", "F"]].unwrap();
        let result = derive_label(df);
        assert!(matches!(result, Err(ChurnError::MissingColumn(c)) if c == STATUS_COLUMN));
    }

    #[test]
    fn test_target_encoding_group_means() {
        let df = df![
            "Gender" => ["M", "M", "F", "F"],
            "Education_Level" => ["HS", "HS", "HS", "HS"],
            "Marital_Status" => ["Single", "Single", "Single", "Single"],
            "Income_Category" => ["Low", "Low", "Low", "Low"],
            "Card_Category" => ["Blue", "Blue", "Blue", "Blue"],
            LABEL_COLUMN => [0i64, 1, 1, 1],
        ]
        .unwrap();

        let encoded = encode_categoricals(df).unwrap();

        let gender: Vec<f64> = encoded
            .column("Gender_Churn")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(gender, vec![0.5, 0.5, 1.0, 1.0]);

        // A column with a single category encodes to the overall label mean.
        let card: Vec<f64> = encoded
            .column("Card_Category_Churn")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert!(card.iter().all(|&v| (v - 0.75).abs() < 1e-12));
    }

    #[test]
    fn test_encoding_missing_category_column() {
        let df = df![
            "Gender" => ["M", "F"],
            LABEL_COLUMN => [0i64, 1],
        ]
        .unwrap();
        let result = encode_categoricals(df);
        assert!(matches!(result, Err(ChurnError::MissingColumn(_))));
    }

    fn small_matrix(n_rows: usize) -> FeatureMatrix {
        let n_cols = feature_columns().len();
        let data: Vec<f64> = (0..n_rows * n_cols).map(|v| v as f64).collect();
        FeatureMatrix {
            features: Array2::from_shape_vec((n_rows, n_cols), data).unwrap(),
            labels: Array1::from_iter((0..n_rows).map(|i| i % 2)),
            column_names: feature_columns(),
        }
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let matrix = small_matrix(10);

        let split = train_test_split(&matrix, 0.3, 42).unwrap();
        assert_eq!(split.x_train.nrows() + split.x_test.nrows(), 10);
        assert_eq!(split.x_test.nrows(), 3);
        assert_eq!(split.y_train.len(), split.x_train.nrows());

        let again = train_test_split(&matrix, 0.3, 42).unwrap();
        assert_eq!(split.x_train, again.x_train);
        assert_eq!(split.y_test, again.y_test);

        let other_seed = train_test_split(&matrix, 0.3, 7).unwrap();
        assert_eq!(other_seed.x_test.nrows(), 3);
    }

    #[test]
    fn test_split_is_disjoint() {
        let matrix = small_matrix(20);
        let split = train_test_split(&matrix, 0.3, 42).unwrap();

        // First feature value identifies the source row uniquely.
        let mut seen: Vec<i64> = split
            .x_train
            .column(0)
            .iter()
            .chain(split.x_test.column(0).iter())
            .map(|&v| v as i64)
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let matrix = small_matrix(10);
        assert!(train_test_split(&matrix, 1.0, 42).is_err());
        assert!(train_test_split(&matrix, -0.1, 42).is_err());
    }
}
