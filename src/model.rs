//! Model training: logistic regression and grid-searched random forest

use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::ChurnError;
use crate::features::TrainTestSplit;
use crate::forest::{ForestConfig, MaxFeatures, RandomForest};

/// Number of cross-validation folds used by the grid search.
const CV_FOLDS: usize = 5;

/// Maximum iterations for the logistic regression solver.
const LOGISTIC_MAX_ITERATIONS: u64 = 300;

/// One evaluated grid-search candidate.
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub config: ForestConfig,
    pub mean_accuracy: f64,
}

/// Both fitted classifiers plus the grid-search trace.
pub struct TrainedModels {
    pub logistic: FittedLogisticRegression<f64, usize>,
    pub forest: RandomForest,
    pub grid_results: Vec<GridSearchResult>,
}

/// The fixed hyperparameter grid for the random forest.
fn parameter_grid(seed: u64) -> Vec<ForestConfig> {
    let mut grid = Vec::new();
    for &n_estimators in &[20usize, 50] {
        for &max_features in &[MaxFeatures::Sqrt, MaxFeatures::All] {
            for &max_depth in &[4usize, 8] {
                grid.push(ForestConfig {
                    n_estimators,
                    max_depth,
                    min_samples_split: 2,
                    max_features,
                    seed,
                });
            }
        }
    }
    grid
}

fn validate_matrix(x: &Array2<f64>, name: &str) -> crate::Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(ChurnError::Training(format!(
            "{name} feature matrix is empty"
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ChurnError::Training(format!(
            "{name} feature matrix contains non-finite values"
        )));
    }
    Ok(())
}

fn accuracy(truth: &Array1<usize>, predictions: &Array1<usize>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth
        .iter()
        .zip(predictions.iter())
        .filter(|(a, b)| a == b)
        .count();
    correct as f64 / truth.len() as f64
}

/// Mean k-fold cross-validation accuracy of a forest config.
///
/// Folds come from a seeded shuffle of the training rows, so candidate
/// configs are all scored against the same deterministic partition.
fn cross_validate(
    x: &Array2<f64>,
    y: &Array1<usize>,
    config: &ForestConfig,
    folds: usize,
    seed: u64,
) -> crate::Result<f64> {
    let n_rows = x.nrows();
    let folds = folds.min(n_rows);
    if folds < 2 {
        return Err(ChurnError::Training(format!(
            "need at least 2 rows for cross-validation, got {n_rows}"
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut fold_accuracies = Vec::with_capacity(folds);
    for fold in 0..folds {
        let start = fold * n_rows / folds;
        let end = (fold + 1) * n_rows / folds;
        let val_idx = &indices[start..end];
        let train_idx: Vec<usize> = indices[..start]
            .iter()
            .chain(indices[end..].iter())
            .copied()
            .collect();

        let forest = RandomForest::fit(
            &x.select(Axis(0), &train_idx),
            &y.select(Axis(0), &train_idx),
            config,
        )?;

        let x_val = x.select(Axis(0), val_idx);
        let y_val = y.select(Axis(0), val_idx);
        let predictions = forest.predict(&x_val)?;
        fold_accuracies.push(accuracy(&y_val, &predictions));
    }

    Ok(fold_accuracies.iter().sum::<f64>() / fold_accuracies.len() as f64)
}

/// Train both classifiers on the training split.
///
/// The logistic regression is fitted directly; the random forest first goes
/// through an exhaustive grid search with cross-validation, and the winning
/// config (ties broken by grid order) is refitted on the full training
/// split.
pub fn train_models(
    split: &TrainTestSplit,
    config: &PipelineConfig,
) -> crate::Result<TrainedModels> {
    validate_matrix(&split.x_train, "train")?;
    validate_matrix(&split.x_test, "test")?;

    info!(
        "Training on {} rows, evaluating on {} rows",
        split.x_train.nrows(),
        split.x_test.nrows()
    );

    // Linear model, fitted directly on the training split.
    let dataset = Dataset::new(split.x_train.clone(), split.y_train.clone());
    let logistic = LogisticRegression::default()
        .max_iterations(LOGISTIC_MAX_ITERATIONS)
        .fit(&dataset)
        .map_err(|e| ChurnError::Training(format!("logistic regression failed: {e}")))?;
    info!("Logistic regression fitted");

    // Exhaustive grid search for the forest.
    let grid = parameter_grid(config.seed);
    info!(
        "Grid search: {} candidates, {}-fold cross-validation",
        grid.len(),
        CV_FOLDS
    );

    let mut grid_results = Vec::with_capacity(grid.len());
    let mut best: Option<usize> = None;
    for (idx, candidate) in grid.iter().enumerate() {
        let mean_accuracy =
            cross_validate(&split.x_train, &split.y_train, candidate, CV_FOLDS, config.seed)?;
        info!(
            "  trees={} depth={} features={} -> CV accuracy {:.4}",
            candidate.n_estimators, candidate.max_depth, candidate.max_features, mean_accuracy
        );
        grid_results.push(GridSearchResult {
            config: candidate.clone(),
            mean_accuracy,
        });
        let improved = match best {
            None => true,
            Some(current) => mean_accuracy > grid_results[current].mean_accuracy,
        };
        if improved {
            best = Some(idx);
        }
    }

    let best_idx = best.ok_or_else(|| ChurnError::Training("empty parameter grid".to_string()))?;
    let best_config = grid_results[best_idx].config.clone();
    info!(
        "Best forest config: trees={} depth={} features={} (CV accuracy {:.4})",
        best_config.n_estimators,
        best_config.max_depth,
        best_config.max_features,
        grid_results[best_idx].mean_accuracy
    );

    let forest = RandomForest::fit(&split.x_train, &split.y_train, &best_config)?;
    info!("Random forest refitted on full training split");

    Ok(TrainedModels {
        logistic,
        forest,
        grid_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Split where feature 0 separates the classes with a little overlap.
    fn synthetic_split(n_train: usize, n_test: usize) -> TrainTestSplit {
        let make = |n: usize, offset: u64| {
            let mut data = Vec::new();
            let mut labels = Vec::new();
            for i in 0..n {
                let label = usize::from(i % 2 == 1);
                let jitter = ((i as u64 * 7 + offset) % 10) as f64 / 10.0;
                data.push(label as f64 * 10.0 + jitter);
                data.push(jitter - 0.5);
                labels.push(label);
            }
            (
                Array2::from_shape_vec((n, 2), data).unwrap(),
                Array1::from_vec(labels),
            )
        };
        let (x_train, y_train) = make(n_train, 0);
        let (x_test, y_test) = make(n_test, 3);
        TrainTestSplit {
            x_train,
            x_test,
            y_train,
            y_test,
        }
    }

    fn test_pipeline_config() -> PipelineConfig {
        PipelineConfig {
            seed: 42,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_train_models_end_to_end() {
        let split = synthetic_split(40, 12);
        let models = train_models(&split, &test_pipeline_config()).unwrap();

        assert_eq!(models.grid_results.len(), 8);
        assert!(models
            .grid_results
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.mean_accuracy)));

        // Both models should learn the separable feature.
        let forest_preds = models.forest.predict(&split.x_test).unwrap();
        assert!(accuracy(&split.y_test, &forest_preds) > 0.9);

        let logistic_preds = models.logistic.predict(&split.x_test);
        assert!(accuracy(&split.y_test, &logistic_preds) > 0.9);
    }

    #[test]
    fn test_training_is_deterministic() {
        let split = synthetic_split(40, 12);
        let config = test_pipeline_config();

        let first = train_models(&split, &config).unwrap();
        let second = train_models(&split, &config).unwrap();

        assert_eq!(first.forest, second.forest);
        for (a, b) in first.grid_results.iter().zip(second.grid_results.iter()) {
            assert_eq!(a.mean_accuracy, b.mean_accuracy);
            assert_eq!(a.config, b.config);
        }
        assert_eq!(
            first.logistic.params().to_vec(),
            second.logistic.params().to_vec()
        );
    }

    #[test]
    fn test_empty_matrix_is_training_error() {
        let split = TrainTestSplit {
            x_train: Array2::zeros((0, 2)),
            x_test: Array2::zeros((0, 2)),
            y_train: Array1::zeros(0),
            y_test: Array1::zeros(0),
        };
        let result = train_models(&split, &test_pipeline_config());
        assert!(matches!(result, Err(ChurnError::Training(_))));
    }

    #[test]
    fn test_non_finite_matrix_is_training_error() {
        let mut split = synthetic_split(20, 6);
        split.x_train[[0, 0]] = f64::NAN;
        let result = train_models(&split, &test_pipeline_config());
        assert!(matches!(result, Err(ChurnError::Training(_))));
    }

    #[test]
    fn test_cross_validate_bounds() {
        let split = synthetic_split(30, 5);
        let config = ForestConfig {
            n_estimators: 5,
            ..ForestConfig::default()
        };
        let score = cross_validate(&split.x_train, &split.y_train, &config, 5, 42).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }
}
