//! Model evaluation and artifact export
//!
//! Classification reports, the combined ROC plot, the forest feature
//! importance plot, and JSON model serialization. Every artifact write is
//! independent: a failure is logged and the remaining artifacts are still
//! attempted.

use std::fmt;
use std::path::{Path, PathBuf};

use linfa::prelude::*;
use ndarray::Array1;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::ChurnError;
use crate::features::TrainTestSplit;
use crate::model::TrainedModels;

/// Precision/recall/F1 for a single class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class metrics plus overall accuracy for one prediction set.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Metrics for class 0 and class 1, in that order
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
}

impl ClassificationReport {
    pub fn compute(truth: &Array1<usize>, predictions: &Array1<usize>) -> Self {
        let n = truth.len();
        let mut classes = [ClassMetrics {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            support: 0,
        }; 2];

        let mut correct_total = 0usize;
        for class in 0..2 {
            let mut tp = 0usize;
            let mut predicted = 0usize;
            let mut actual = 0usize;
            for (&t, &p) in truth.iter().zip(predictions.iter()) {
                if p == class {
                    predicted += 1;
                }
                if t == class {
                    actual += 1;
                    if p == class {
                        tp += 1;
                    }
                }
            }
            if class == 0 {
                correct_total = truth
                    .iter()
                    .zip(predictions.iter())
                    .filter(|(t, p)| t == p)
                    .count();
            }

            let precision = if predicted > 0 {
                tp as f64 / predicted as f64
            } else {
                0.0
            };
            let recall = if actual > 0 { tp as f64 / actual as f64 } else { 0.0 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            classes[class] = ClassMetrics {
                precision,
                recall,
                f1,
                support: actual,
            };
        }

        let accuracy = if n > 0 {
            correct_total as f64 / n as f64
        } else {
            0.0
        };

        Self { classes, accuracy }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>12} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for (class, metrics) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                class, metrics.precision, metrics.recall, metrics.f1, metrics.support
            )?;
        }
        writeln!(f)?;
        let total: usize = self.classes.iter().map(|m| m.support).sum();
        writeln!(f, "{:>12} {:>9} {:>9} {:>9.4} {:>9}", "accuracy", "", "", self.accuracy, total)
    }
}

/// ROC curve points (FPR, TPR) with the area under the curve.
#[derive(Debug, Clone)]
pub struct RocCurve {
    pub points: Vec<(f64, f64)>,
    pub auc: f64,
}

impl RocCurve {
    /// Sweep thresholds over the scores from high to low, accumulating
    /// true/false positive rates. Tied scores move the curve in one step.
    pub fn compute(truth: &Array1<usize>, scores: &Array1<f64>) -> Self {
        let positives = truth.iter().filter(|&&t| t == 1).count();
        let negatives = truth.len() - positives;

        let mut order: Vec<usize> = (0..truth.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut points = vec![(0.0, 0.0)];
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut idx = 0;
        while idx < order.len() {
            // Consume all samples sharing this score before emitting a point.
            let score = scores[order[idx]];
            while idx < order.len() && scores[order[idx]] == score {
                if truth[order[idx]] == 1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
                idx += 1;
            }
            points.push((
                fp as f64 / negatives.max(1) as f64,
                tp as f64 / positives.max(1) as f64,
            ));
        }
        if *points.last().unwrap() != (1.0, 1.0) {
            points.push((1.0, 1.0));
        }

        // Trapezoidal AUC
        let mut auc = 0.0;
        for pair in points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            auc += (x1 - x0) * (y0 + y1) / 2.0;
        }

        Self { points, auc }
    }
}

/// On-disk form of the fitted logistic regression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModelArtifact {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub feature_names: Vec<String>,
}

/// Outcome of the export stage.
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl ExportSummary {
    fn record(&mut self, path: PathBuf, result: anyhow::Result<()>) {
        match result {
            Ok(()) => {
                info!("Artifact written: {}", path.display());
                self.written.push(path);
            }
            Err(e) => {
                let err = ChurnError::Artifact {
                    path: path.clone(),
                    reason: format!("{e:#}"),
                };
                warn!("{err}");
                self.failed.push(path);
            }
        }
    }
}

/// Evaluate both models and write all result artifacts.
pub fn export_artifacts(
    models: &TrainedModels,
    split: &TrainTestSplit,
    feature_names: &[String],
    config: &PipelineConfig,
) -> crate::Result<ExportSummary> {
    for dir in [&config.results_dir, &config.models_dir] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("could not create output directory {}: {e}", dir.display());
        }
    }

    let lr_train_preds = models.logistic.predict(&split.x_train);
    let lr_test_preds = models.logistic.predict(&split.x_test);
    let lr_test_scores = models.logistic.predict_probabilities(&split.x_test);

    let rf_train_preds = models.forest.predict(&split.x_train)?;
    let rf_test_preds = models.forest.predict(&split.x_test)?;
    let rf_test_scores = models.forest.predict_proba(&split.x_test)?;

    let mut summary = ExportSummary::default();

    // Classification reports, one text file per model.
    let lr_report_path = config.results_dir.join("logistic_classification_report.txt");
    summary.record(
        lr_report_path.clone(),
        write_report(
            &lr_report_path,
            "Logistic Regression",
            &ClassificationReport::compute(&split.y_train, &lr_train_preds),
            &ClassificationReport::compute(&split.y_test, &lr_test_preds),
        ),
    );

    let rf_report_path = config.results_dir.join("rf_classification_report.txt");
    summary.record(
        rf_report_path.clone(),
        write_report(
            &rf_report_path,
            "Random Forest",
            &ClassificationReport::compute(&split.y_train, &rf_train_preds),
            &ClassificationReport::compute(&split.y_test, &rf_test_preds),
        ),
    );

    // Combined ROC plot over the test split.
    let lr_roc = RocCurve::compute(&split.y_test, &lr_test_scores);
    let rf_roc = RocCurve::compute(&split.y_test, &rf_test_scores);
    info!(
        "Test AUC: logistic {:.4}, random forest {:.4}",
        lr_roc.auc, rf_roc.auc
    );
    let roc_path = config.results_dir.join("roc_curves.png");
    summary.record(roc_path.clone(), plot_roc_curves(&roc_path, &lr_roc, &rf_roc));

    // Forest feature importances.
    let importance_path = config.results_dir.join("feature_importances.png");
    summary.record(
        importance_path.clone(),
        plot_feature_importances(
            &importance_path,
            feature_names,
            models.forest.feature_importances(),
        ),
    );

    // Serialized models.
    let lr_model_path = config.models_dir.join("logistic_model.json");
    let artifact = LogisticModelArtifact {
        intercept: models.logistic.intercept(),
        coefficients: models.logistic.params().to_vec(),
        feature_names: feature_names.to_vec(),
    };
    summary.record(
        lr_model_path.clone(),
        write_json(&lr_model_path, &artifact),
    );

    let rf_model_path = config.models_dir.join("rfc_model.json");
    summary.record(
        rf_model_path.clone(),
        write_json(&rf_model_path, &models.forest),
    );

    info!(
        "Export complete: {} written, {} failed",
        summary.written.len(),
        summary.failed.len()
    );

    Ok(summary)
}

fn write_report(
    path: &Path,
    model_name: &str,
    train: &ClassificationReport,
    test: &ClassificationReport,
) -> anyhow::Result<()> {
    let content = format!("{model_name} Train\n{train}\n{model_name} Test\n{test}");
    std::fs::write(path, content)?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn plot_roc_curves(path: &Path, lr: &RocCurve, rf: &RocCurve) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("ROC Curves (test set)", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..1f64, 0f64..1f64)?;

    chart
        .configure_mesh()
        .x_desc("False positive rate")
        .y_desc("True positive rate")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart
        .draw_series(LineSeries::new(lr.points.iter().copied(), &BLUE))?
        .label(format!("Logistic Regression (AUC {:.3})", lr.auc))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .draw_series(LineSeries::new(rf.points.iter().copied(), &RED))?
        .label(format!("Random Forest (AUC {:.3})", rf.auc))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    // Chance diagonal
    chart.draw_series(LineSeries::new(
        [(0.0, 0.0), (1.0, 1.0)],
        BLACK.mix(0.4),
    ))?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn plot_feature_importances(
    path: &Path,
    feature_names: &[String],
    importances: &[f64],
) -> anyhow::Result<()> {
    if feature_names.len() != importances.len() {
        anyhow::bail!(
            "feature name count {} does not match importance count {}",
            feature_names.len(),
            importances.len()
        );
    }

    let mut ranked: Vec<(&String, f64)> = feature_names.iter().zip(importances.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let max_importance = ranked.first().map(|(_, v)| *v).unwrap_or(0.0).max(1e-9);
    let n = ranked.len();

    let root = BitMapBackend::new(path, (1200, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let names: Vec<String> = ranked.iter().map(|(name, _)| (*name).clone()).collect();
    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Importance", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(160)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..n as f64 - 0.5, 0f64..max_importance * 1.1)?;

    chart
        .configure_mesh()
        .y_desc("Importance")
        .x_labels(n)
        .x_label_formatter(&move |x| {
            let idx = x.round() as isize;
            if idx >= 0 && (idx as usize) < names.len() {
                names[idx as usize].clone()
            } else {
                String::new()
            }
        })
        .x_label_style(
            ("sans-serif", 11)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (idx, (_, importance)) in ranked.iter().enumerate() {
        chart.draw_series(std::iter::once(Rectangle::new(
            [(idx as f64 - 0.35, 0.0), (idx as f64 + 0.35, *importance)],
            BLUE.filled(),
        )))?;
    }

    root.present()?;
    Ok(())
}
