//! Deterministic random forest classifier
//!
//! CART trees with Gini impurity, bootstrap sampling and per-node feature
//! subsampling. Every source of randomness is derived from the forest seed,
//! so the same data and config always produce the same trees, and ties
//! between equal-gain splits resolve by fixed feature/threshold order.

use std::cmp::Ordering;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ChurnError;

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// floor(sqrt(n_features)), minimum 1
    Sqrt,
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::All => n_features,
        }
    }
}

impl std::fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::All => write!(f, "all"),
        }
    }
}

/// Training parameters for the forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 8,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
        }
    }
}

/// Flat tree node; internal nodes carry a split, leaves carry the
/// positive-class fraction of their training samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TreeNode {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
    value: Option<f64>,
}

/// A single CART tree stored as a flat node vector, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            match node.value {
                Some(value) => return value,
                None => {
                    idx = if row[node.feature] <= node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                }
            }
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Bagged ensemble of CART trees with averaged leaf probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub config: ForestConfig,
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Gini impurity of a binary node from positive count and total.
fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<usize>,
    config: &'a ForestConfig,
    features_per_split: usize,
}

impl TreeBuilder<'_> {
    fn build(
        &self,
        indices: &[usize],
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> DecisionTree {
        let mut nodes = Vec::new();
        self.build_node(indices, 0, &mut nodes, rng, importances);
        DecisionTree { nodes }
    }

    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<TreeNode>,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> usize {
        let current = nodes.len();
        let positives: usize = indices.iter().map(|&i| self.y[i]).sum();
        let impurity = gini(positives, indices.len());
        let leaf_value = positives as f64 / indices.len().max(1) as f64;

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || impurity == 0.0
        {
            nodes.push(leaf(leaf_value));
            return current;
        }

        let split = match self.find_best_split(indices, impurity, rng) {
            Some(s) => s,
            None => {
                nodes.push(leaf(leaf_value));
                return current;
            }
        };

        let (left_indices, right_indices) = partition(self.x, indices, split.feature, split.threshold);
        if left_indices.is_empty() || right_indices.is_empty() {
            nodes.push(leaf(leaf_value));
            return current;
        }

        // Importance: impurity decrease weighted by node sample count.
        importances[split.feature] += indices.len() as f64 * split.gain;

        // Reserve the slot, then patch children in after recursion.
        nodes.push(TreeNode {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
            value: None,
        });

        let left = self.build_node(&left_indices, depth + 1, nodes, rng, importances);
        let right = self.build_node(&right_indices, depth + 1, nodes, rng, importances);
        nodes[current].left = left;
        nodes[current].right = right;

        current
    }

    fn find_best_split(
        &self,
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let mut pool: Vec<usize> = (0..n_features).collect();
        pool.shuffle(rng);
        pool.truncate(self.features_per_split);
        // Evaluate in ascending feature order so equal gains resolve the
        // same way regardless of the shuffle.
        pool.sort_unstable();

        let n = indices.len();
        let mut best: Option<SplitCandidate> = None;

        for &feature in &pool {
            let mut pairs: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (self.x[[i, feature]], self.y[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            let mut left_positives = 0usize;
            let total_positives: usize = pairs.iter().map(|p| p.1).sum();

            for i in 0..n - 1 {
                left_positives += pairs[i].1;
                if pairs[i].0 == pairs[i + 1].0 {
                    continue;
                }

                let n_left = i + 1;
                let n_right = n - n_left;
                let weighted = (n_left as f64 * gini(left_positives, n_left)
                    + n_right as f64 * gini(total_positives - left_positives, n_right))
                    / n as f64;
                let gain = parent_impurity - weighted;

                let better = match best {
                    None => gain > 1e-12,
                    Some(ref b) => gain > b.gain + 1e-12,
                };
                if better {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (pairs[i].0 + pairs[i + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

fn leaf(value: f64) -> TreeNode {
    TreeNode {
        feature: 0,
        threshold: 0.0,
        left: 0,
        right: 0,
        value: Some(value),
    }
}

fn partition(
    x: &Array2<f64>,
    indices: &[usize],
    feature: usize,
    threshold: f64,
) -> (Vec<usize>, Vec<usize>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for &i in indices {
        if x[[i, feature]] <= threshold {
            left.push(i);
        } else {
            right.push(i);
        }
    }
    (left, right)
}

impl RandomForest {
    /// Fit a forest on a binary-labelled feature matrix.
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<usize>,
        config: &ForestConfig,
    ) -> crate::Result<Self> {
        let n_rows = x.nrows();
        let n_features = x.ncols();

        if n_rows == 0 || n_features == 0 {
            return Err(ChurnError::Training("empty feature matrix".to_string()));
        }
        if y.len() != n_rows {
            return Err(ChurnError::Training(format!(
                "label count {} does not match row count {n_rows}",
                y.len()
            )));
        }
        if y.iter().any(|&label| label > 1) {
            return Err(ChurnError::Training(
                "labels must be binary (0 or 1)".to_string(),
            ));
        }

        let builder = TreeBuilder {
            x,
            y,
            config,
            features_per_split: config.max_features.resolve(n_features),
        };

        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut importances = vec![0.0; n_features];

        for tree_idx in 0..config.n_estimators {
            // One independent, reproducible RNG stream per tree.
            let mut rng = StdRng::seed_from_u64(
                config
                    .seed
                    .wrapping_add((tree_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            );
            let bootstrap: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
            trees.push(builder.build(&bootstrap, &mut rng, &mut importances));
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for value in importances.iter_mut() {
                *value /= total;
            }
        }

        Ok(Self {
            config: config.clone(),
            trees,
            n_features,
            feature_importances: importances,
        })
    }

    /// Mean positive-class probability over all trees, one value per row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> crate::Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(ChurnError::Training(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        let mut probs = Array1::zeros(x.nrows());
        for (row_idx, row) in x.outer_iter().enumerate() {
            let row: Vec<f64> = row.to_vec();
            let sum: f64 = self.trees.iter().map(|t| t.predict_row(&row)).sum();
            probs[row_idx] = sum / self.trees.len() as f64;
        }
        Ok(probs)
    }

    /// Majority-vote class predictions.
    pub fn predict(&self, x: &Array2<f64>) -> crate::Result<Array1<usize>> {
        let probs = self.predict_proba(x)?;
        Ok(probs.mapv(|p| usize::from(p >= 0.5)))
    }

    /// Normalized impurity-decrease importances, one per feature.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Number of fitted trees.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 40 rows where feature 0 separates the classes perfectly and
    /// feature 1 is constant noise.
    fn separable_data() -> (Array2<f64>, Array1<usize>) {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let label = usize::from(i >= 20);
            data.push(if label == 0 { i as f64 } else { 100.0 + i as f64 });
            data.push(5.0);
            labels.push(label);
        }
        (
            Array2::from_shape_vec((40, 2), data).unwrap(),
            Array1::from_vec(labels),
        )
    }

    fn test_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 10,
            max_depth: 4,
            min_samples_split: 2,
            max_features: MaxFeatures::All,
            seed: 42,
        }
    }

    #[test]
    fn test_fit_and_predict_separable() {
        let (x, y) = separable_data();
        let forest = RandomForest::fit(&x, &y, &test_config()).unwrap();

        let preds = forest.predict(&x).unwrap();
        assert_eq!(preds, y);

        let probs = forest.predict_proba(&x).unwrap();
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = separable_data();
        let first = RandomForest::fit(&x, &y, &test_config()).unwrap();
        let second = RandomForest::fit(&x, &y, &test_config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_seeds_differ() {
        let (x, y) = separable_data();
        let mut other = test_config();
        other.seed = 7;
        let first = RandomForest::fit(&x, &y, &test_config()).unwrap();
        let second = RandomForest::fit(&x, &y, &other).unwrap();
        // Bootstrap samples differ, so the trees should too.
        assert_ne!(first.trees, second.trees);
    }

    #[test]
    fn test_importances_favor_informative_feature() {
        let (x, y) = separable_data();
        let forest = RandomForest::fit(&x, &y, &test_config()).unwrap();

        let importances = forest.feature_importances();
        assert_eq!(importances.len(), 2);
        let total: f64 = importances.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_empty_matrix_is_training_error() {
        let x = Array2::<f64>::zeros((0, 3));
        let y = Array1::<usize>::zeros(0);
        let result = RandomForest::fit(&x, &y, &test_config());
        assert!(matches!(result, Err(ChurnError::Training(_))));
    }

    #[test]
    fn test_nonbinary_labels_rejected() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = Array1::from_vec(vec![0usize, 1, 2]);
        let result = RandomForest::fit(&x, &y, &test_config());
        assert!(matches!(result, Err(ChurnError::Training(_))));
    }

    #[test]
    fn test_serialization_round_trip() {
        let (x, y) = separable_data();
        let forest = RandomForest::fit(&x, &y, &test_config()).unwrap();

        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        assert_eq!(forest, restored);
    }
}
