//! ChurnForge: a Rust CLI pipeline for bank customer churn prediction
//!
//! This library loads a customer CSV, derives the churn label, target-encodes
//! categorical columns, renders EDA plots, trains a logistic-regression and a
//! random-forest classifier, and exports evaluation artifacts.

pub mod cli;
pub mod config;
pub mod data;
pub mod eda;
pub mod error;
pub mod eval;
pub mod features;
pub mod forest;
pub mod model;
pub mod pipeline;

// Re-export public items for easier access
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::load_customer_data;
pub use error::ChurnError;
pub use features::{
    build_feature_matrix, derive_label, encode_categoricals, train_test_split, FeatureMatrix,
    TrainTestSplit,
};
pub use forest::{ForestConfig, MaxFeatures, RandomForest};
pub use model::{train_models, TrainedModels};
pub use pipeline::run_pipeline;

/// Common result type used throughout the application
pub type Result<T> = std::result::Result<T, ChurnError>;
