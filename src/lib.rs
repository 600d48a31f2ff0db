//! # ts_centerloss
//!
//! Multivariate time-series classification with deep networks, trained in
//! two phases: cross-entropy from scratch, then fine-tuning with an added
//! center loss that pulls embeddings toward learnable class centroids.
//!
//! ## Modules
//!
//! - `dataset`: UEA/UCR archive readers, label encoding and Burn batching
//! - `model`: FCN, ResNet, InceptionTime, OS-CNN and the RNN-FCN family
//! - `training`: Training loops, center loss, plateau scheduling and the experiment driver
//! - `utils`: Logging, errors and formatting helpers
//! - `backend`: Backend selection by cargo feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ts_centerloss::backend::{default_device, TrainingBackend};
//! use ts_centerloss::{run_experiment, ExperimentConfig};
//!
//! let config = ExperimentConfig {
//!     dataset: Some("BasicMotions".to_string()),
//!     model_name: "FCN".to_string(),
//!     ..Default::default()
//! };
//! let summary = run_experiment::<TrainingBackend>(&config, &default_device())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    read_uea, LabelEncoder, RawSplit, Split, TimeSeriesBatch, TimeSeriesBatcher,
    TimeSeriesDataset, TimeSeriesItem, UEA_DATASETS,
};
pub use model::{
    ClassifierOutput, ExperimentConfig, InputShape, ModelKind, ModelVisitor, TimeSeriesClassifier,
};
pub use training::center_loss::{CenterLoss, CenterLossConfig};
pub use training::experiment::{evaluate_checkpoint, run_experiment, ExperimentSummary};
pub use training::scheduler::{PlateauConfig, ReduceOnPlateau};
pub use utils::error::{Result, TscError};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
