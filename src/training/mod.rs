//! Training module for the two-phase classification experiments
//!
//! This module provides:
//! - Supervised epochs with cross-entropy, with and without the center loss
//! - The learnable class centroids of the center loss
//! - Reduce-on-plateau learning rate scheduling
//! - The experiment driver that checkpoints and writes the result reports
//!
//! ## Two-Phase Approach
//!
//! 1. Train from scratch with cross-entropy, checkpointing whenever the
//!    training loss improves
//! 2. Restart Adam at a lower learning rate and fine-tune with
//!    `cross_entropy + weight * center_loss`, checkpointing only in the
//!    second half of the phase

pub mod center_loss;
pub mod experiment;
pub mod report;
pub mod scheduler;
pub mod supervised;

// Re-export main types for convenience
pub use center_loss::{CenterLoss, CenterLossConfig};
pub use experiment::{
    evaluate_checkpoint, load_experiment_data, run_experiment, ExperimentData, ExperimentPaths,
    ExperimentSummary, PhaseResult,
};
pub use report::{read_results_csv, write_config_json, write_results_csv, ResultRow};
pub use scheduler::{PlateauConfig, PlateauMode, ReduceOnPlateau};
pub use supervised::{
    evaluate, train_epoch, train_epoch_with_center_loss, BatchLoader, CenterLossEpochMetrics,
    EpochMetrics,
};
