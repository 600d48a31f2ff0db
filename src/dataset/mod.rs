//! Dataset module for UEA/UCR time-series archives
//!
//! This module provides functionality for:
//! - Reading archive splits in the sktime `.ts` format and the UCR `.tsv` format
//! - Encoding string class labels into contiguous indices
//! - Burn `Dataset` / `Batcher` implementations feeding the training loops
//!
//! ## Archive Layout
//!
//! Splits are looked up as `{data_dir}/{name}/{name}_TRAIN.ts` and
//! `{data_dir}/{name}/{name}_TEST.ts`, falling back to `.tsv` files and to a
//! recursive search below `data_dir`.

pub mod burn_dataset;
pub mod label_encoder;
pub mod loader;

// Re-export main types for convenience
pub use burn_dataset::{TimeSeriesBatch, TimeSeriesBatcher, TimeSeriesDataset, TimeSeriesItem};
pub use label_encoder::LabelEncoder;
pub use loader::{read_uea, RawSplit, Split, SplitStats, TimeSeriesSample};

/// Series longer than this are trained with [`LONG_SERIES_BATCH_SIZE`]
pub const LONG_SERIES_THRESHOLD: usize = 2048;

/// Batch size used for very long series
pub const LONG_SERIES_BATCH_SIZE: usize = 32;

/// The UEA multivariate archive problems, indexed by dataset id
pub const UEA_DATASETS: [&str; 30] = [
    "ArticularyWordRecognition",
    "AtrialFibrillation",
    "BasicMotions",
    "CharacterTrajectories",
    "Cricket",
    "DuckDuckGeese",
    "EigenWorms",
    "Epilepsy",
    "ERing",
    "EthanolConcentration",
    "FaceDetection",
    "FingerMovements",
    "HandMovementDirection",
    "Handwriting",
    "Heartbeat",
    "InsectWingbeat",
    "JapaneseVowels",
    "Libras",
    "LSST",
    "MotorImagery",
    "NATOPS",
    "PEMS-SF",
    "PenDigits",
    "PhonemeSpectra",
    "RacketSports",
    "SelfRegulationSCP1",
    "SelfRegulationSCP2",
    "SpokenArabicDigits",
    "StandWalkJump",
    "UWaveGestureLibrary",
];

/// Get the dataset name for a given dataset id
pub fn dataset_name(id: usize) -> Option<&'static str> {
    UEA_DATASETS.get(id).copied()
}

/// Get the dataset id for a given dataset name (case-insensitive)
pub fn dataset_id(name: &str) -> Option<usize> {
    UEA_DATASETS
        .iter()
        .position(|n| n.eq_ignore_ascii_case(name))
}

/// Batch size actually used for a series length
pub fn effective_batch_size(requested: usize, series_length: usize) -> usize {
    if series_length > LONG_SERIES_THRESHOLD {
        LONG_SERIES_BATCH_SIZE
    } else {
        requested
    }
}
