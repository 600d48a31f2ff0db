//! Error Handling Module
//!
//! Defines the error type shared by the dataset readers, the model builders
//! and the training driver. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for ts_centerloss operations
#[derive(Error, Debug)]
pub enum TscError {
    /// Malformed archive file
    #[error("Failed to parse '{path}' at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while saving or loading module weights
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for TscError {
    fn from(err: serde_json::Error) -> Self {
        TscError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for TscError {
    fn from(err: csv::Error) -> Self {
        TscError::Serialization(err.to_string())
    }
}

impl From<burn::record::RecorderError> for TscError {
    fn from(err: burn::record::RecorderError) -> Self {
        TscError::Checkpoint(format!("{:?}", err))
    }
}

/// Convenience Result type for ts_centerloss operations
pub type Result<T> = std::result::Result<T, TscError>;
