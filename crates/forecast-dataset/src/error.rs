//! Error types for dataset construction and serialization.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, writing or reading a dataset.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Two variables disagree on the values of an axis they share.
    #[error("coordinate conflict on axis '{axis}': {detail}")]
    CoordinateConflict { axis: String, detail: String },

    /// Array shape does not match the declared dimensions or coordinates.
    #[error("dimension mismatch in '{name}': {detail}")]
    DimensionMismatch { name: String, detail: String },

    /// The same variable was added twice.
    #[error("variable '{0}' is already present in the dataset")]
    DuplicateVariable(String),

    /// No variables were merged.
    #[error("dataset has no variables")]
    Empty,

    /// Writing the output store failed; the partial output was removed.
    #[error("failed to serialize dataset to {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },

    /// Reading a stored dataset failed.
    #[error("failed to read dataset: {0}")]
    ReadFailed(String),

    /// Stored metadata is missing or malformed.
    #[error("invalid dataset metadata: {0}")]
    InvalidMetadata(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    pub fn coordinate_conflict(axis: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CoordinateConflict {
            axis: axis.into(),
            detail: detail.into(),
        }
    }

    pub fn dimension_mismatch(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn serialization(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Serialization {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read_failed(msg: impl ToString) -> Self {
        Self::ReadFailed(msg.to_string())
    }

    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;
