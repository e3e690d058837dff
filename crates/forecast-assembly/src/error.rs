//! Error types for the assembly crate.

use std::path::PathBuf;

use forecast_dataset::DatasetError;
use grib2_parser::Grib2Error;
use thiserror::Error;

/// Errors that can occur while assembling a forecast cycle.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("No field matching '{variable}' in {path}")]
    VariableNotFound { variable: String, path: PathBuf },

    #[error("{count} fields match '{variable}' in {path}, expected exactly one")]
    AmbiguousVariable {
        variable: String,
        path: PathBuf,
        count: usize,
    },

    #[error("Inconsistent record count for '{variable}': {detail}")]
    InconsistentRecordCount { variable: String, detail: String },

    #[error("Grid shape mismatch for '{variable}' in {path}: expected {expected:?}, found {actual:?}")]
    GridShapeMismatch {
        variable: String,
        path: PathBuf,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Reference time of {path} is {actual}, cycle is {expected}")]
    ReferenceTimeMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("No source files for variable '{0}'")]
    NoSourceFiles(String),

    #[error("Required variable '{variable}' failed: {source}")]
    RequiredVariableFailed {
        variable: String,
        #[source]
        source: Box<AssemblyError>,
    },

    #[error("Failed to parse GRIB2 data in {path}: {source}")]
    Grib2 {
        path: PathBuf,
        #[source]
        source: Grib2Error,
    },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),
}

impl AssemblyError {
    pub(crate) fn inconsistent(variable: &str, detail: impl Into<String>) -> Self {
        Self::InconsistentRecordCount {
            variable: variable.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for assembly operations.
pub type Result<T> = std::result::Result<T, AssemblyError>;
