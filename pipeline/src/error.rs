//! Error types for the calibration pipeline

use ccdcal_imaging::{FitsError, ReduceError};
use std::path::PathBuf;

use crate::matching::MatchError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read or write FITS file {path}: {source}")]
    Fits {
        path: PathBuf,
        #[source]
        source: FitsError,
    },

    #[error("Failed to calibrate {file_name}: {source}")]
    Reduce {
        file_name: String,
        #[source]
        source: ReduceError,
    },

    #[error("No dark frame for {file_name}: {source}")]
    DarkMatch {
        file_name: String,
        #[source]
        source: MatchError,
    },

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("No combined flat for filter '{filter}'")]
    MissingFlat { filter: String },

    #[error("Recipe requires bias subtraction but no combined bias was found")]
    MissingBias,

    #[error("{file_name} has no {keyword} keyword")]
    MissingKeyword { file_name: String, keyword: String },

    #[error("Failed to write comparison image {path}: {message}")]
    Preview { path: PathBuf, message: String },

    #[error("Invalid recipe: {0}")]
    Recipe(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
