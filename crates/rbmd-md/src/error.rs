//! Error types for rbmd-md.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MdError {
    /// Invalid setup: potential parameters, cutoff, input data. Raised before
    /// any step executes.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// NaN/Inf or runaway energy detected after a step. The simulation state
    /// has been restored to the last good step.
    #[error("numerical instability at step {step}: {detail}")]
    NumericalInstability { step: u64, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure of a periodic output stream.
    #[error("output error on {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MdError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        MdError::Configuration(msg.into())
    }

    pub(crate) fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MdError::Output {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MdError>;
