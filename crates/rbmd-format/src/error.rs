//! Error types for rbmd-format.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Md(#[from] rbmd_md::MdError),
}

impl FormatError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FormatError::InvalidConfiguration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
