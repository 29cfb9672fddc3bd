//! Error types for ephys-core.

use crate::store::Dtype;
use thiserror::Error;

/// Error type for chunking, recording and store operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Read of samples {start}..{end} exceeds source length {len}")]
    SourceBounds { start: usize, end: usize, len: usize },

    #[error("Write to '{path}' failed: {source}")]
    OutputWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Dtype mismatch on '{path}': expected {expected}, found {found}")]
    DtypeMismatch {
        path: String,
        expected: Dtype,
        found: Dtype,
    },

    #[error("Shape mismatch on '{path}': {detail}")]
    ShapeMismatch { path: String, detail: String },

    #[error("Missing attribute '{key}' on '{path}'")]
    MissingAttribute { path: String, key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub(crate) fn shape(path: &str, detail: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            path: path.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn write(path: &str, source: std::io::Error) -> Self {
        Error::OutputWrite {
            path: path.to_string(),
            source,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
