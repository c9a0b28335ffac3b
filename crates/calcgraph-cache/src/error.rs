//! Cache backend error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by cache backends and blob codecs.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A filesystem operation failed.
    #[error("cache {operation} failed at {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No cached value exists for the node.
    #[error("no cached value for '{node}'")]
    Missing { node: String },

    /// A sidecar names a format no registered codec handles.
    #[error("no codec registered for format '{format}' required by '{node}'")]
    UnknownFormat { node: String, format: String },

    /// Value encoding or decoding failed.
    #[error("value serialization failed")]
    Serialize(#[from] serde_json::Error),

    /// Stored bytes do not decode under the recorded format.
    #[error("stored data for '{node}' is corrupt: {reason}")]
    Corrupt { node: String, reason: String },
}

impl CacheError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
