//! Image loading and saving error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a decoding collaborator.
///
/// These never leave a worker thread: tasks turn them into an empty result.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported image format: {path}")]
    Unsupported { path: PathBuf },

    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("loading was cancelled")]
    Cancelled,
}

impl LoadError {
    /// Creates decode error.
    #[must_use]
    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates unsupported format error.
    #[must_use]
    pub fn unsupported(path: impl Into<PathBuf>) -> Self {
        Self::Unsupported { path: path.into() }
    }

    /// Creates io error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns whether the error only reflects a cancellation request.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure reported by an encoding collaborator.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("unknown output format: {0}")]
    UnknownFormat(String),

    #[error("nothing to save: image is empty")]
    EmptyImage,

    #[error("failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("saving was cancelled")]
    Cancelled,
}
