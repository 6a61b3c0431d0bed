//! Centralized error types for mailindexer.
//!
//! Soft decoding failures have their own type in [`crate::decode::DecodeError`];
//! they are logged and degraded, never surfaced through [`IngestError`].

use std::path::PathBuf;
use thiserror::Error;

/// All hard errors produced by the mailindexer library.
#[derive(Error, Debug)]
pub enum IngestError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified input file does not exist.
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    /// The envelope of a message could not be parsed.
    #[error("Could not parse message envelope: {0}")]
    Parse(String),

    /// Writing an attachment into the content-addressed store failed.
    ///
    /// `path` is the destination the attachment was meant to be published at.
    #[error("Could not store attachment '{path}': {source}")]
    Store {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Walking an input directory failed.
    #[error("Could not walk input tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// The HTTP transport to the index failed.
    #[error("Index transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The index answered with an error status.
    #[error("Index rejected request ({status}): {reason}")]
    Index { status: u16, reason: String },

    /// A document could not be serialized.
    #[error("Could not serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, IngestError>`.
pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Store` variant for the intended destination `path`.
    pub fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `IngestError::io`).
impl From<std::io::Error> for IngestError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
