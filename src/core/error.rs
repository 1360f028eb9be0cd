//! Error types for the photo download tool
//!
//! This module defines the error types used throughout the download pipeline.
//! Transport faults never surface here: a dead worker channel is treated as
//! "peer gone" by the transport itself.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the photo download tool
#[derive(Error, Debug)]
pub enum DownloadError {
    /// General I/O error
    #[error("IO error: {0}")]
    Io(String),

    /// The sequences state could not be written; numbers may repeat on next run
    #[error("Cannot save persistent sequences number to '{}': {message}", path.display())]
    SequencesSave { path: PathBuf, message: String },

    /// The custom naming templates could not be written
    #[error("Cannot save naming templates to '{}': {message}", path.display())]
    TemplatesSave { path: PathBuf, message: String },

    /// A template contains a token that is not allowed for its kind
    #[error("Token '{token}' is not allowed in template '{template}'")]
    InvalidTemplate { template: String, token: String },

    /// A builtin template cannot be modified or deleted
    #[error("Template '{0}' is builtin and cannot be modified")]
    BuiltinTemplate(String),

    /// No template is registered under this key
    #[error("Unknown naming template: {0}")]
    UnknownTemplate(String),

    /// The external metadata tool failed
    #[error("ExifTool error: {0}")]
    ExifTool(String),

    /// The previously-downloaded database failed
    #[error("Database error: {0}")]
    Database(String),

    /// A worker could not be started or stopped
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DownloadError>;

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for DownloadError {
    fn from(err: rusqlite::Error) -> Self {
        DownloadError::Database(err.to_string())
    }
}
