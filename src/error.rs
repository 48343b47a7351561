//! Typed failures of the pipeline's collaborators.
//!
//! Source and sink failures are kept apart from each other and from the
//! "nothing in the window" outcome, which is not an error at all.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while reading the raw table.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to open archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("No CSV files found in {0}")]
    NoCsvFiles(PathBuf),

    #[error("Failed to parse {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} has {columns} columns but column {required} is required")]
    LayoutMismatch {
        file: String,
        columns: usize,
        required: usize,
    },
}

/// Failure while replacing the target sheet.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Sink rejected the write with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
