//! Error types for cs-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cs-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tabular file extension we have no reader for
    #[error("unsupported tabular format '{extension}' for '{path}' (expected .csv or .tsv)")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// Structurally invalid tabular data
    #[error("failed to parse table '{path}': {message}")]
    TableParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A per-code rule names a code that has not been introduced yet
    #[error("parse error at line {line}: unknown code '{code}' referenced")]
    UnknownCode { line: usize, code: String },

    /// Rewriting the file would drop entities that follow the CodeSystem
    #[error("refusing to overwrite '{path}': its {keyword} declaration at line {line} would be lost")]
    TrailingContent {
        path: PathBuf,
        keyword: String,
        line: usize,
    },

    /// The table has no column for code values
    #[error("reconcile error: code column '{column}' not found in table '{path}'")]
    MissingColumn { column: String, path: PathBuf },

    /// Merge configuration could not be decoded
    #[error("invalid merge configuration '{path}': {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
