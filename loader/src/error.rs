//! Error types for the cfload loading pipeline.
//!
//! The hierarchy mirrors the layers of the crate:
//!
//! - [`RowError`] - A single data row that failed validation
//! - [`LoadError`] - Opening, decoding, or reading the header of a CSV file
//! - [`ConfigError`] - Column configuration and environment settings
//! - [`SinkError`] - Writing flows and methods to a store
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::models::FlowId;

// =============================================================================
// Row Errors
// =============================================================================

/// A data row that cannot produce a record.
///
/// `line` is the physical line of the row in the source file, the header
/// being line 1.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RowError {
    /// A required column is blank.
    #[error("Row {line}: required column '{column}' is blank")]
    MissingValue { line: u64, column: String },

    /// A column has a value that cannot be interpreted.
    #[error("Row {line}: column '{column}' is malformed: {message}")]
    Malformed {
        line: u64,
        column: String,
        message: String,
    },

    /// The factor column does not hold a finite floating point value.
    #[error("Row {line}: column '{column}' must contain a finite floating point value (found '{value}')")]
    NotANumber {
        line: u64,
        column: String,
        value: String,
    },
}

impl RowError {
    /// Line of the offending row.
    pub fn line(&self) -> u64 {
        match self {
            Self::MissingValue { line, .. }
            | Self::Malformed { line, .. }
            | Self::NotANumber { line, .. } => *line,
        }
    }

    /// Column of the offending value.
    pub fn column(&self) -> &str {
        match self {
            Self::MissingValue { column, .. }
            | Self::Malformed { column, .. }
            | Self::NotANumber { column, .. } => column,
        }
    }
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors that stop a parse before or while scanning a file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file cannot be opened or read.
    #[error("Cannot read CSV file '{}': {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The content cannot be decoded as text.
    #[error("Failed to decode CSV content: {0}")]
    Encoding(String),

    /// Required header columns are absent.
    #[error("CSV file must contain the columns: {}. Missing: {}.", .required.join(", "), .missing.join(", "))]
    Schema {
        required: Vec<String>,
        missing: Vec<String>,
    },

    /// A data row failed validation under the abort policy.
    #[error(transparent)]
    Row(#[from] RowError),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading column configuration or settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read configuration '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment variable holds an unusable value.
    #[error("Invalid value for {name}: {message}")]
    InvalidVar { name: String, message: String },

    /// A configured value is inconsistent.
    #[error("Invalid column configuration: {0}")]
    InvalidColumns(String),
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Errors from a flow/method store.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Local store IO error.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data cannot be (de)serialized.
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested database or method does not exist.
    #[error("Not found in store: {0}")]
    NotFound(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Remote service answered with an error status.
    #[error("Remote store error (HTTP {status}): {body}")]
    Remote { status: u16, body: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::transform::pipeline::load_csv`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV loading error.
    #[error("CSV error: {0}")]
    Load(#[from] LoadError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store error.
    #[error("Store error: {0}")]
    Sink(#[from] SinkError),

    /// Records failed schema validation.
    #[error("{count} records failed validation")]
    Validation {
        count: usize,
        errors: Vec<(usize, Vec<String>)>,
    },

    /// The method would contain several factors for the same flow.
    #[error("Duplicate characterization factors for flows: {}", join_ids(.0))]
    Duplicates(Vec<FlowId>),

    /// Flows with different identifiers share a `(database, code)` key.
    #[error("Flows with different identifiers share a code: {}", join_keys(.0))]
    KeyConflicts(Vec<(String, String)>),

    /// No records to load.
    #[error("No valid rows to load")]
    EmptyInput,
}

fn join_ids(ids: &[FlowId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

fn join_keys(keys: &[(String, String)]) -> String {
    keys.iter()
        .map(|(database, code)| format!("{database}/{code}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for store operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
