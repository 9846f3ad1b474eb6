//! Error types for the transformation stages.

use thiserror::Error;

/// Structural errors that abort a stage.
///
/// Per-item failures are reported as diagnostics instead.
#[derive(Debug, Error)]
pub enum TransformError {
    /// No column could be used as the timestamp.
    #[error("no timestamp column found (tried temporal columns and {candidates:?})")]
    NoTimestampColumn { candidates: Vec<String> },

    /// An explicitly configured timestamp column does not exist.
    #[error("timestamp column '{column}' not found")]
    TimestampColumnNotFound { column: String },

    /// A timestamp value could not be parsed.
    #[error("invalid timestamp '{value}' in column '{column}'")]
    TimestampParse { column: String, value: String },

    /// The configured window size is not a fixed duration.
    #[error("invalid time window '{value}'")]
    InvalidTimeWindow { value: String },

    /// A column required by the stage configuration is absent.
    #[error("column '{column}' not found")]
    ColumnNotFound { column: String },

    /// Failed DataFrame operation.
    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for TransformError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

/// Result type for transformation operations.
pub type Result<T> = std::result::Result<T, TransformError>;
