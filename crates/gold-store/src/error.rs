//! Error types for table stores.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading from or writing to a store.
#[derive(Debug, Error)]
pub enum StoreError {
    // === Lookup Errors ===
    #[error("schema not found: {schema}")]
    SchemaNotFound { schema: String },

    #[error("table not found: {schema}.{table}")]
    TableNotFound { schema: String, table: String },

    /// Write refused because the table exists and the policy is `fail`.
    #[error("table {schema}.{table} already exists")]
    TableExists { schema: String, table: String },

    // === Query Errors ===
    /// Only `SELECT * FROM [schema.]table [LIMIT n]` is understood.
    #[error("unsupported query: {query}")]
    UnsupportedQuery { query: String },

    #[error("invalid identifier '{name}'")]
    InvalidIdentifier { name: String },

    // === Write Errors ===
    /// Appended rows must carry the existing table's columns, in order.
    #[error("cannot append to {schema}.{table}: expected columns [{expected}], found [{found}]")]
    ColumnMismatch {
        schema: String,
        table: String,
        expected: String,
        found: String,
    },

    // === File System Errors ===
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV {path}: {message}")]
    CsvParse { path: PathBuf, message: String },

    // === DataFrame Errors ===
    #[error("DataFrame error: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for StoreError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
