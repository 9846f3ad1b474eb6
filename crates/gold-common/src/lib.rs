//! Shared utilities for the gold-layer pipeline crates.
//!
//! This crate provides common Polars helpers used across the workspace:
//! value conversion, numeric column extraction and dtype checks.

pub mod values;

// Re-export commonly used functions at crate root for convenience
pub use values::{
    any_to_f64, any_to_string, column_f64_values, f64_column,
    format_numeric, is_numeric_dtype, is_temporal_dtype, parse_f64,
};
