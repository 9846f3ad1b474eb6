//! Gold-layer transformation engine.
//!
//! Turns long-format clinical observations into a regular wide table with
//! derived parameters and composite scores. Each stage is a function taking
//! a `DataFrame` and returning a [`StageOutput`]: the transformed table plus
//! the diagnostics for items that were skipped or looked suspicious.
//!
//! - **reshape**: long to wide (mean of duplicate observations)
//! - **window**: timestamp flooring and per-window aggregation
//! - **impute**: missing-value strategies, optionally per entity
//! - **derive**: formula-driven derived parameters
//! - **score**: threshold-based clinical scores such as SOFA
//!
//! Structural problems (no usable timestamp, an invalid window size) are
//! returned as [`TransformError`]. Item-level problems never are.

mod error;
mod output;

pub mod data_utils;
pub mod derive;
pub mod expr;
pub mod impute;
pub mod reshape;
pub mod resolve;
pub mod score;
pub mod temporal;
pub mod window;

pub use error::{Result, TransformError};
pub use output::StageOutput;

pub use derive::calculate_derived_parameters;
pub use impute::impute_missing_values;
pub use reshape::{pivot_long_to_wide, unpivot_wide_to_long};
pub use resolve::{ColumnResolver, Resolution, ResolutionStrategy};
pub use score::calculate_clinical_scores;
pub use temporal::Granularity;
pub use window::aggregate_time_windows;
