//! Data model for the gold-layer pipeline.
//!
//! - **config**: user-authored pipeline configuration (already parsed)
//! - **column_ref**: column references by name or numeric concept identifier
//! - **diagnostics**: per-item records for skipped work and data-quality warnings

pub mod column_ref;
pub mod config;
pub mod diagnostics;

pub use column_ref::ColumnRef;
pub use config::{
    AggregationConfig, AggregationMethod, ClinicalScore, DerivedParameter, Direction,
    ExistsPolicy, ImputationConfig, ImputationMethod, PipelineConfig, PivotConfig, SaveConfig,
    ScoreComponent,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, RunReport, Severity, Stage};
