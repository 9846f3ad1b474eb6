//! Time-window aggregation.
//!
//! Timestamps are floored to a fixed [`Granularity`] and every numeric column
//! is reduced per (entity, window) with a lazy polars `group_by`. Non-numeric
//! columns other than the entity identifiers are dropped, as are rows with a
//! missing identifier or timestamp.

use polars::prelude::{DataFrame, DataType, Expr, IntoLazy, SortMultipleOptions, col};
use tracing::{debug, info, info_span};

use gold_model::{AggregationConfig, AggregationMethod, Diagnostic, DiagnosticKind, Severity, Stage};

use crate::data_utils::numeric_columns;
use crate::error::Result;
use crate::output::StageOutput;
use crate::temporal::{Granularity, datetime_column, resolve_time_column};

/// Name of the window-start column in the output.
pub const WINDOW_COLUMN: &str = "time_window";

/// Identifier column used when no column name contains `id`.
pub const DEFAULT_ID_COLUMN: &str = "subject_id";

const EXCLUDED_ID_COLUMNS: [&str; 1] = ["concept_id"];

/// Floor timestamps into windows and aggregate numeric columns per entity.
///
/// An unrecognized reducer name falls back to the mean and is reported as an
/// informational diagnostic.
///
/// # Errors
///
/// Fails when the window size is invalid or no timestamp column resolves.
pub fn aggregate_time_windows(data: &DataFrame, config: &AggregationConfig) -> Result<StageOutput> {
    let span = info_span!("aggregate", window = %config.time_window, method = %config.method);
    let _guard = span.enter();

    let granularity = Granularity::parse(&config.time_window)?;
    let mut diagnostics = Vec::new();
    let method = AggregationMethod::from_name(&config.method).unwrap_or_else(|| {
        debug!(method = %config.method, "unknown aggregation method, using mean");
        diagnostics.push(Diagnostic::new(
            Stage::Aggregate,
            Severity::Info,
            DiagnosticKind::UnknownMethod,
            config.method.as_str(),
            "unrecognized aggregation method, using mean",
        ));
        AggregationMethod::Mean
    });

    let time = resolve_time_column(data, config.time_column.as_deref())?;
    let id_cols = identifier_columns(data, &time.name);
    debug!(time_column = %time.name, ids = ?id_cols, "resolved grouping columns");

    let windows: Vec<Option<i64>> = time
        .millis
        .iter()
        .map(|ts| ts.map(|ms| granularity.floor(ms)))
        .collect();
    let untimed = windows.iter().filter(|window| window.is_none()).count();
    if untimed > 0 {
        debug!(dropped = untimed, "rows without a timestamp dropped");
    }

    let mut exclude = id_cols.clone();
    exclude.push(time.name.clone());
    exclude.push(WINDOW_COLUMN.to_string());
    let value_cols = numeric_columns(data, &exclude);

    let mut frame = data.clone();
    frame.with_column(datetime_column(WINDOW_COLUMN, windows)?)?;

    let present = id_cols.iter().fold(col(WINDOW_COLUMN).is_not_null(), |acc, name| {
        acc.and(col(name.as_str()).is_not_null())
    });
    let mut keys: Vec<String> = id_cols;
    keys.push(WINDOW_COLUMN.to_string());
    let key_exprs: Vec<Expr> = keys.iter().map(|name| col(name.as_str())).collect();
    let reducers: Vec<Expr> = value_cols
        .iter()
        .map(|name| reducer(method, col(name.as_str()).cast(DataType::Float64)))
        .collect();

    let out = frame
        .lazy()
        .filter(present)
        .group_by_stable(key_exprs)
        .agg(reducers)
        .sort(keys, SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;

    info!(rows = out.height(), columns = value_cols.len(), "aggregated time windows");
    Ok(StageOutput::with_diagnostics(out, diagnostics))
}

/// Columns whose name contains `id` (any case), minus exclusions.
///
/// Falls back to [`DEFAULT_ID_COLUMN`] when present, otherwise to no
/// identifier columns (windows only).
pub fn identifier_columns(data: &DataFrame, time_column: &str) -> Vec<String> {
    let ids: Vec<String> = data
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name.to_ascii_lowercase().contains("id"))
        .filter(|name| !EXCLUDED_ID_COLUMNS.contains(&name.as_str()))
        .filter(|name| name != time_column)
        .collect();
    if !ids.is_empty() {
        return ids;
    }
    if data.column(DEFAULT_ID_COLUMN).is_ok() {
        vec![DEFAULT_ID_COLUMN.to_string()]
    } else {
        Vec::new()
    }
}

fn reducer(method: AggregationMethod, values: Expr) -> Expr {
    match method {
        AggregationMethod::Mean => values.mean(),
        AggregationMethod::Median => values.median(),
        AggregationMethod::Max => values.max(),
        AggregationMethod::Min => values.min(),
    }
}
