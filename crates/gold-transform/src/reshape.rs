//! Long-to-wide reshaping.
//!
//! One output row per distinct combination of the index columns, one output
//! column per distinct pivot label. Duplicate observations for the same
//! (index, label) pair are averaged.

use std::cmp::Ordering;
use std::collections::HashMap;

use polars::prelude::{DataFrame, IntoColumn, NamedFrom, Series};
use tracing::{debug, info, info_span};

use gold_common::{
    any_to_f64, any_to_string, column_f64_values, f64_column, is_numeric_dtype, parse_f64,
};
use gold_model::{Diagnostic, DiagnosticKind, PivotConfig, Severity, Stage};

use crate::data_utils::{group_frame, numeric_columns, sort_frame, take_rows};
use crate::error::{Result, TransformError};
use crate::output::StageOutput;

/// Running sum and count for one output cell.
#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    sum: f64,
    count: u32,
}

impl Cell {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

/// Pivot a long table into wide format.
///
/// Labels are taken from the pivot column as text, so numeric concept
/// identifiers become column names such as `"3027018"`. Rows with an empty
/// label are ignored, as are rows with a missing index value. Non-numeric
/// values count as missing and are reported.
///
/// # Errors
///
/// Returns [`TransformError::ColumnNotFound`] when an index, value or pivot
/// column is absent.
pub fn pivot_long_to_wide(data: &DataFrame, config: &PivotConfig) -> Result<StageOutput> {
    let span = info_span!("pivot", rows = data.height(), labels = tracing::field::Empty);
    let _guard = span.enter();

    for name in config
        .index_cols
        .iter()
        .chain([&config.value_col, &config.pivot_col])
    {
        if data.column(name).is_err() {
            return Err(TransformError::ColumnNotFound {
                column: name.clone(),
            });
        }
    }

    let mut diagnostics = Vec::new();
    let groups = group_frame(data, &config.index_cols)?;
    let label_column = data.column(&config.pivot_col)?;
    let raw_values = data.column(&config.value_col)?;
    let values = column_f64_values(raw_values)?;

    let mut label_index: HashMap<String, usize> = HashMap::new();
    let mut labels: Vec<String> = Vec::new();
    let mut cells: Vec<Vec<Cell>> = Vec::new();
    let mut coerced = 0u64;

    for (row, value) in values.iter().enumerate() {
        let Some(group) = groups.group_of_row[row] else {
            continue;
        };
        let label = any_to_string(label_column.get(row)?);
        if label.trim().is_empty() {
            continue;
        }
        let Some(value) = *value else {
            if !is_numeric_dtype(raw_values.dtype())
                && !any_to_string(raw_values.get(row)?).trim().is_empty()
            {
                coerced += 1;
            }
            continue;
        };
        let idx = *label_index.entry(label.clone()).or_insert_with(|| {
            labels.push(label);
            cells.push(vec![Cell::default(); groups.len()]);
            labels.len() - 1
        });
        cells[idx][group].add(value);
    }

    let ungrouped = groups.ungrouped();
    if ungrouped > 0 {
        debug!(rows = ungrouped, "rows with a missing index value dropped");
        diagnostics.push(
            Diagnostic::new(
                Stage::Pivot,
                Severity::Info,
                DiagnosticKind::MissingKey,
                config.index_cols.join(",").as_str(),
                "rows with a missing index value dropped",
            )
            .with_count(ungrouped as u64),
        );
    }
    if coerced > 0 {
        diagnostics.push(
            Diagnostic::warning(
                Stage::Pivot,
                DiagnosticKind::Coerced,
                config.value_col.as_str(),
                "non-numeric values treated as missing",
            )
            .with_count(coerced),
        );
    }

    let keys: Vec<&str> = config.index_cols.iter().map(String::as_str).collect();
    let mut wide = take_rows(&data.select(keys)?, &groups.first_rows)?;

    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| compare_labels(&labels[a], &labels[b]));
    for idx in order {
        let label = &labels[idx];
        if config.index_cols.contains(label) {
            diagnostics.push(Diagnostic::skipped(
                Stage::Pivot,
                DiagnosticKind::NameConflict,
                label.as_str(),
                "pivot label collides with an index column",
            ));
            continue;
        }
        let column: Vec<Option<f64>> = cells[idx].iter().map(|cell| cell.mean()).collect();
        wide.with_column(f64_column(label, column))?;
    }

    let wide = sort_frame(&wide, &config.index_cols)?;
    span.record("labels", labels.len());
    info!(rows = wide.height(), columns = wide.width(), "pivoted to wide format");
    Ok(StageOutput::with_diagnostics(wide, diagnostics))
}

/// Labels that parse as numbers sort numerically, ahead of text labels.
fn compare_labels(a: &str, b: &str) -> Ordering {
    match (parse_f64(a), parse_f64(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Melt a wide table back into long format.
///
/// Every numeric column outside `index_cols` becomes a label in `pivot_col`.
/// Missing cells produce no row.
pub fn unpivot_wide_to_long(
    data: &DataFrame,
    index_cols: &[String],
    pivot_col: &str,
    value_col: &str,
) -> Result<DataFrame> {
    for name in index_cols {
        if data.column(name).is_err() {
            return Err(TransformError::ColumnNotFound {
                column: name.clone(),
            });
        }
    }
    let value_columns = numeric_columns(data, index_cols);
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    let mut values = Vec::new();
    for row in 0..data.height() {
        for name in &value_columns {
            if let Some(value) = any_to_f64(data.column(name)?.get(row)?) {
                rows.push(row);
                labels.push(name.clone());
                values.push(value);
            }
        }
    }
    debug!(rows = rows.len(), "unpivoted to long format");

    let keys: Vec<&str> = index_cols.iter().map(String::as_str).collect();
    let mut long = take_rows(&data.select(keys)?, &rows)?;
    long.with_column(Series::new(pivot_col.into(), labels).into_column())?;
    long.with_column(Series::new(value_col.into(), values).into_column())?;
    Ok(long)
}
