//! Missing-value imputation.
//!
//! Strategies operate on numeric columns, excluding the grouping columns and
//! the timestamp column. Propagating strategies (carry forward, carry
//! backward, last known) first sort the table stably by grouping keys and
//! timestamp. Rows with a missing grouping key are left unchanged. Apart from
//! zero and constant fill, no strategy invents a value when nothing
//! qualifying exists in scope; such cells stay missing.

use std::collections::HashMap;

use polars::prelude::DataFrame;
use tracing::{debug, info, info_span, warn};

use gold_common::{column_f64_values, f64_column};
use gold_model::{Diagnostic, DiagnosticKind, ImputationConfig, ImputationMethod, Stage};

use crate::data_utils::{
    SortKey, column_sort_keys, group_frame, median, numeric_columns, sorted_row_order, take_rows,
};
use crate::error::Result;
use crate::output::StageOutput;
use crate::temporal::{TimeColumn, find_time_column};

/// Fill missing numeric values according to `config`.
///
/// Grouping columns absent from the table are ignored. An unrecognized
/// method leaves the table unchanged and is reported as a skipped item, as
/// does grouped last-known imputation on a table without a timestamp column.
pub fn impute_missing_values(data: &DataFrame, config: &ImputationConfig) -> Result<StageOutput> {
    let span = info_span!("impute", method = %config.method);
    let _guard = span.enter();

    let Some(method) = ImputationMethod::from_name(&config.method, config.constant_value) else {
        warn!(method = %config.method, "unknown imputation method, data left unchanged");
        let diagnostic = Diagnostic::skipped(
            Stage::Impute,
            DiagnosticKind::UnknownMethod,
            config.method.as_str(),
            "unrecognized imputation method, no values filled",
        );
        return Ok(StageOutput::with_diagnostics(data.clone(), vec![diagnostic]));
    };

    let group_cols: Vec<String> = config
        .group_by
        .iter()
        .filter(|name| data.column(name.as_str()).is_ok())
        .cloned()
        .collect();
    if group_cols.len() < config.group_by.len() {
        debug!(requested = ?config.group_by, used = ?group_cols, "grouping columns not in table ignored");
    }

    let time = find_time_column(data);
    if method == ImputationMethod::LastKnown && !group_cols.is_empty() && time.is_none() {
        warn!(groups = ?group_cols, "last-known imputation needs a timestamp column, data left unchanged");
        let diagnostic = Diagnostic::skipped(
            Stage::Impute,
            DiagnosticKind::MissingColumn,
            "timestamp",
            "grouped last-known imputation needs a timestamp column, no values filled",
        );
        return Ok(StageOutput::with_diagnostics(data.clone(), vec![diagnostic]));
    }
    let (frame, times) = if propagates(method) {
        sort_for_propagation(data, &group_cols, time.as_ref())?
    } else {
        (data.clone(), time.as_ref().map(|t| t.millis.clone()))
    };

    let groups = group_frame(&frame, &group_cols)?;
    if groups.ungrouped() > 0 {
        debug!(rows = groups.ungrouped(), "rows with a missing grouping key left unchanged");
    }
    let members = groups.members();
    let mut exclude = group_cols.clone();
    if let Some(time) = &time {
        exclude.push(time.name.clone());
    }

    let mut out = frame.clone();
    let mut diagnostics = Vec::new();
    let mut total_filled = 0usize;
    for name in numeric_columns(&frame, &exclude) {
        let values = column_f64_values(frame.column(&name)?)?;
        if fills_from_observed(method) && values.iter().all(Option::is_none) {
            diagnostics.push(Diagnostic::warning(
                Stage::Impute,
                DiagnosticKind::EmptyColumn,
                name.as_str(),
                "column has no values to impute from",
            ));
            continue;
        }
        let filled = fill_column(method, &values, &members, times.as_deref());
        let changed = values
            .iter()
            .zip(&filled)
            .filter(|(before, after)| before.is_none() && after.is_some())
            .count();
        if changed > 0 {
            debug!(column = %name, filled = changed, "imputed column");
            out.with_column(f64_column(&name, filled))?;
            total_filled += changed;
        }
    }

    info!(method = method.as_str(), groups = members.len(), filled = total_filled, "imputation complete");
    Ok(StageOutput::with_diagnostics(out, diagnostics))
}

/// Strategies that derive fill values from observed cells.
fn fills_from_observed(method: ImputationMethod) -> bool {
    !matches!(method, ImputationMethod::ZeroFill | ImputationMethod::ConstantFill(_))
}

fn propagates(method: ImputationMethod) -> bool {
    matches!(
        method,
        ImputationMethod::CarryForward | ImputationMethod::CarryBackward | ImputationMethod::LastKnown
    )
}

/// Stable sort by grouping keys, then timestamp. Returns the reordered
/// timestamps alongside the table.
fn sort_for_propagation(
    data: &DataFrame,
    group_cols: &[String],
    time: Option<&TimeColumn>,
) -> Result<(DataFrame, Option<Vec<Option<i64>>>)> {
    let mut keys = Vec::with_capacity(group_cols.len() + 1);
    for name in group_cols {
        keys.push(column_sort_keys(data.column(name)?)?);
    }
    if let Some(time) = time {
        keys.push(
            time.millis
                .iter()
                .map(|ts| ts.map_or(SortKey::Missing, |ms| SortKey::Num(ms as f64)))
                .collect(),
        );
    }
    if keys.is_empty() {
        return Ok((data.clone(), time.map(|t| t.millis.clone())));
    }
    let order = sorted_row_order(data.height(), &keys);
    let times = time.map(|t| order.iter().map(|&row| t.millis[row]).collect());
    Ok((take_rows(data, &order)?, times))
}

/// Apply one strategy to a column. `members` lists each group's rows in
/// table order.
pub fn fill_column(
    method: ImputationMethod,
    values: &[Option<f64>],
    members: &[Vec<usize>],
    times: Option<&[Option<i64>]>,
) -> Vec<Option<f64>> {
    let mut filled = values.to_vec();
    for rows in members {
        match method {
            ImputationMethod::CarryForward => carry(values, &mut filled, rows.iter().copied()),
            ImputationMethod::CarryBackward => carry(values, &mut filled, rows.iter().rev().copied()),
            ImputationMethod::MeanFill | ImputationMethod::MedianFill => {
                let present: Vec<f64> = rows.iter().filter_map(|&row| values[row]).collect();
                let fill = if method == ImputationMethod::MeanFill {
                    (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
                } else {
                    median(&present)
                };
                if let Some(fill) = fill {
                    for &row in rows {
                        filled[row].get_or_insert(fill);
                    }
                }
            }
            ImputationMethod::ZeroFill => rows.iter().for_each(|&row| {
                filled[row].get_or_insert(0.0);
            }),
            ImputationMethod::ConstantFill(constant) => rows.iter().for_each(|&row| {
                filled[row].get_or_insert(constant);
            }),
            ImputationMethod::LastKnown => match times {
                Some(times) => last_known(values, &mut filled, rows, times),
                None => carry(values, &mut filled, rows.iter().copied()),
            },
        }
    }
    filled
}

fn carry(values: &[Option<f64>], filled: &mut [Option<f64>], rows: impl Iterator<Item = usize>) {
    let mut last = None;
    for row in rows {
        match values[row] {
            Some(value) => last = Some(value),
            None => filled[row] = last,
        }
    }
}

/// For each missing row, the most recent valid value at or before its
/// timestamp. Among equal timestamps the later row wins.
fn last_known(
    values: &[Option<f64>],
    filled: &mut [Option<f64>],
    rows: &[usize],
    times: &[Option<i64>],
) {
    let mut timeline: Vec<(i64, usize, f64)> = rows
        .iter()
        .filter_map(|&row| Some((times[row]?, row, values[row]?)))
        .collect();
    if timeline.is_empty() {
        return;
    }
    timeline.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    for &row in rows {
        if values[row].is_some() {
            continue;
        }
        let Some(ts) = times[row] else {
            continue;
        };
        let pos = timeline.partition_point(|(t, _, _)| *t <= ts);
        if pos > 0 {
            filled[row] = Some(timeline[pos - 1].2);
        }
    }
}

/// Count of missing cells per numeric column, used by the run summary.
pub fn missing_counts(data: &DataFrame, exclude: &[String]) -> Result<HashMap<String, usize>> {
    let mut counts = HashMap::new();
    for name in numeric_columns(data, exclude) {
        let values = column_f64_values(data.column(&name)?)?;
        counts.insert(name, values.iter().filter(|v| v.is_none()).count());
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use gold_model::Severity;
    use polars::prelude::{AnyValue, IntoColumn, NamedFrom, Series};

    use super::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 2, 1, 1, 2]).into_column(),
            Series::new(
                "charttime".into(),
                vec![
                    "2024-01-01 11:00:00",
                    "2024-01-01 09:00:00",
                    "2024-01-01 09:00:00",
                    "2024-01-01 10:00:00",
                    "2024-01-01 10:00:00",
                ],
            )
            .into_column(),
            Series::new("HR".into(), vec![None, Some(70.0), Some(80.0), None, None])
                .into_column(),
        ])
        .unwrap()
    }

    fn config(method: &str) -> ImputationConfig {
        ImputationConfig {
            method: method.to_string(),
            ..ImputationConfig::default()
        }
    }

    fn hr(df: &DataFrame) -> Vec<Option<f64>> {
        column_f64_values(df.column("HR").unwrap()).unwrap()
    }

    #[test]
    fn locf_sorts_then_carries_within_subject() {
        let out = impute_missing_values(&frame(), &config("locf")).unwrap();
        // Sorted: (1,09) (1,10) (1,11) (2,09) (2,10)
        assert_eq!(
            hr(&out.data),
            vec![Some(80.0), Some(80.0), Some(80.0), Some(70.0), Some(70.0)]
        );
    }

    #[test]
    fn nocb_leaves_trailing_gaps() {
        let out = impute_missing_values(&frame(), &config("nocb")).unwrap();
        assert_eq!(hr(&out.data), vec![Some(80.0), None, None, Some(70.0), None]);
    }

    #[test]
    fn mean_fill_per_group_keeps_row_order() {
        let out = impute_missing_values(&frame(), &config("mean")).unwrap();
        assert_eq!(
            hr(&out.data),
            vec![Some(80.0), Some(70.0), Some(80.0), Some(80.0), Some(70.0)]
        );
    }

    #[test]
    fn constant_fill_touches_only_missing_cells() {
        let df = DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 1, 1]).into_column(),
            Series::new("HR".into(), vec![Some(72.0), None, Some(75.0)]).into_column(),
        ])
        .unwrap();
        let out = impute_missing_values(&df, &config("constant")).unwrap();
        assert_eq!(hr(&out.data), vec![Some(72.0), Some(0.0), Some(75.0)]);
    }

    #[test]
    fn last_known_uses_timestamps_not_row_order() {
        let values = vec![None, Some(5.0), Some(1.0), None];
        let times = vec![Some(30), Some(20), Some(10), Some(5)];
        let filled = fill_column(
            ImputationMethod::LastKnown,
            &values,
            &[vec![0, 1, 2, 3]],
            Some(times.as_slice()),
        );
        assert_eq!(filled, vec![Some(5.0), Some(5.0), Some(1.0), None]);
    }

    #[test]
    fn unknown_method_is_reported() {
        let out = impute_missing_values(&frame(), &config("spline")).unwrap();
        assert_eq!(hr(&out.data), hr(&frame()));
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::UnknownMethod);
    }

    fn empty_hr_frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 1]).into_column(),
            Series::new(
                "charttime".into(),
                vec!["2024-01-01 09:00:00", "2024-01-01 10:00:00"],
            )
            .into_column(),
            Series::new("HR".into(), vec![None::<f64>, None]).into_column(),
        ])
        .unwrap()
    }

    #[test]
    fn empty_column_reported_for_observed_strategies() {
        for method in ["locf", "nocb", "mean", "median", "last"] {
            let out = impute_missing_values(&empty_hr_frame(), &config(method)).unwrap();
            assert_eq!(out.diagnostics[0].kind, DiagnosticKind::EmptyColumn, "{method}");
            assert_eq!(out.data.column("HR").unwrap().get(0).unwrap(), AnyValue::Null);
        }
    }

    #[test]
    fn zero_fill_covers_empty_column() {
        let out = impute_missing_values(&empty_hr_frame(), &config("zero")).unwrap();
        assert_eq!(hr(&out.data), vec![Some(0.0), Some(0.0)]);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn constant_fill_covers_empty_column() {
        let config = ImputationConfig {
            method: "constant".to_string(),
            constant_value: 7.0,
            ..ImputationConfig::default()
        };
        let out = impute_missing_values(&empty_hr_frame(), &config).unwrap();
        assert_eq!(hr(&out.data), vec![Some(7.0), Some(7.0)]);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn grouped_last_known_without_timestamp_is_skipped() {
        let df = DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 1, 2]).into_column(),
            Series::new("HR".into(), vec![Some(70.0), None, None]).into_column(),
        ])
        .unwrap();
        let out = impute_missing_values(&df, &config("last")).unwrap();
        assert_eq!(hr(&out.data), vec![Some(70.0), None, None]);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MissingColumn);
        assert_eq!(out.diagnostics[0].severity, Severity::Skipped);
    }

    #[test]
    fn ungrouped_last_known_without_timestamp_carries_forward() {
        let df = DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 1, 2]).into_column(),
            Series::new("HR".into(), vec![Some(70.0), None, None]).into_column(),
        ])
        .unwrap();
        let config = ImputationConfig {
            method: "last".to_string(),
            group_by: Vec::new(),
            ..ImputationConfig::default()
        };
        let out = impute_missing_values(&df, &config).unwrap();
        assert_eq!(hr(&out.data), vec![Some(70.0), Some(70.0), Some(70.0)]);
    }

    #[test]
    fn median_fill_per_group() {
        let df = DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 2, 1, 1, 2, 1, 2]).into_column(),
            Series::new(
                "HR".into(),
                vec![Some(60.0), Some(90.0), Some(100.0), None, None, Some(62.0), Some(94.0)],
            )
            .into_column(),
        ])
        .unwrap();
        let out = impute_missing_values(&df, &config("median")).unwrap();
        assert_eq!(
            hr(&out.data),
            vec![Some(60.0), Some(90.0), Some(100.0), Some(62.0), Some(92.0), Some(62.0), Some(94.0)]
        );
    }

    #[test]
    fn missing_group_key_rows_are_untouched() {
        let df = DataFrame::new(vec![
            Series::new("subject_id".into(), vec![Some(1i64), None, Some(1)]).into_column(),
            Series::new("HR".into(), vec![Some(70.0), None, None]).into_column(),
        ])
        .unwrap();
        let out = impute_missing_values(&df, &config("mean")).unwrap();
        assert_eq!(hr(&out.data), vec![Some(70.0), None, Some(70.0)]);
    }

    #[test]
    fn counts_missing_cells() {
        let counts = missing_counts(&frame(), &["subject_id".to_string()]).unwrap();
        assert_eq!(counts["HR"], 3);
    }
}
