//! DataFrame helpers shared by the stages: row grouping, stable sorting,
//! row selection and numeric column discovery.

use std::cmp::Ordering;
use std::collections::HashMap;

use polars::prelude::{AnyValue, Column, DataFrame, IdxCa, IdxSize};

use gold_common::{any_to_string, column_f64_values, is_numeric_dtype, is_temporal_dtype};

use crate::error::Result;
use crate::temporal::column_millis;

/// Rows partitioned into groups, numbered by first appearance.
///
/// Rows with a missing value in any grouping column belong to no group.
#[derive(Debug, Clone, Default)]
pub struct RowGroups {
    /// Group index for every row, `None` for rows with a missing key.
    pub group_of_row: Vec<Option<usize>>,
    /// First row of every group.
    pub first_rows: Vec<usize>,
}

impl RowGroups {
    /// Every row in a single group.
    pub fn single(height: usize) -> Self {
        Self {
            group_of_row: vec![Some(0); height],
            first_rows: if height == 0 { Vec::new() } else { vec![0] },
        }
    }

    pub fn len(&self) -> usize {
        self.first_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_rows.is_empty()
    }

    /// Rows that belong to no group.
    pub fn ungrouped(&self) -> usize {
        self.group_of_row.iter().filter(|group| group.is_none()).count()
    }

    /// Row indices of every group, in row order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.len()];
        for (row, group) in self.group_of_row.iter().enumerate() {
            if let Some(group) = group {
                members[*group].push(row);
            }
        }
        members
    }
}

/// Hashable form of a present [`SortKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Num(u64),
    Text(String),
}

impl GroupKey {
    fn from_sort_key(key: &SortKey) -> Option<Self> {
        match key {
            // -0.0 and 0.0 are the same key
            SortKey::Num(value) => Some(Self::Num((value + 0.0).to_bits())),
            SortKey::Text(text) => Some(Self::Text(text.clone())),
            SortKey::Missing => None,
        }
    }
}

/// Group rows by their typed keys, numbering groups by first appearance.
///
/// `keys` holds one vector per grouping column, each `height` long.
pub fn group_rows(height: usize, keys: &[Vec<SortKey>]) -> RowGroups {
    let mut index: HashMap<Vec<GroupKey>, usize> = HashMap::new();
    let mut groups = RowGroups {
        group_of_row: Vec::with_capacity(height),
        first_rows: Vec::new(),
    };
    for row in 0..height {
        let key: Option<Vec<GroupKey>> = keys
            .iter()
            .map(|column| GroupKey::from_sort_key(&column[row]))
            .collect();
        let Some(key) = key else {
            groups.group_of_row.push(None);
            continue;
        };
        let next = groups.first_rows.len();
        let group = *index.entry(key).or_insert(next);
        if group == next {
            groups.first_rows.push(row);
        }
        groups.group_of_row.push(Some(group));
    }
    groups
}

/// Group rows of `df` by `columns`; no columns means one group.
pub fn group_frame(df: &DataFrame, columns: &[String]) -> Result<RowGroups> {
    if columns.is_empty() {
        return Ok(RowGroups::single(df.height()));
    }
    let mut keys = Vec::with_capacity(columns.len());
    for name in columns {
        keys.push(column_sort_keys(df.column(name)?)?);
    }
    Ok(group_rows(df.height(), &keys))
}

/// Select rows by index, in the given order.
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let indices: Vec<IdxSize> = rows.iter().map(|&row| row as IdxSize).collect();
    let idx = IdxCa::from_vec("idx".into(), indices);
    Ok(df.take(&idx)?)
}

/// A sortable cell value. Missing values sort last. An empty string is
/// text, not missing.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Num(f64),
    Text(String),
    Missing,
}

impl SortKey {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Num(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Num(_)) => Ordering::Greater,
            (Self::Missing, Self::Missing) => Ordering::Equal,
            (Self::Missing, _) => Ordering::Greater,
            (_, Self::Missing) => Ordering::Less,
        }
    }
}

/// Sort keys for a column, typed by its dtype.
pub fn column_sort_keys(column: &Column) -> Result<Vec<SortKey>> {
    let dtype = column.dtype();
    if is_numeric_dtype(dtype) {
        return Ok(column_f64_values(column)?
            .into_iter()
            .map(|v| v.map_or(SortKey::Missing, SortKey::Num))
            .collect());
    }
    if is_temporal_dtype(dtype) {
        return Ok(column_millis(column, false)?
            .into_iter()
            .map(|v| v.map_or(SortKey::Missing, |ms| SortKey::Num(ms as f64)))
            .collect());
    }
    let mut keys = Vec::with_capacity(column.len());
    for idx in 0..column.len() {
        keys.push(match column.get(idx)? {
            AnyValue::Null => SortKey::Missing,
            value => SortKey::Text(any_to_string(value)),
        });
    }
    Ok(keys)
}

/// Stable row order sorting by each key vector in turn, ascending.
pub fn sorted_row_order(height: usize, keys: &[Vec<SortKey>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..height).collect();
    order.sort_by(|&a, &b| {
        keys.iter()
            .map(|column| column[a].compare(&column[b]))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Stable sort of `df` by the named columns, ascending, missing last.
pub fn sort_frame(df: &DataFrame, by: &[String]) -> Result<DataFrame> {
    if by.is_empty() || df.height() < 2 {
        return Ok(df.clone());
    }
    let mut keys = Vec::with_capacity(by.len());
    for name in by {
        keys.push(column_sort_keys(df.column(name)?)?);
    }
    take_rows(df, &sorted_row_order(df.height(), &keys))
}

/// Names of numeric columns, in table order, skipping `exclude`.
pub fn numeric_columns(df: &DataFrame, exclude: &[String]) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|column| is_numeric_dtype(column.dtype()))
        .map(|column| column.name().to_string())
        .filter(|name| !exclude.contains(name))
        .collect()
}

/// Column names as owned strings.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Min, max and mean of the non-missing values of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Summarize values, or `None` when nothing is present.
pub fn summarize(values: &[Option<f64>]) -> Option<ColumnSummary> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    Some(ColumnSummary {
        count: present.len(),
        min,
        max,
        mean,
    })
}

/// Median of the non-missing values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
