//! Timestamp detection, parsing and flooring.
//!
//! Timestamps are handled internally as milliseconds since the Unix epoch
//! (naive, no time zone). Window boundaries are fixed-length multiples of a
//! [`Granularity`] counted from the epoch, so flooring is exact integer math.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::{Column, DataFrame, DataType, IntoColumn, NamedFrom, Series, TimeUnit};

use gold_common::{any_to_string, is_temporal_dtype};

use crate::error::{Result, TransformError};

/// Column names tried, in order, when no column has a temporal dtype.
pub const TIME_COLUMN_CANDIDATES: [&str; 3] = ["charttime", "time_window", "timestamp"];

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Formats accepted for string timestamps, most specific first.
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];

/// Fixed window size used to floor timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Granularity {
    millis: i64,
}

impl Granularity {
    pub fn from_millis(millis: i64) -> Option<Self> {
        (millis > 0).then_some(Self { millis })
    }

    pub fn hours(n: i64) -> Self {
        Self {
            millis: n.max(1) * MILLIS_PER_HOUR,
        }
    }

    /// Parse an offset string such as `1H`, `30min`, `15T`, `2d` or `45s`.
    ///
    /// Calendar units (months, years) are rejected because they have no fixed length.
    ///
    /// ```
    /// use gold_transform::Granularity;
    ///
    /// assert_eq!(Granularity::parse("1H").unwrap(), Granularity::hours(1));
    /// assert_eq!(Granularity::parse("30min").unwrap().as_millis(), 1_800_000);
    /// assert!(Granularity::parse("1M").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || TransformError::InvalidTimeWindow {
            value: raw.to_string(),
        };
        let trimmed = raw.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (count, unit) = trimmed.split_at(split);
        let count: i64 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| invalid())?
        };
        let unit_millis = match unit.trim() {
            "T" => MILLIS_PER_MINUTE,
            "L" => 1,
            other => match other.to_ascii_lowercase().as_str() {
                "ms" | "milli" | "millis" => 1,
                "s" | "sec" | "second" | "seconds" => MILLIS_PER_SECOND,
                "min" | "minute" | "minutes" => MILLIS_PER_MINUTE,
                "h" | "hr" | "hour" | "hours" => MILLIS_PER_HOUR,
                "d" | "day" | "days" => MILLIS_PER_DAY,
                "w" | "week" | "weeks" => 7 * MILLIS_PER_DAY,
                _ => return Err(invalid()),
            },
        };
        count
            .checked_mul(unit_millis)
            .and_then(Self::from_millis)
            .ok_or_else(invalid)
    }

    pub fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Floor a timestamp to the start of its window.
    pub fn floor(&self, millis: i64) -> i64 {
        millis.div_euclid(self.millis) * self.millis
    }
}

/// A resolved timestamp column.
#[derive(Debug, Clone)]
pub struct TimeColumn {
    pub name: String,
    /// Milliseconds since the epoch; `None` for missing or unparsable values.
    pub millis: Vec<Option<i64>>,
}

/// Resolve the timestamp column for windowing.
///
/// Uses `explicit` when given. Otherwise the first column with a temporal
/// dtype wins, then the first present name from [`TIME_COLUMN_CANDIDATES`]
/// whose values parse as timestamps. Unparsable non-empty values are an error.
pub fn resolve_time_column(df: &DataFrame, explicit: Option<&str>) -> Result<TimeColumn> {
    if let Some(name) = explicit {
        let column = df
            .column(name)
            .map_err(|_| TransformError::TimestampColumnNotFound {
                column: name.to_string(),
            })?;
        return read_time_column(column, true);
    }
    if let Some(column) = first_temporal_column(df) {
        return read_time_column(column, true);
    }
    for candidate in TIME_COLUMN_CANDIDATES {
        if let Ok(column) = df.column(candidate) {
            return read_time_column(column, true);
        }
    }
    Err(TransformError::NoTimestampColumn {
        candidates: TIME_COLUMN_CANDIDATES.iter().map(|s| s.to_string()).collect(),
    })
}

/// Find a timestamp column without failing.
///
/// Same search order as [`resolve_time_column`], but unparsable values become
/// `None` and a table without any candidate yields `None`.
pub fn find_time_column(df: &DataFrame) -> Option<TimeColumn> {
    if let Some(column) = first_temporal_column(df) {
        return read_time_column(column, false).ok();
    }
    TIME_COLUMN_CANDIDATES
        .iter()
        .find_map(|candidate| df.column(candidate).ok())
        .and_then(|column| read_time_column(column, false).ok())
}

fn first_temporal_column(df: &DataFrame) -> Option<&Column> {
    df.get_columns()
        .iter()
        .find(|column| is_temporal_dtype(column.dtype()))
}

fn read_time_column(column: &Column, strict: bool) -> Result<TimeColumn> {
    Ok(TimeColumn {
        name: column.name().to_string(),
        millis: column_millis(column, strict)?,
    })
}

/// Read a column as epoch milliseconds.
///
/// Temporal dtypes are converted exactly. Other dtypes are parsed as text;
/// with `strict`, the first unparsable non-empty value is an error.
pub fn column_millis(column: &Column, strict: bool) -> Result<Vec<Option<i64>>> {
    let millis = match column.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let physical = column.cast(&DataType::Int64)?;
            physical
                .i64()?
                .into_iter()
                .map(|v| v.map(|raw| to_millis(raw, unit)))
                .collect()
        }
        DataType::Date => {
            let physical = column.cast(&DataType::Int32)?;
            physical
                .i32()?
                .into_iter()
                .map(|v| v.map(|days| i64::from(days) * MILLIS_PER_DAY))
                .collect()
        }
        _ => {
            let mut millis = Vec::with_capacity(column.len());
            for idx in 0..column.len() {
                let raw = any_to_string(column.get(idx)?);
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    millis.push(None);
                    continue;
                }
                match parse_timestamp_millis(trimmed) {
                    Some(value) => millis.push(Some(value)),
                    None if strict => {
                        return Err(TransformError::TimestampParse {
                            column: column.name().to_string(),
                            value: trimmed.to_string(),
                        });
                    }
                    None => millis.push(None),
                }
            }
            millis
        }
    };
    Ok(millis)
}

fn to_millis(raw: i64, unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Nanoseconds => raw.div_euclid(1_000_000),
        TimeUnit::Microseconds => raw.div_euclid(1_000),
        TimeUnit::Milliseconds => raw,
    }
}

/// Parse a timestamp string into epoch milliseconds.
///
/// Accepts ISO 8601 with or without `T`, seconds and fractions, RFC 3339
/// offsets (converted to UTC), and date-only values (midnight).
///
/// ```
/// use gold_transform::temporal::parse_timestamp_millis;
///
/// assert_eq!(parse_timestamp_millis("1970-01-01 01:00:00"), Some(3_600_000));
/// assert_eq!(parse_timestamp_millis("1970-01-02"), Some(86_400_000));
/// assert_eq!(parse_timestamp_millis("yesterday"), None);
/// ```
pub fn parse_timestamp_millis(value: &str) -> Option<i64> {
    let value = value.trim();
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp_millis());
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}

/// Build a millisecond `Datetime` column.
pub fn datetime_column(name: &str, millis: Vec<Option<i64>>) -> Result<Column> {
    let series = Series::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    Ok(series.into_column())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pandas_offsets() {
        assert_eq!(Granularity::parse("1H").unwrap().as_millis(), MILLIS_PER_HOUR);
        assert_eq!(Granularity::parse("h").unwrap().as_millis(), MILLIS_PER_HOUR);
        assert_eq!(Granularity::parse("15T").unwrap().as_millis(), 15 * MILLIS_PER_MINUTE);
        assert_eq!(Granularity::parse("2D").unwrap().as_millis(), 2 * MILLIS_PER_DAY);
        assert_eq!(Granularity::parse("45s").unwrap().as_millis(), 45_000);
    }

    #[test]
    fn rejects_calendar_and_zero_windows() {
        assert!(Granularity::parse("1M").is_err());
        assert!(Granularity::parse("0H").is_err());
        assert!(Granularity::parse("").is_err());
        assert!(Granularity::parse("abc").is_err());
    }

    #[test]
    fn floors_before_epoch() {
        let hour = Granularity::hours(1);
        assert_eq!(hour.floor(90 * MILLIS_PER_MINUTE), MILLIS_PER_HOUR);
        assert_eq!(hour.floor(-1), -MILLIS_PER_HOUR);
    }

    #[test]
    fn parses_common_formats() {
        let base = parse_timestamp_millis("2024-03-01 09:15:00").unwrap();
        assert_eq!(parse_timestamp_millis("2024-03-01T09:15:00"), Some(base));
        assert_eq!(parse_timestamp_millis("2024-03-01 09:15"), Some(base));
        assert_eq!(parse_timestamp_millis("2024-03-01T10:15:00+01:00"), Some(base));
        assert_eq!(parse_timestamp_millis("2024-03-01 09:15:00.500"), Some(base + 500));
    }

    #[test]
    fn resolves_string_candidate() {
        let df = DataFrame::new(vec![
            Series::new("charttime".into(), vec!["2024-03-01 09:15:00", ""]).into_column(),
        ])
        .unwrap();
        let time = resolve_time_column(&df, None).unwrap();
        assert_eq!(time.name, "charttime");
        assert!(time.millis[0].is_some());
        assert_eq!(time.millis[1], None);
    }

    #[test]
    fn strict_resolution_rejects_garbage() {
        let df = DataFrame::new(vec![
            Series::new("timestamp".into(), vec!["not a time"]).into_column(),
        ])
        .unwrap();
        assert!(matches!(
            resolve_time_column(&df, None),
            Err(TransformError::TimestampParse { .. })
        ));
        assert!(find_time_column(&df).unwrap().millis[0].is_none());
    }

    #[test]
    fn missing_timestamp_is_an_error() {
        let df = DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64]).into_column(),
        ])
        .unwrap();
        assert!(matches!(
            resolve_time_column(&df, None),
            Err(TransformError::NoTimestampColumn { .. })
        ));
        assert!(find_time_column(&df).is_none());
    }

    #[test]
    fn reads_datetime_dtype() {
        let column = datetime_column("t", vec![Some(MILLIS_PER_HOUR), None]).unwrap();
        let df = DataFrame::new(vec![column]).unwrap();
        let time = resolve_time_column(&df, None).unwrap();
        assert_eq!(time.millis, vec![Some(MILLIS_PER_HOUR), None]);
    }
}
