//! Shared utilities for the cleaning pipeline.
//!
//! Series conversion helpers, numeric and date string parsing, and the JSON
//! value bridge used by the record sources and exports.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde_json::{Number, Value};

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is a date or datetime type.
#[inline]
pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Datetime(_, _) | DataType::Date)
}

/// Column names as owned strings, in table order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Fetch a column as a materialized Series.
pub fn series_of(df: &DataFrame, name: &str) -> PolarsResult<Series> {
    Ok(df.column(name)?.as_materialized_series().clone())
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 6] = [',', '$', '%', '€', '£', ' '];

/// Spellings of "missing" that spreadsheet and CSV exports emit.
pub const MISSING_MARKERS: [&str; 14] = [
    "#N/A", "#N/A N/A", "#NA", "<NA>", "N/A", "n/a", "NA", "NULL", "null", "NaN", "nan", "-NaN",
    "-nan", "None",
];

static PLACEHOLDER_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Unnamed: \d+$").expect("Invalid regex: placeholder header"));

static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/](\d{1,2})$").expect("Invalid regex: YYYY-MM"));

/// Clean a string for numeric parsing by removing formatting characters.
///
/// # Example
///
/// ```rust
/// use finclean::utils::clean_numeric_string;
///
/// assert_eq!(clean_numeric_string("$1,234.56"), "1234.56");
/// assert_eq!(clean_numeric_string("  42%  "), "42");
/// ```
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Try to parse a string as a finite numeric value.
///
/// Handles currency symbols, percent signs and thousands separators.
/// Accounting negatives such as `(1,200)` are read as `-1200`.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let (negate, body) = match trimmed.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned = clean_numeric_string(body);
    if cleaned.is_empty() {
        return None;
    }
    let value = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(if negate { -value } else { value })
}

/// True for empty or whitespace-only strings.
#[inline]
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// True for the spreadsheet/CSV spellings of a missing value.
pub fn is_missing_marker(s: &str) -> bool {
    let trimmed = s.trim();
    MISSING_MARKERS.iter().any(|&marker| marker == trimmed)
}

/// True for pandas-style auto-generated header names (`Unnamed: 3`).
pub fn is_placeholder_header(name: &str) -> bool {
    PLACEHOLDER_HEADER.is_match(name.trim())
}

/// Parse a date or datetime string, keeping the time component.
///
/// Accepts ISO dates, `YYYY/MM/DD`, `MM/DD/YYYY`, `DD.MM.YYYY`, year-month
/// (`2024-01` is the first of the month), ISO and space separated datetimes,
/// and RFC 3339 timestamps.
pub fn parse_datetime_string(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }

    const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d"];
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    if let Some(caps) = YEAR_MONTH.captures(trimmed) {
        let year = caps[1].parse::<i32>().ok()?;
        let month = caps[2].parse::<u32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0);
    }

    None
}

/// Parse a date string, dropping any time component.
pub fn parse_date_string(s: &str) -> Option<NaiveDate> {
    parse_datetime_string(s).map(|dt| dt.date())
}

/// Round half away from zero to two decimal places.
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// =============================================================================
// Temporal conversions
// =============================================================================

#[inline]
fn unix_epoch_date() -> NaiveDate {
    DateTime::UNIX_EPOCH.date_naive()
}

/// Days since the Unix epoch, the physical representation of `Date`.
pub fn date_to_days(date: NaiveDate) -> i32 {
    (date - unix_epoch_date()).num_days() as i32
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    unix_epoch_date().checked_add_signed(chrono::Duration::days(days as i64))
}

/// Convert a physical datetime value in the given unit to a `NaiveDateTime`.
pub fn physical_to_datetime(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
    };
    dt.map(|dt| dt.naive_utc())
}

/// Build a `Date` series from optional dates.
pub fn dates_to_series(name: &str, dates: &[Option<NaiveDate>]) -> PolarsResult<Series> {
    let days: Vec<Option<i32>> = dates.iter().map(|d| d.map(date_to_days)).collect();
    Series::new(name.into(), days).cast(&DataType::Date)
}

/// Build a millisecond `Datetime` series from optional datetimes.
pub fn datetimes_to_series(name: &str, values: &[Option<NaiveDateTime>]) -> PolarsResult<Series> {
    let millis: Vec<Option<i64>> = values
        .iter()
        .map(|v| v.map(|dt| dt.and_utc().timestamp_millis()))
        .collect();
    Series::new(name.into(), millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

/// Read a `Date` or `Datetime` series as optional dates.
pub fn temporal_to_dates(series: &Series) -> PolarsResult<Vec<Option<NaiveDate>>> {
    match series.dtype() {
        DataType::Date => {
            let physical = series.cast(&DataType::Int32)?;
            Ok(physical
                .i32()?
                .into_iter()
                .map(|v| v.and_then(days_to_date))
                .collect())
        }
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let physical = series.cast(&DataType::Int64)?;
            Ok(physical
                .i64()?
                .into_iter()
                .map(|v| v.and_then(|raw| physical_to_datetime(raw, unit)).map(|dt| dt.date()))
                .collect())
        }
        other => Err(PolarsError::ComputeError(
            format!("expected a temporal column, found {other}").into(),
        )),
    }
}

// =============================================================================
// Series value extraction
// =============================================================================

/// Read any numeric series as optional `f64`; NaN is treated as missing.
pub fn series_to_f64(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let floats = series.cast(&DataType::Float64)?;
    Ok(floats
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Read any series as optional text, using polars' own formatting for
/// non-string types. Used for text coercion.
pub fn series_to_text(series: &Series) -> PolarsResult<Vec<Option<String>>> {
    let text = if series.dtype() == &DataType::String {
        series.clone()
    } else {
        series.cast(&DataType::String)?
    };
    Ok(text
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

// =============================================================================
// JSON bridge
// =============================================================================

/// Convert a series into JSON values, one per row.
///
/// Dates become `YYYY-MM-DD`, datetimes ISO 8601, non-finite floats `null`.
pub fn series_to_json(series: &Series) -> PolarsResult<Vec<Value>> {
    let values = match series.dtype() {
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .collect(),
        DataType::Float32 | DataType::Float64 => series_to_f64(series)?
            .into_iter()
            .map(|v| v.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null))
            .collect(),
        DataType::UInt64 => series
            .u64()?
            .into_iter()
            .map(|v| v.map(|x| Value::Number(x.into())).unwrap_or(Value::Null))
            .collect(),
        dtype if is_numeric_dtype(dtype) => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map(|x| Value::Number(x.into())).unwrap_or(Value::Null))
            .collect(),
        DataType::Date => temporal_to_dates(series)?
            .into_iter()
            .map(|v| {
                v.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null)
            })
            .collect(),
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|v| {
                    v.and_then(|raw| physical_to_datetime(raw, unit))
                        .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()))
                        .unwrap_or(Value::Null)
                })
                .collect()
        }
        DataType::Null => vec![Value::Null; series.len()],
        _ => series_to_text(series)?
            .into_iter()
            .map(|v| v.map(Value::String).unwrap_or(Value::Null))
            .collect(),
    };
    Ok(values)
}

/// Build a series from JSON values.
///
/// All integers give `Int64`, all numbers `Float64`, all booleans `Boolean`,
/// all strings `String`; any mix falls back to `String` with numbers and
/// booleans rendered as text. Nested values are kept as compact JSON text.
pub fn json_to_series(name: &str, values: &[Value]) -> Series {
    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_text = false;

    for value in values {
        match value {
            Value::Null => {}
            Value::Bool(_) => has_bool = true,
            Value::Number(n) if n.is_i64() => has_int = true,
            Value::Number(_) => has_float = true,
            Value::String(_) | Value::Array(_) | Value::Object(_) => has_text = true,
        }
    }

    let kinds = [has_int || has_float, has_bool, has_text]
        .iter()
        .filter(|&&present| present)
        .count();

    if kinds == 1 && has_bool {
        let bools: Vec<Option<bool>> = values.iter().map(Value::as_bool).collect();
        return Series::new(name.into(), bools);
    }
    if kinds == 1 && has_int && !has_float {
        let ints: Vec<Option<i64>> = values.iter().map(Value::as_i64).collect();
        return Series::new(name.into(), ints);
    }
    if kinds == 1 && !has_text {
        let floats: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
        return Series::new(name.into(), floats);
    }
    if kinds == 0 {
        let empty: Vec<Option<String>> = vec![None; values.len()];
        return Series::new(name.into(), empty);
    }

    let text: Vec<Option<String>> = values
        .iter()
        .map(|value| match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    Series::new(name.into(), text)
}

// =============================================================================
// Tests
// =============================================================================
