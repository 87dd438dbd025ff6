use polars::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::utils::{is_blank, is_missing_marker, parse_numeric_string};

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Replace blank strings, and optionally missing markers, with null.
pub(super) fn null_blank_values(mut df: DataFrame, markers: bool) -> Result<(DataFrame, usize)> {
    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut total_replacements = 0;

    for col_name in &column_names {
        let series = df.column(col_name)?.as_materialized_series();
        if series.dtype() != &DataType::String {
            continue;
        }

        let mut replaced = 0;
        let cleaned: Vec<Option<String>> = series
            .str()?
            .into_iter()
            .map(|opt_val| match opt_val {
                Some(val) if is_blank(val) || (markers && is_missing_marker(val)) => {
                    replaced += 1;
                    None
                }
                other => other.map(str::to_string),
            })
            .collect();

        if replaced > 0 {
            total_replacements += replaced;
            df.replace(col_name, Series::new(col_name.as_str().into(), cleaned))?;
        }
    }

    if total_replacements > 0 {
        debug!("Replaced {} blank or missing values with null", total_replacements);
    }

    Ok((df, total_replacements))
}

/// Reinterpret text columns whose every non-null value parses as a number.
///
/// All-integral columns become `Int64`, the rest `Float64`. Columns with any
/// unparseable value stay text.
pub(super) fn coerce_numeric_text(mut df: DataFrame) -> Result<(DataFrame, Vec<String>)> {
    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut converted = Vec::new();

    for col_name in &column_names {
        let series = df.column(col_name)?.as_materialized_series();
        if series.dtype() != &DataType::String || series.null_count() == series.len() {
            continue;
        }

        let Some(values) = parse_all(series.str()?) else {
            continue;
        };

        let integral = values
            .iter()
            .flatten()
            .all(|v| v.fract() == 0.0 && v.abs() <= MAX_EXACT_INT);

        let new_series = if integral {
            let ints: Vec<Option<i64>> = values.iter().map(|v| v.map(|x| x as i64)).collect();
            Series::new(col_name.as_str().into(), ints)
        } else {
            Series::new(col_name.as_str().into(), values)
        };

        debug!("  {}: String -> {}", col_name, new_series.dtype());
        df.replace(col_name, new_series)?;
        converted.push(col_name.clone());
    }

    Ok((df, converted))
}

fn parse_all(values: &StringChunked) -> Option<Vec<Option<f64>>> {
    let mut parsed = Vec::with_capacity(values.len());
    for opt_val in values.into_iter() {
        match opt_val {
            Some(val) => parsed.push(Some(parse_numeric_string(val)?)),
            None => parsed.push(None),
        }
    }
    Some(parsed)
}
