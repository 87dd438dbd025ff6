use std::collections::HashSet;

use polars::prelude::*;
use tracing::debug;

use crate::error::{CleaningError, Result};

/// Trim surrounding whitespace from column names.
///
/// Returns the renamed pairs. Two names that trim to the same text are a
/// `SchemaError`.
pub(super) fn trim_column_names(mut df: DataFrame) -> Result<(DataFrame, Vec<(String, String)>)> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut seen = HashSet::with_capacity(names.len());
    let mut renamed = Vec::new();
    for name in &names {
        let trimmed = name.trim();
        if !seen.insert(trimmed.to_string()) {
            return Err(CleaningError::Schema(format!(
                "column names collide after trimming: '{trimmed}'"
            )));
        }
        if trimmed != name {
            renamed.push((name.clone(), trimmed.to_string()));
        }
    }

    if !renamed.is_empty() {
        let trimmed: Vec<String> = names.iter().map(|n| n.trim().to_string()).collect();
        df.set_column_names(trimmed.iter().map(String::as_str))?;
        debug!("Trimmed {} column names", renamed.len());
    }

    Ok((df, renamed))
}

/// Drop columns whose every value is null.
pub(super) fn drop_null_columns(df: DataFrame) -> Result<(DataFrame, Vec<String>)> {
    let height = df.height();
    let dropped: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|col| col.null_count() == height)
        .map(|col| col.name().to_string())
        .collect();

    if dropped.is_empty() {
        return Ok((df, dropped));
    }

    debug!("Dropping all-null columns: {:?}", dropped);
    let cols_ref: Vec<PlSmallStr> = dropped.iter().map(|s| s.as_str().into()).collect();
    Ok((df.drop_many(cols_ref), dropped))
}

/// Drop rows whose every value is null.
pub(super) fn drop_null_rows(df: DataFrame) -> Result<(DataFrame, usize)> {
    if df.width() == 0 || df.height() == 0 {
        return Ok((df, 0));
    }

    // Count nulls per row by summing the columns' null masks.
    let mut null_counts = Series::new("nulls".into(), vec![0u32; df.height()]);
    for col in df.get_columns() {
        let null_mask = col.as_materialized_series().is_null().into_series();
        let null_int = null_mask.cast(&DataType::UInt32)?;
        null_counts = (&null_counts + &null_int)?;
    }

    let mask = null_counts.lt(df.width() as u32)?;
    let before = df.height();
    let df = df.filter(&mask)?;
    let removed = before - df.height();
    if removed > 0 {
        debug!("Dropped {} all-null rows", removed);
    }
    Ok((df, removed))
}
